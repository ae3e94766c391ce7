use super::errors::PolicyError;

use ndarray::Array2;

/// Per (user, arm) pick counts, cumulative rewards and confidence radii,
/// stored as `num_users x num_arms` tables. Every accessor checks both indices.
#[derive(Clone, Debug)]
pub struct RewardEstimator {
    picks: Array2<u64>,
    rewards: Array2<f64>,
    radius: Array2<f64>,
    // ln of the whole episode horizon, not of the elapsed rounds
    log_horizon: f64,
}

impl RewardEstimator {
    pub fn new(num_users: usize, num_arms: usize, num_rounds: u64) -> Self {
        Self {
            picks: Array2::zeros((num_users, num_arms)),
            rewards: Array2::zeros((num_users, num_arms)),
            radius: Array2::zeros((num_users, num_arms)),
            log_horizon: (num_rounds as f64).ln(),
        }
    }

    pub fn num_users(&self) -> usize {
        self.picks.nrows()
    }

    pub fn num_arms(&self) -> usize {
        self.picks.ncols()
    }

    fn check(&self, user: usize, arm: usize) -> Result<(usize, usize), PolicyError> {
        if user >= self.num_users() {
            return Err(PolicyError::user_out_of_range(user, self.num_users()));
        }
        self.check_arm(arm)?;
        Ok((user, arm))
    }

    fn check_arm(&self, arm: usize) -> Result<usize, PolicyError> {
        if arm >= self.num_arms() {
            return Err(PolicyError::arm_out_of_range(arm, self.num_arms()));
        }
        Ok(arm)
    }

    pub fn record_pick(&mut self, user: usize, arm: usize) -> Result<(), PolicyError> {
        let cell = self.check(user, arm)?;
        self.picks[cell] += 1;
        self.radius[cell] = (0.5 * self.log_horizon / self.picks[cell] as f64).sqrt();
        Ok(())
    }

    pub fn record_outcome(
        &mut self,
        user: usize,
        arm: usize,
        reward: f64,
    ) -> Result<(), PolicyError> {
        if !reward.is_finite() {
            return Err(PolicyError::NonFiniteReward(reward));
        }
        let cell = self.check(user, arm)?;
        self.rewards[cell] += reward;
        Ok(())
    }

    pub fn picks(&self, user: usize, arm: usize) -> Result<u64, PolicyError> {
        Ok(self.picks[self.check(user, arm)?])
    }

    pub fn cumulative_reward(&self, user: usize, arm: usize) -> Result<f64, PolicyError> {
        Ok(self.rewards[self.check(user, arm)?])
    }

    pub fn radius(&self, user: usize, arm: usize) -> Result<f64, PolicyError> {
        Ok(self.radius[self.defined_cell(user, arm)?])
    }

    pub fn mean_reward(&self, user: usize, arm: usize) -> Result<f64, PolicyError> {
        let cell = self.defined_cell(user, arm)?;
        Ok(self.rewards[cell] / self.picks[cell] as f64)
    }

    pub fn ucb(&self, user: usize, arm: usize) -> Result<f64, PolicyError> {
        let cell = self.defined_cell(user, arm)?;
        Ok(self.rewards[cell] / self.picks[cell] as f64 + self.radius[cell])
    }

    /// Mean reward, or `None` when the user never got this arm.
    pub fn observed_mean(&self, user: usize, arm: usize) -> Result<Option<f64>, PolicyError> {
        let cell = self.check(user, arm)?;
        let picks = self.picks[cell];
        Ok((picks > 0).then(|| self.rewards[cell] / picks as f64))
    }

    /// Mean reward of every cell, with zero for cells that were never picked.
    pub fn observed_means(&self) -> Array2<f64> {
        Array2::from_shape_fn(self.picks.raw_dim(), |cell| match self.picks[cell] {
            0 => 0.0,
            picks => self.rewards[cell] / picks as f64,
        })
    }

    /// Zero the reward sums and radii of `arm` for every user. Pick counts are kept.
    pub fn clear_arm(&mut self, arm: usize) -> Result<(), PolicyError> {
        let arm = self.check_arm(arm)?;
        self.rewards.column_mut(arm).fill(0.0);
        self.radius.column_mut(arm).fill(0.0);
        Ok(())
    }

    /// Cumulative reward of every user on `arm`, in user order.
    pub fn arm_rewards(&self, arm: usize) -> Result<Vec<f64>, PolicyError> {
        let arm = self.check_arm(arm)?;
        Ok(self.rewards.column(arm).to_vec())
    }

    pub fn arm_picks(&self, arm: usize) -> Result<u64, PolicyError> {
        let arm = self.check_arm(arm)?;
        Ok(self.picks.column(arm).sum())
    }

    fn defined_cell(&self, user: usize, arm: usize) -> Result<(usize, usize), PolicyError> {
        let cell = self.check(user, arm)?;
        if self.picks[cell] == 0 {
            return Err(PolicyError::UndefinedStatistic { user, arm });
        }
        Ok(cell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    #[test]
    fn bounds() {
        let mut estimator = RewardEstimator::new(2, 3, 100);
        assert!(estimator.record_pick(1, 2).is_ok());
        assert_eq!(
            estimator.picks(2, 0),
            Err(PolicyError::OutOfRangeIndex {
                kind: "User",
                index: 2,
                bound: 2
            })
        );
        assert_eq!(
            estimator.record_pick(0, 3),
            Err(PolicyError::OutOfRangeIndex {
                kind: "Arm",
                index: 3,
                bound: 3
            })
        );
        assert!(estimator.arm_rewards(3).is_err());
        assert!(estimator.arm_picks(3).is_err());
    }

    #[test]
    fn arm_columns() {
        let mut estimator = RewardEstimator::new(3, 2, 100);
        estimator.record_pick(0, 1).unwrap();
        estimator.record_outcome(0, 1, 1.0).unwrap();
        estimator.record_pick(2, 1).unwrap();
        estimator.record_outcome(2, 1, 3.0).unwrap();
        estimator.record_pick(1, 0).unwrap();
        estimator.record_outcome(1, 0, 7.0).unwrap();

        assert_eq!(estimator.arm_rewards(1).unwrap(), vec![1.0, 0.0, 3.0]);
        assert_eq!(estimator.arm_rewards(0).unwrap(), vec![0.0, 7.0, 0.0]);
        assert_eq!(estimator.arm_picks(1).unwrap(), 2);

        let means = estimator.observed_means();
        assert_eq!(means.dim(), (3, 2));
        assert_eq!(means[(2, 1)], 3.0);
        assert_eq!(means[(0, 0)], 0.0);
    }

    #[test]
    fn radius_uses_horizon() {
        let mut estimator = RewardEstimator::new(1, 2, 1000);
        estimator.record_pick(0, 1).unwrap();
        let expected = (0.5 * (1000f64).ln()).sqrt();
        assert!((estimator.radius(0, 1).unwrap() - expected).abs() < EPS);

        estimator.record_pick(0, 1).unwrap();
        let expected = (0.5 * (1000f64).ln() / 2.0).sqrt();
        assert!((estimator.radius(0, 1).unwrap() - expected).abs() < EPS);
        assert_eq!(estimator.picks(0, 1).unwrap(), 2);
    }

    #[test]
    fn mean_and_ucb() {
        let mut estimator = RewardEstimator::new(1, 1, 100);
        estimator.record_pick(0, 0).unwrap();
        estimator.record_outcome(0, 0, 1.0).unwrap();
        estimator.record_pick(0, 0).unwrap();
        estimator.record_outcome(0, 0, 0.0).unwrap();

        assert!((estimator.mean_reward(0, 0).unwrap() - 0.5).abs() < EPS);
        let radius = estimator.radius(0, 0).unwrap();
        assert!((estimator.ucb(0, 0).unwrap() - (0.5 + radius)).abs() < EPS);
    }

    #[test]
    fn undefined_statistic() {
        let estimator = RewardEstimator::new(2, 2, 100);
        assert_eq!(
            estimator.mean_reward(1, 0),
            Err(PolicyError::UndefinedStatistic { user: 1, arm: 0 })
        );
        assert!(estimator.radius(0, 0).is_err());
        assert!(estimator.ucb(0, 1).is_err());
        assert_eq!(estimator.observed_mean(1, 1), Ok(None));
    }

    #[test]
    fn non_finite_reward() {
        let mut estimator = RewardEstimator::new(1, 1, 100);
        estimator.record_pick(0, 0).unwrap();
        assert!(matches!(
            estimator.record_outcome(0, 0, f64::NAN),
            Err(PolicyError::NonFiniteReward(_))
        ));
        assert_eq!(
            estimator.record_outcome(0, 0, f64::INFINITY),
            Err(PolicyError::NonFiniteReward(f64::INFINITY))
        );
        assert_eq!(estimator.cumulative_reward(0, 0).unwrap(), 0.0);
    }

    #[test]
    fn clear_arm_keeps_picks() {
        let mut estimator = RewardEstimator::new(2, 2, 100);
        for user in 0..2 {
            for arm in 0..2 {
                estimator.record_pick(user, arm).unwrap();
                estimator.record_outcome(user, arm, 1.0).unwrap();
            }
        }

        estimator.clear_arm(1).unwrap();
        for user in 0..2 {
            assert_eq!(estimator.cumulative_reward(user, 1).unwrap(), 0.0);
            assert_eq!(estimator.radius(user, 1).unwrap(), 0.0);
            assert_eq!(estimator.picks(user, 1).unwrap(), 1);
            assert_eq!(estimator.cumulative_reward(user, 0).unwrap(), 1.0);
        }
        assert_eq!(estimator.arm_picks(1).unwrap(), 2);
        assert!(estimator.clear_arm(2).is_err());
    }
}
