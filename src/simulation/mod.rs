//! Reference driver: samples users and Bernoulli rewards for a policy, and enforces the
//! producer-side quotas on its own side of the call interface.

pub mod rng;

use crate::errors::SimulationError;
use crate::policies::errors::PolicyError;
use crate::policies::{PlannerParams, Policy, PolicyStats};
use rng::MaybeSeededRng;

use rand::distr::{weighted::WeightedIndex, Bernoulli, Distribution};
use rand_distr::Beta;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

// shape of the prior used when no expected-reward matrix is configured
const ERM_PRIOR_ALPHA: f64 = 2.0;
const ERM_PRIOR_BETA: f64 = 2.0;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SimulationConfig {
    pub seed: Option<u64>,
    /// Expected reward of each arm for each user, `erm[user][arm]`, within [0, 1].
    pub erm: Option<Vec<Vec<f64>>>,
}

#[derive(Debug, Serialize)]
pub struct EpisodeReport {
    pub policy: &'static str,
    pub seed: Option<u64>,
    pub rounds_played: u64,
    pub total_reward: f64,
    pub picks: Vec<u64>,
    pub deactivated: Vec<usize>,
    pub stats: PolicyStats,
}

pub struct Simulation {
    num_rounds: u64,
    phase_len: u64,
    arms_thresh: Vec<u64>,
    erm: Vec<Vec<Bernoulli>>,
    users: WeightedIndex<f64>,
    rng: MaybeSeededRng,
}

impl Simulation {
    pub fn new(params: &PlannerParams, config: &SimulationConfig) -> Result<Self, SimulationError> {
        let mut rng = MaybeSeededRng::new(config.seed);

        if params.phase_len == 0 || params.arms_thresh.len() != params.num_arms {
            return Err(SimulationError::InvalidInstance(format!(
                "phase_len {} with {} thresholds for {} arms",
                params.phase_len,
                params.arms_thresh.len(),
                params.num_arms
            )));
        }

        if params.users_distribution.len() != params.num_users {
            return Err(SimulationError::InvalidInstance(format!(
                "{} user shares for {} users",
                params.users_distribution.len(),
                params.num_users
            )));
        }

        let users = WeightedIndex::new(&params.users_distribution)
            .map_err(|err| SimulationError::InvalidInstance(err.to_string()))?;

        let erm = match &config.erm {
            Some(erm) => erm.clone(),
            None => random_erm(params.num_users, params.num_arms, &mut rng)?,
        };
        if erm.len() != params.num_users || erm.iter().any(|row| row.len() != params.num_arms) {
            return Err(SimulationError::InvalidInstance(format!(
                "expected a {}x{} reward matrix",
                params.num_users, params.num_arms
            )));
        }
        let erm = erm
            .iter()
            .map(|row| {
                row.iter()
                    .map(|&p| {
                        Bernoulli::new(p).map_err(|err| {
                            SimulationError::InvalidInstance(format!("expected reward {p}: {err}"))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            num_rounds: params.num_rounds,
            phase_len: params.phase_len,
            arms_thresh: params.arms_thresh.clone(),
            erm,
            users,
            rng,
        })
    }

    /// Play one episode against `policy`. Stops early once the policy has no arm left.
    pub fn run<P: Policy + ?Sized>(
        &mut self,
        policy: &mut P,
    ) -> Result<EpisodeReport, SimulationError> {
        let num_arms = self.arms_thresh.len();
        let mut thresholds = self.arms_thresh.clone();
        let mut deactivated = vec![false; num_arms];
        let mut phase_picks = vec![0u64; num_arms];
        let mut picks = vec![0u64; num_arms];
        let mut total_reward = 0.0;
        let mut rounds_played = 0;

        for round in 1..=self.num_rounds {
            let user = self.users.sample(self.rng.get_rng());
            let arm = match policy.choose_arm(user) {
                Ok(arm) => arm,
                Err(PolicyError::NoArmsAvailable) => {
                    info!(round, "No arms left, ending episode");
                    break;
                }
                Err(err) => return Err(err.into()),
            };
            if arm >= num_arms {
                return Err(PolicyError::arm_out_of_range(arm, num_arms).into());
            }

            let reward = if deactivated[arm] {
                0.0
            } else if self.erm[user][arm].sample(self.rng.get_rng()) {
                1.0
            } else {
                0.0
            };
            policy.notify_outcome(reward)?;

            total_reward += reward;
            picks[arm] += 1;
            phase_picks[arm] += 1;
            rounds_played = round;

            if round % self.phase_len == 0 {
                for arm in 0..num_arms {
                    if !deactivated[arm] && phase_picks[arm] < thresholds[arm] {
                        deactivated[arm] = true;
                        thresholds[arm] = 0;
                        debug!(round, arm, "Producer quota missed");
                    }
                }
                phase_picks.iter_mut().for_each(|p| *p = 0);
            }
        }

        let report = EpisodeReport {
            policy: policy.name(),
            seed: self.rng.seed,
            rounds_played,
            total_reward,
            picks,
            deactivated: (0..num_arms).filter(|&arm| deactivated[arm]).collect(),
            stats: policy.stats(),
        };
        info!(
            policy = report.policy,
            rounds = report.rounds_played,
            total_reward = report.total_reward,
            deactivated = ?report.deactivated,
            "Episode finished"
        );

        Ok(report)
    }
}

fn random_erm(
    num_users: usize,
    num_arms: usize,
    rng: &mut MaybeSeededRng,
) -> Result<Vec<Vec<f64>>, SimulationError> {
    let prior = Beta::new(ERM_PRIOR_ALPHA, ERM_PRIOR_BETA)
        .map_err(|err| SimulationError::InvalidInstance(err.to_string()))?;

    Ok((0..num_users)
        .map(|_| (0..num_arms).map(|_| prior.sample(rng.get_rng())).collect())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policies::PhasedPlanner;

    const SEED: u64 = 1234;

    fn instance() -> (PlannerParams, SimulationConfig) {
        let params = PlannerParams {
            num_rounds: 2000,
            phase_len: 40,
            num_arms: 4,
            num_users: 3,
            arms_thresh: vec![12, 8, 6, 20],
            users_distribution: vec![0.5, 0.3, 0.2],
        };
        let config = SimulationConfig {
            seed: Some(SEED),
            erm: Some(vec![
                vec![0.8, 0.2, 0.5, 0.1],
                vec![0.3, 0.6, 0.4, 0.2],
                vec![0.1, 0.4, 0.9, 0.3],
            ]),
        };
        (params, config)
    }

    // asserts on every pick that the policy never returns an arm it already retired
    struct Checked<'a> {
        inner: &'a mut PhasedPlanner,
        retired: Vec<bool>,
    }

    impl Policy for Checked<'_> {
        fn name(&self) -> &'static str {
            self.inner.name()
        }

        fn choose_arm(&mut self, user: usize) -> Result<usize, PolicyError> {
            let arm = self.inner.choose_arm(user)?;
            assert!(arm < self.retired.len());
            assert!(!self.retired[arm], "arm {arm} chosen after deactivation");
            Ok(arm)
        }

        fn notify_outcome(&mut self, reward: f64) -> Result<(), PolicyError> {
            self.inner.notify_outcome(reward)?;
            for arm in 0..self.retired.len() {
                self.retired[arm] |= self.inner.is_deactivated(arm)?;
            }
            Ok(())
        }

        fn stats(&self) -> PolicyStats {
            self.inner.stats()
        }
    }

    #[test]
    fn seeded_episode_is_reproducible() {
        let (params, config) = instance();
        let mut totals = Vec::new();
        for _ in 0..2 {
            let mut simulation = Simulation::new(&params, &config).unwrap();
            let mut planner = PhasedPlanner::new(params.clone()).unwrap();
            totals.push(simulation.run(&mut planner).unwrap().total_reward);
        }
        assert_eq!(totals[0], totals[1]);
    }

    #[test]
    fn deactivated_arms_never_return() {
        let (params, config) = instance();
        for seed in 0..20 {
            let config = SimulationConfig {
                seed: Some(seed),
                ..config.clone()
            };
            let mut simulation = Simulation::new(&params, &config).unwrap();
            let mut planner = PhasedPlanner::new(params.clone()).unwrap();
            let mut checked = Checked {
                inner: &mut planner,
                retired: vec![false; params.num_arms],
            };

            let report = simulation.run(&mut checked).unwrap();
            assert_eq!(report.picks.iter().sum::<u64>(), report.rounds_played);
        }
    }

    #[test]
    fn harness_and_planner_agree_on_deactivation() {
        let (params, config) = instance();
        for seed in 0..10 {
            let config = SimulationConfig {
                seed: Some(seed),
                ..config.clone()
            };
            let mut simulation = Simulation::new(&params, &config).unwrap();
            let mut planner = PhasedPlanner::new(params.clone()).unwrap();
            let report = simulation.run(&mut planner).unwrap();

            let inactive: Vec<usize> = report
                .stats
                .arms
                .iter()
                .enumerate()
                .filter(|(_, arm)| !arm.is_active)
                .map(|(id, _)| id)
                .collect();
            assert_eq!(inactive, report.deactivated);
        }
    }

    #[test]
    fn random_erm_when_not_configured() {
        let (params, config) = instance();
        let config = SimulationConfig { erm: None, ..config };
        let mut simulation = Simulation::new(&params, &config).unwrap();
        assert_eq!(simulation.erm.len(), params.num_users);
        assert!(simulation.erm.iter().all(|row| row.len() == params.num_arms));

        let mut planner = PhasedPlanner::new(params).unwrap();
        assert!(simulation.run(&mut planner).is_ok());
    }

    #[test]
    fn invalid_instance() {
        let (params, config) = instance();

        let bad_shape = SimulationConfig {
            erm: Some(vec![vec![0.5; 4]; 2]),
            ..config.clone()
        };
        assert!(matches!(
            Simulation::new(&params, &bad_shape),
            Err(SimulationError::InvalidInstance(_))
        ));

        let bad_reward = SimulationConfig {
            erm: Some(vec![vec![1.5; 4]; 3]),
            ..config.clone()
        };
        assert!(Simulation::new(&params, &bad_reward).is_err());

        let missing_share = PlannerParams {
            users_distribution: vec![0.5, 0.5],
            ..params.clone()
        };
        assert!(matches!(
            Simulation::new(&missing_share, &config),
            Err(SimulationError::InvalidInstance(_))
        ));

        let bad_shares = PlannerParams {
            users_distribution: vec![0.0; 3],
            ..params
        };
        assert!(Simulation::new(&bad_shares, &config).is_err());
    }
}
