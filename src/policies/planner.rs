use super::errors::{PolicyError, ProtocolViolation};
use super::estimator::RewardEstimator;
use super::phase::PhaseTracker;
use super::policy::{ArmStats, Policy, PolicyStats};
use super::selector::{self, ExplorationBudget, Strategy};
use super::worth::WorthToSave;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

const NAME: &str = "phased-quota-planner";
const SHARES_TOLERANCE: f64 = 1e-6;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PlannerParams {
    pub num_rounds: u64,
    pub phase_len: u64,
    pub num_arms: usize,
    pub num_users: usize,
    pub arms_thresh: Vec<u64>,
    pub users_distribution: Vec<f64>,
}

impl PlannerParams {
    fn validate(&self) -> Result<(), PolicyError> {
        let invalid =
            |msg: String| -> Result<(), PolicyError> { Err(PolicyError::InvalidParameter(msg)) };

        if self.num_rounds == 0 || self.phase_len == 0 || self.num_arms == 0 || self.num_users == 0
        {
            return invalid(format!(
                "counts must be positive (rounds={}, phase_len={}, arms={}, users={})",
                self.num_rounds, self.phase_len, self.num_arms, self.num_users
            ));
        }
        if self.num_arms >= usize::BITS as usize {
            return invalid(format!(
                "{} arms exceed the exhaustive worth-to-save search",
                self.num_arms
            ));
        }
        if self.arms_thresh.len() != self.num_arms {
            return invalid(format!(
                "expected {} arm thresholds, got {}",
                self.num_arms,
                self.arms_thresh.len()
            ));
        }
        if let Some(threshold) = self
            .arms_thresh
            .iter()
            .find(|&&threshold| i64::try_from(threshold).is_err())
        {
            return invalid(format!(
                "arm threshold {threshold} exceeds the countdown range ({})",
                i64::MAX
            ));
        }
        if self.users_distribution.len() != self.num_users {
            return invalid(format!(
                "expected {} user shares, got {}",
                self.num_users,
                self.users_distribution.len()
            ));
        }
        if let Some(share) = self
            .users_distribution
            .iter()
            .find(|share| !share.is_finite() || **share < 0.0)
        {
            return invalid(format!("user share {share} is not a non-negative number"));
        }

        let total: f64 = self.users_distribution.iter().sum();
        if (total - 1.0).abs() > SHARES_TOLERANCE {
            warn!(total, "User shares do not sum to 1");
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundState {
    Idle,
    Pending { round: u64, user: usize, arm: usize },
}

/// Two-phase quota-aware arm selection: a short uniform exploration, then UCB exploitation
/// that may divert users to an under-quota arm judged worth keeping alive.
#[derive(Clone, Debug)]
pub struct PhasedPlanner {
    users_distribution: Vec<f64>,
    estimator: RewardEstimator,
    tracker: PhaseTracker,
    budget: ExplorationBudget,
    worth_to_save: Vec<bool>,
    round: u64,
    state: RoundState,
}

impl PhasedPlanner {
    pub fn new(params: PlannerParams) -> Result<Self, PolicyError> {
        params.validate()?;

        let budget = ExplorationBudget::new(params.num_rounds);
        info!(
            rounds = params.num_rounds,
            phase_len = params.phase_len,
            arms = params.num_arms,
            users = params.num_users,
            explore_rounds = budget.rounds(),
            "Created planner"
        );

        Ok(Self {
            estimator: RewardEstimator::new(params.num_users, params.num_arms, params.num_rounds),
            tracker: PhaseTracker::new(params.phase_len, params.arms_thresh),
            worth_to_save: vec![true; params.num_arms],
            users_distribution: params.users_distribution,
            budget,
            round: 0,
            state: RoundState::Idle,
        })
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn state(&self) -> RoundState {
        self.state
    }

    pub fn exploration_budget(&self) -> ExplorationBudget {
        self.budget
    }

    pub fn estimator(&self) -> &RewardEstimator {
        &self.estimator
    }

    pub fn worth_to_save(&self) -> &[bool] {
        &self.worth_to_save
    }

    pub fn is_deactivated(&self, arm: usize) -> Result<bool, PolicyError> {
        self.tracker
            .deactivated()
            .get(arm)
            .copied()
            .ok_or(PolicyError::arm_out_of_range(arm, self.tracker.num_arms()))
    }

    fn explore(&mut self, user: usize, round: u64) -> Result<usize, PolicyError> {
        let arm = selector::explore(user, &self.estimator, &self.tracker)?;
        self.record(user, arm, round)?;
        Ok(arm)
    }

    fn exploit(&mut self, user: usize, round: u64) -> Result<usize, PolicyError> {
        let arm = selector::exploit(
            user,
            round,
            &self.estimator,
            &self.tracker,
            &self.worth_to_save,
        )?;
        self.record(user, arm, round)?;
        Ok(arm)
    }

    fn record(&mut self, user: usize, arm: usize, round: u64) -> Result<(), PolicyError> {
        self.estimator.record_pick(user, arm)?;
        self.tracker.advance(arm)?;
        self.maybe_roll_phase(round)
    }

    fn maybe_roll_phase(&mut self, round: u64) -> Result<(), PolicyError> {
        if !self.tracker.is_boundary(round) {
            return Ok(());
        }

        // the mask is chosen before this boundary's deactivations apply
        self.worth_to_save =
            WorthToSave::new(&self.estimator, &self.tracker, &self.users_distribution)?
                .best_mask()?;

        for arm in self.tracker.deactivate_unmet() {
            self.estimator.clear_arm(arm)?;
            info!(arm, round, "Deactivated arm after missing its phase quota");
        }
        self.tracker.reset_countdowns();

        debug!(
            round,
            phase = round / self.tracker.phase_len(),
            worth_to_save = ?self.worth_to_save,
            "Closed phase"
        );
        Ok(())
    }
}

impl Policy for PhasedPlanner {
    fn name(&self) -> &'static str {
        NAME
    }

    fn choose_arm(&mut self, user: usize) -> Result<usize, PolicyError> {
        if let RoundState::Pending { round, .. } = self.state {
            return Err(ProtocolViolation::ChooseWhilePending(round).into());
        }
        if user >= self.estimator.num_users() {
            return Err(PolicyError::user_out_of_range(
                user,
                self.estimator.num_users(),
            ));
        }

        let round = self.round + 1;
        let strategy = self.budget.strategy(round);
        let arm = match strategy {
            Strategy::Explore => self.explore(user, round),
            Strategy::Exploit => self.exploit(user, round),
        }?;

        self.round = round;
        self.state = RoundState::Pending { round, user, arm };
        trace!(round, user, arm, strategy = ?strategy, "Chose arm");

        Ok(arm)
    }

    fn notify_outcome(&mut self, reward: f64) -> Result<(), PolicyError> {
        let RoundState::Pending { user, arm, .. } = self.state else {
            return Err(ProtocolViolation::NotifyWithoutPending.into());
        };

        if !reward.is_finite() {
            return Err(PolicyError::NonFiniteReward(reward));
        }
        // the pick may have closed a phase that retired its own arm
        if self.tracker.is_deactivated(arm) {
            trace!(user, arm, reward, "Dropped reward of a deactivated arm");
        } else {
            self.estimator.record_outcome(user, arm, reward)?;
        }
        self.state = RoundState::Idle;
        Ok(())
    }

    fn stats(&self) -> PolicyStats {
        let arms = (0..self.tracker.num_arms())
            .map(|arm| ArmStats {
                pulls: self.estimator.arm_picks(arm).unwrap_or_default(),
                rewards: self
                    .estimator
                    .arm_rewards(arm)
                    .map(|rewards| rewards.iter().sum::<f64>())
                    .unwrap_or_default(),
                threshold: self.tracker.thresholds()[arm],
                countdown: self.tracker.countdown(arm),
                is_active: !self.tracker.is_deactivated(arm),
                worth_to_save: self.worth_to_save[arm],
            })
            .collect();

        PolicyStats {
            round: self.round,
            phase: self.round / self.tracker.phase_len(),
            arms,
        }
    }
}
