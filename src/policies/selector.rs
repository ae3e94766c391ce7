use super::errors::PolicyError;
use super::estimator::RewardEstimator;
use super::phase::PhaseTracker;

use std::cmp::Ordering;

// exploration lasts 45 / 10_000 = 0.45% of the round budget
const EXPLORE_BASIS_POINTS: u128 = 45;
const BASIS: u128 = 10_000;

// an under-quota arm is saved when (SAVE_BASE + SAVE_RANK_WEIGHT / rank) * remaining < pending
const SAVE_BASE: f64 = 0.7;
const SAVE_RANK_WEIGHT: f64 = 0.3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    Explore,
    Exploit,
}

/// Number of leading rounds served by the explore strategy: `ceil(0.0045 * num_rounds)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExplorationBudget {
    rounds: u64,
}

impl ExplorationBudget {
    pub fn new(num_rounds: u64) -> Self {
        let rounds = (num_rounds as u128 * EXPLORE_BASIS_POINTS).div_ceil(BASIS) as u64;
        Self { rounds }
    }

    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    pub fn strategy(&self, round: u64) -> Strategy {
        if round <= self.rounds {
            Strategy::Explore
        } else {
            Strategy::Exploit
        }
    }
}

/// Least-picked arm for this user among the arms still owed picks this phase,
/// or the least-picked active arm when every quota is met. Ties go to the lower index.
pub fn explore(
    user: usize,
    estimator: &RewardEstimator,
    tracker: &PhaseTracker,
) -> Result<usize, PolicyError> {
    let mut arms = tracker
        .active_arms()
        .map(|arm| Ok((arm, estimator.picks(user, arm)?)))
        .collect::<Result<Vec<(usize, u64)>, PolicyError>>()?;
    arms.sort_by_key(|&(_, picks)| picks);

    arms.iter()
        .map(|&(arm, _)| arm)
        .find(|&arm| tracker.has_quota_left(arm))
        .or_else(|| arms.first().map(|&(arm, _)| arm))
        .ok_or(PolicyError::NoArmsAvailable)
}

/// Best UCB arm for this user, unless quota is running behind and a worth-saving arm still
/// needs picks, in which case the highest-scoring such arm is served instead.
pub fn exploit(
    user: usize,
    round: u64,
    estimator: &RewardEstimator,
    tracker: &PhaseTracker,
    worth_to_save: &[bool],
) -> Result<usize, PolicyError> {
    let scores = ucb_scores(user, estimator, tracker)?;

    // strict comparison keeps the lowest index on ties
    let best = scores
        .iter()
        .fold(None, |best: Option<(usize, f64)>, &(arm, score)| match best {
            Some((_, top)) if score <= top => best,
            _ => Some((arm, score)),
        })
        .map(|(arm, _)| arm)
        .ok_or(PolicyError::NoArmsAvailable)?;

    if tracker.has_quota_left(best) {
        return Ok(best);
    }

    let rank = user_rank(user, best, estimator)?;
    let remaining = tracker.remaining_in_phase(round) as f64;
    let pending = tracker.pending_quota() as f64;

    if (SAVE_BASE + SAVE_RANK_WEIGHT / rank as f64) * remaining < pending {
        let mut ranked = scores;
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        if let Some(arm) = ranked.iter().map(|&(arm, _)| arm).find(|&arm| {
            tracker.has_quota_left(arm) && worth_to_save[arm] && !tracker.is_deactivated(arm)
        }) {
            return Ok(arm);
        }
    }

    Ok(best)
}

/// UCB score of every active arm for this user. Arms the user never got score infinity.
fn ucb_scores(
    user: usize,
    estimator: &RewardEstimator,
    tracker: &PhaseTracker,
) -> Result<Vec<(usize, f64)>, PolicyError> {
    tracker
        .active_arms()
        .map(|arm| {
            let score = if estimator.picks(user, arm)? == 0 {
                f64::INFINITY
            } else {
                estimator.ucb(user, arm)?
            };
            Ok((arm, score))
        })
        .collect()
}

/// 1-based position of `user` when all users are sorted by ascending cumulative reward on
/// `arm`: 1 is the lowest contributor, `num_users` the highest.
pub fn user_rank(
    user: usize,
    arm: usize,
    estimator: &RewardEstimator,
) -> Result<usize, PolicyError> {
    let rewards = estimator.arm_rewards(arm)?;
    let mut users: Vec<usize> = (0..rewards.len()).collect();
    users.sort_by(|&a, &b| rewards[a].partial_cmp(&rewards[b]).unwrap_or(Ordering::Equal));

    users
        .iter()
        .position(|&u| u == user)
        .map(|position| position + 1)
        .ok_or(PolicyError::user_out_of_range(user, rewards.len()))
}
