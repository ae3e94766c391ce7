use super::errors::PolicyError;
use super::estimator::RewardEstimator;
use super::phase::PhaseTracker;

use ndarray::Array2;
use std::cmp::Ordering;
use tracing::{debug, warn};

// past this many candidates a single boundary costs millions of evaluations
const LARGE_SEARCH_ARMS: usize = 20;

/// Exhaustive search for the activation subset with the best expected reward over one phase.
///
/// Each candidate mask is scored by a greedy allocation: arms with the most masked quota are
/// served first, each to the users it rewards best, until either the arm quota or the user
/// demand (`phase_len * share`) runs out. Whatever demand is left is served at the rate of
/// the user's best arm in the mask. Cells never observed count as zero reward.
pub struct WorthToSave<'a> {
    thresholds: &'a [u64],
    deactivated: &'a [bool],
    users_distribution: &'a [f64],
    phase_len: f64,
    // indexed by (user, arm)
    means: Array2<f64>,
}

impl<'a> WorthToSave<'a> {
    pub fn new(
        estimator: &RewardEstimator,
        tracker: &'a PhaseTracker,
        users_distribution: &'a [f64],
    ) -> Result<Self, PolicyError> {
        let means = estimator.observed_means();
        if means.dim() != (users_distribution.len(), tracker.num_arms()) {
            return Err(PolicyError::InvalidParameter(format!(
                "reward table {:?} does not match {} users and {} arms",
                means.dim(),
                users_distribution.len(),
                tracker.num_arms()
            )));
        }

        Ok(Self {
            thresholds: tracker.thresholds(),
            deactivated: tracker.deactivated(),
            users_distribution,
            phase_len: tracker.phase_len() as f64,
            means,
        })
    }

    /// Arms that are not permanently deactivated, in index order.
    pub fn candidates(&self) -> Vec<usize> {
        self.deactivated
            .iter()
            .enumerate()
            .filter(|(_, &off)| !off)
            .map(|(arm, _)| arm)
            .collect()
    }

    pub fn total_reward(&self, mask: &[bool]) -> f64 {
        let num_arms = self.thresholds.len();
        let num_users = self.users_distribution.len();

        let mut demand: Vec<f64> = self
            .users_distribution
            .iter()
            .map(|share| share * self.phase_len)
            .collect();
        let mut quota: Vec<f64> = self
            .thresholds
            .iter()
            .zip(mask.iter())
            .map(|(&threshold, &on)| if on { threshold as f64 } else { 0.0 })
            .collect();

        // stable sorts: ties serve the lower arm / user index first
        let mut arms: Vec<usize> = (0..num_arms).collect();
        arms.sort_by(|&a, &b| descending(quota[a], quota[b]));

        let mut total = 0.0;
        for arm in arms {
            let mut users: Vec<usize> = (0..num_users).collect();
            users.sort_by(|&a, &b| descending(self.means[(a, arm)], self.means[(b, arm)]));

            for user in users {
                if quota[arm] <= 0.0 {
                    break;
                }
                if demand[user] <= 0.0 {
                    continue;
                }
                let units = demand[user].min(quota[arm]);
                quota[arm] -= units;
                demand[user] -= units;
                total += units * self.means[(user, arm)];
            }
        }

        for (user, &left) in demand.iter().enumerate() {
            if left <= 0.0 {
                continue;
            }
            let best = mask
                .iter()
                .enumerate()
                .filter(|(_, &on)| on)
                .map(|(arm, _)| self.means[(user, arm)])
                .max_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
            if let Some(best) = best {
                total += left * best;
            }
        }

        total
    }

    /// Evaluate every subset of the candidate arms and keep the first one with the strictly
    /// greatest total reward. Deactivated arms are inactive in every subset.
    pub fn best_mask(&self) -> Result<Vec<bool>, PolicyError> {
        let candidates = self.candidates();
        let num_masks = u32::try_from(candidates.len())
            .ok()
            .and_then(|k| 1usize.checked_shl(k))
            .ok_or_else(|| {
                PolicyError::InvalidParameter(format!(
                    "{} candidate arms exceed the exhaustive search capacity",
                    candidates.len()
                ))
            })?;

        if candidates.len() > LARGE_SEARCH_ARMS {
            warn!(
                candidates = candidates.len(),
                masks = num_masks,
                "Exhaustive worth-to-save search over a large number of arms"
            );
        }

        let mut best = vec![false; self.thresholds.len()];
        let mut best_reward = self.total_reward(&best);
        let mut mask = vec![false; self.thresholds.len()];

        for bits in 1..num_masks {
            candidates
                .iter()
                .enumerate()
                .for_each(|(bit, &arm)| mask[arm] = bits & (1 << bit) != 0);

            let reward = self.total_reward(&mask);
            if reward > best_reward {
                best_reward = reward;
                best.copy_from_slice(&mask);
            }
        }

        debug!(reward = best_reward, mask = ?best, "Selected worth-to-save mask");
        Ok(best)
    }
}

fn descending(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}
