use super::errors::PolicyError;

/// Per-arm quota countdowns and the permanent deactivation flags.
#[derive(Clone, Debug)]
pub struct PhaseTracker {
    phase_len: u64,
    thresholds: Vec<u64>,
    // may go negative: exploitation keeps serving an arm past its quota
    countdowns: Vec<i64>,
    deactivated: Vec<bool>,
}

impl PhaseTracker {
    pub fn new(phase_len: u64, thresholds: Vec<u64>) -> Self {
        let countdowns = thresholds.iter().map(|&t| countdown_of(t)).collect();
        let deactivated = vec![false; thresholds.len()];
        Self {
            phase_len,
            thresholds,
            countdowns,
            deactivated,
        }
    }

    pub fn num_arms(&self) -> usize {
        self.thresholds.len()
    }

    pub fn phase_len(&self) -> u64 {
        self.phase_len
    }

    pub fn thresholds(&self) -> &[u64] {
        &self.thresholds
    }

    pub fn countdown(&self, arm: usize) -> i64 {
        self.countdowns[arm]
    }

    pub fn countdowns(&self) -> &[i64] {
        &self.countdowns
    }

    pub fn has_quota_left(&self, arm: usize) -> bool {
        self.countdowns[arm] > 0
    }

    pub fn is_deactivated(&self, arm: usize) -> bool {
        self.deactivated[arm]
    }

    pub fn deactivated(&self) -> &[bool] {
        &self.deactivated
    }

    pub fn active_arms(&self) -> impl Iterator<Item = usize> + '_ {
        self.deactivated
            .iter()
            .enumerate()
            .filter(|(_, &off)| !off)
            .map(|(arm, _)| arm)
    }

    pub fn advance(&mut self, arm: usize) -> Result<(), PolicyError> {
        let bound = self.num_arms();
        self.countdowns
            .get_mut(arm)
            .map(|countdown| *countdown -= 1)
            .ok_or(PolicyError::arm_out_of_range(arm, bound))
    }

    /// Rounds are numbered from 1, so round `phase_len` closes the first phase.
    pub fn is_boundary(&self, round: u64) -> bool {
        round % self.phase_len == 0
    }

    /// Rounds left in the phase that `round` belongs to, counting `round` itself.
    pub fn remaining_in_phase(&self, round: u64) -> u64 {
        self.phase_len - (round % self.phase_len)
    }

    /// Sum of all countdowns that are still positive.
    pub fn pending_quota(&self) -> i64 {
        self.countdowns
            .iter()
            .filter(|&&c| c > 0)
            .fold(0, |total: i64, &c| total.saturating_add(c))
    }

    /// Deactivate every arm that still has quota left and return them.
    /// Arms with a countdown at or below zero met their quota and stay active.
    pub fn deactivate_unmet(&mut self) -> Vec<usize> {
        let unmet: Vec<usize> = self
            .countdowns
            .iter()
            .enumerate()
            .filter(|(_, &c)| c > 0)
            .map(|(arm, _)| arm)
            .collect();

        unmet.iter().for_each(|&arm| {
            self.deactivated[arm] = true;
            self.thresholds[arm] = 0;
        });

        unmet
    }

    pub fn reset_countdowns(&mut self) {
        self.countdowns
            .iter_mut()
            .zip(self.thresholds.iter())
            .for_each(|(countdown, &threshold)| *countdown = countdown_of(threshold));
    }
}

// thresholds past i64::MAX saturate so they still count as unmet
fn countdown_of(threshold: u64) -> i64 {
    i64::try_from(threshold).unwrap_or(i64::MAX)
}
