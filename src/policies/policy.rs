use super::errors::PolicyError;

use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct ArmStats {
    pub pulls: u64,
    pub rewards: f64,
    pub threshold: u64,
    pub countdown: i64,
    pub is_active: bool,
    pub worth_to_save: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct PolicyStats {
    pub round: u64,
    pub phase: u64,
    pub arms: Vec<ArmStats>,
}

/// Call interface between the simulation driver and an arm-selection policy.
///
/// Rounds strictly alternate: one `choose_arm`, then one `notify_outcome` carrying the
/// reward of that pick.
pub trait Policy {
    fn name(&self) -> &'static str;
    fn choose_arm(&mut self, user: usize) -> Result<usize, PolicyError>;
    fn notify_outcome(&mut self, reward: f64) -> Result<(), PolicyError>;
    fn stats(&self) -> PolicyStats;
}
