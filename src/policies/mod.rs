pub mod errors;
pub mod estimator;
pub mod phase;
mod planner;
mod policy;
pub mod selector;
pub mod worth;

pub use planner::{PhasedPlanner, PlannerParams, RoundState};
pub use policy::{ArmStats, Policy, PolicyStats};
