pub mod config;
pub mod errors;
pub mod policies;
pub mod simulation;
