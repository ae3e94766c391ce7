use crate::policies::errors::PolicyError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Invalid instance: {0}")]
    InvalidInstance(String),
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Cannot read config: {0}")]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
    #[error("Failed to serialize report to JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}
