use phased_bandits::config::AppConfig;
use phased_bandits::errors::AppError;
use phased_bandits::policies::PhasedPlanner;
use phased_bandits::simulation::Simulation;

use tracing_subscriber::EnvFilter;

fn main() -> Result<(), AppError> {
    let config = AppConfig::from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    let mut simulation = Simulation::new(&config.planner, &config.simulation)?;
    let mut planner = PhasedPlanner::new(config.planner)?;
    let report = simulation.run(&mut planner)?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
