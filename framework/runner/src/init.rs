use crate::cli::YardstickCli;
use clap::Parser;

/// Initialise the CLI and logging for the yardstick runner.
pub fn init() -> YardstickCli {
    env_logger::init();

    YardstickCli::parse()
}
