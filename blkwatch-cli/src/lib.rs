//! blkwatch CLI library
//!
//! Argument parsing, command handlers and output rendering used by the
//! `blkwatch` binary.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;

use blkwatch_core::config::GeneralConfig;

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::OutputWriter;

/// Run a parsed command line.
///
/// Configuration is loaded before logging is initialized so that
/// `[general]` can select the log format. `config` commands report load
/// failures themselves and log with defaults.
pub async fn run(cli: Cli) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.output);
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Config(args) => {
            init_logging(GeneralConfig::default(), cli.log_level.as_deref())?;
            commands::config::execute(args, config_path, &writer).await
        }
        Commands::Query(args) => {
            let config = commands::load_config(config_path).await?;
            init_logging(config.general.clone(), cli.log_level.as_deref())?;
            commands::query::execute(args, config, &writer).await
        }
        Commands::Blocks(args) => {
            let config = commands::load_config(config_path).await?;
            init_logging(config.general.clone(), cli.log_level.as_deref())?;
            commands::blocks::execute(args, config, &writer).await
        }
    }
}

fn init_logging(mut general: GeneralConfig, log_level: Option<&str>) -> Result<(), CliError> {
    if let Some(level) = log_level {
        general.log_level = level.to_owned();
    }
    logging::init_tracing(&general)?;
    Ok(())
}
