//! Command handlers -- one module per subcommand

pub mod blocks;
pub mod config;
pub mod query;

use std::path::Path;

use blkwatch_core::config::BlkwatchConfig;

use crate::error::CliError;

/// Load the effective configuration.
///
/// With a path: file + env overrides + validation. Without one: defaults +
/// env overrides + validation.
pub async fn load_config(path: Option<&Path>) -> Result<BlkwatchConfig, CliError> {
    let config = match path {
        Some(path) => BlkwatchConfig::load(path).await?,
        None => {
            let mut config = BlkwatchConfig::default();
            config.apply_env_overrides();
            config.validate()?;
            config
        }
    };
    Ok(config)
}

/// Apply a `--source` override.
pub(crate) fn override_source(config: &mut BlkwatchConfig, source: Option<&Path>) {
    if let Some(path) = source {
        config.source.path = path.display().to_string();
    }
}
