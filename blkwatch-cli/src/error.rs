//! CLI-specific error types and exit code mapping

use blkwatch_core::error::{BlkwatchError, ErrorCode};

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// The log source could not be opened or read.
    #[error("log access error: {0}")]
    LogAccess(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other engine error.
    #[error("{0}")]
    Core(BlkwatchError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                  |
    /// |------|--------------------------|
    /// | 0    | Success                  |
    /// | 1    | General / command error  |
    /// | 2    | Configuration error      |
    /// | 10   | Log or IO access error   |
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::LogAccess(_) | Self::Io(_) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) => 1,
        }
    }
}

impl From<BlkwatchError> for CliError {
    fn from(err: BlkwatchError) -> Self {
        match err.code() {
            ErrorCode::ConfError => Self::Config(err.message().to_owned()),
            ErrorCode::LogAccessError => Self::LogAccess(err.message().to_owned()),
            _ => Self::Core(err),
        }
    }
}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        Self::Command(format!("{err:#}"))
    }
}
