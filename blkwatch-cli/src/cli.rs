//! CLI argument parsing using clap derive API
//!
//! Purely declarative; no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// blkwatch -- storage event monitoring from system logs.
///
/// Use `blkwatch <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "blkwatch", version, about, long_about = None)]
pub struct Cli {
    /// Path to a blkwatch.toml configuration file (default: built-in defaults + env).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read storage events from the log, optionally filtered.
    Query(QueryArgs),

    /// Scan the log and list the block devices it mentions.
    Blocks(BlocksArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- query ----

/// Filters are combined with AND.
#[derive(Args, Debug, Default)]
pub struct QueryArgs {
    /// Log file to read (overrides source.path).
    #[arg(long)]
    pub source: Option<PathBuf>,

    /// Only events on this WWID or on a device it owns.
    #[arg(long)]
    pub wwid: Option<String>,

    /// Only events of this type (e.g. io-error).
    #[arg(long)]
    pub event_type: Option<String>,

    /// Only events at least this urgent (e.g. warning, 3).
    #[arg(long)]
    pub severity: Option<String>,

    /// Only events from this subsystem (scsi, dm, multipath, lvm, partition, other).
    #[arg(long)]
    pub subsystem: Option<String>,

    /// Only events at or after this time (RFC 3339, "YYYY-MM-DD HH:MM:SS", today, yesterday).
    #[arg(long)]
    pub since: Option<String>,

    /// Only events with this identifier.
    #[arg(long)]
    pub event_id: Option<String>,

    /// Stop after this many events.
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Keep waiting for new records at the end of the log.
    #[arg(short, long)]
    pub follow: bool,
}

// ---- blocks ----

#[derive(Args, Debug, Default)]
pub struct BlocksArgs {
    /// Log file to read (overrides source.path).
    #[arg(long)]
    pub source: Option<PathBuf>,

    /// Show one device (by WWID or path) and every device that owns it.
    #[arg(long)]
    pub key: Option<String>,
}

// ---- config ----

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, source, parser, engine).
        #[arg(long)]
        section: Option<String>,
    },
}
