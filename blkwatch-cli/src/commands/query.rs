//! `blkwatch query` command handler

use std::io::Write;
use std::time::Duration;

use colored::Colorize;
use tracing::{info, warn};

use blkwatch_core::config::BlkwatchConfig;
use blkwatch_event_engine::{EventIter, FileLogSource, FilterKind, IterState, LogSource};

use crate::cli::{OutputFormat, QueryArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, write_event};

/// Execute the `query` command.
pub async fn execute(
    args: QueryArgs,
    mut config: BlkwatchConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    super::override_source(&mut config, args.source.as_deref());
    config.source.follow = args.follow;

    let mut iter = open_iter(&config, &args)?;
    let options = StreamOptions {
        format: writer.format(),
        limit: args.limit,
        follow: args.follow,
        poll_interval: Duration::from_millis(config.source.poll_interval_ms),
    };

    let mut stdout = std::io::stdout();
    let summary = stream(&mut iter, &options, &mut stdout).await;
    iter.close();
    let summary = summary?;

    info!(
        shown = summary.shown,
        skipped = summary.skipped,
        "query finished"
    );
    if options.format == OutputFormat::Text {
        let mut err = std::io::stderr();
        writeln!(
            err,
            "{}",
            format!(
                "{} event(s), {} unparseable record(s) skipped",
                summary.shown, summary.skipped
            )
            .dimmed()
        )?;
    }
    Ok(())
}

/// Open the configured log and install every filter given on the command line.
pub fn open_iter(
    config: &BlkwatchConfig,
    args: &QueryArgs,
) -> Result<EventIter<FileLogSource>, CliError> {
    let mut iter = EventIter::open(config)?;
    for (kind, operand) in filters(args) {
        iter.add_filter(kind, operand)?;
    }
    Ok(iter)
}

/// Filters in command-line order.
pub fn filters(args: &QueryArgs) -> Vec<(FilterKind, &str)> {
    [
        (FilterKind::Wwid, args.wwid.as_deref()),
        (FilterKind::EventType, args.event_type.as_deref()),
        (FilterKind::Severity, args.severity.as_deref()),
        (FilterKind::Subsystem, args.subsystem.as_deref()),
        (FilterKind::Since, args.since.as_deref()),
        (FilterKind::EventId, args.event_id.as_deref()),
    ]
    .into_iter()
    .filter_map(|(kind, operand)| operand.map(|operand| (kind, operand)))
    .collect()
}

/// How [`stream`] writes and when it stops.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub format: OutputFormat,
    pub limit: Option<usize>,
    pub follow: bool,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub shown: usize,
    pub skipped: usize,
}

/// Pull events from `iter` and write them to `out`.
///
/// Unparseable records are logged and counted. In follow mode the loop sleeps
/// `poll_interval` whenever the source has no new data, until Ctrl-C or the
/// limit is reached.
///
/// # Errors
/// Source failures (the iterator enters `Errored`) and output errors.
pub async fn stream<S: LogSource>(
    iter: &mut EventIter<S>,
    options: &StreamOptions,
    out: &mut dyn Write,
) -> Result<StreamSummary, CliError> {
    let mut summary = StreamSummary::default();
    if options.limit == Some(0) {
        return Ok(summary);
    }

    loop {
        match iter.next_event() {
            Ok(Some(event)) => {
                write_event(options.format, &event, iter.registry(), out)?;
                out.flush()?;
                summary.shown += 1;
                if options.limit.is_some_and(|limit| summary.shown >= limit) {
                    break;
                }
            }
            Ok(None) if options.follow && iter.state() == IterState::Active => {
                tokio::select! {
                    _ = tokio::time::sleep(options.poll_interval) => {}
                    _ = tokio::signal::ctrl_c() => {
                        info!("interrupted, stopping follow");
                        break;
                    }
                }
            }
            Ok(None) => break,
            Err(err) if iter.state() == IterState::Errored => return Err(err.into()),
            Err(err) => {
                warn!(code = err.code().as_i32(), error = %err, "skipping unparseable record");
                summary.skipped += 1;
            }
        }
    }
    Ok(summary)
}
