//! `blkwatch blocks` command handler

use std::io::Write;

use serde::Serialize;
use tracing::{debug, info};

use blkwatch_core::config::BlkwatchConfig;
use blkwatch_event_engine::{BlockInfo, BlockRegistry, EventIter, IterState, LogSource};

use crate::cli::BlocksArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `blocks` command.
pub async fn execute(
    args: BlocksArgs,
    mut config: BlkwatchConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    super::override_source(&mut config, args.source.as_deref());
    config.source.follow = false;

    let mut iter = EventIter::open(&config)?;
    let events = scan(&mut iter)?;
    info!(
        source = config.source.path.as_str(),
        events,
        blocks = iter.registry().len(),
        "log scanned"
    );

    let report = build_report(iter.registry(), &config.source.path, args.key.as_deref());
    iter.close();
    writer.render(&report?)
}

/// Read the whole log so that every device it mentions is registered.
///
/// Returns the number of events seen. Unparseable records are skipped.
pub fn scan<S: LogSource>(iter: &mut EventIter<S>) -> Result<usize, CliError> {
    let mut events = 0;
    loop {
        match iter.next_event() {
            Ok(Some(_)) => events += 1,
            Ok(None) => return Ok(events),
            Err(err) if iter.state() == IterState::Errored => return Err(err.into()),
            Err(err) => debug!(error = %err, "skipping unparseable record"),
        }
    }
}

/// Build the device listing. With `key`, lists that device followed by every
/// device that transitively owns it.
///
/// # Errors
/// `key` names no known device.
pub fn build_report(
    registry: &BlockRegistry,
    source: &str,
    key: Option<&str>,
) -> Result<BlocksReport, CliError> {
    let blocks = match key {
        Some(key) => {
            let device = registry.lookup(key)?;
            std::iter::once(device)
                .chain(registry.all_owners(device.id()))
                .map(|info| BlockEntry::new(info, registry))
                .collect()
        }
        None => registry
            .blocks()
            .map(|info| BlockEntry::new(info, registry))
            .collect(),
    };

    Ok(BlocksReport {
        source: source.to_owned(),
        key: key.map(str::to_owned),
        blocks,
    })
}

/// Block device listing.
#[derive(Debug, Serialize)]
pub struct BlocksReport {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub blocks: Vec<BlockEntry>,
}

#[derive(Debug, Serialize)]
pub struct BlockEntry {
    pub id: String,
    pub wwid: String,
    pub blk_type: String,
    pub preferred_path: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mount_point: Option<String>,
    pub transaction_id: String,
    pub owners: Vec<String>,
}

impl BlockEntry {
    fn new(info: &BlockInfo, registry: &BlockRegistry) -> Self {
        Self {
            id: info.id().to_string(),
            wwid: info.wwid().to_owned(),
            blk_type: info.blk_type().as_str().to_owned(),
            preferred_path: info.preferred_path().to_owned(),
            path: info.path().to_owned(),
            uuid: info.uuid().map(str::to_owned),
            mount_point: info.mount_point().map(str::to_owned),
            transaction_id: info.transaction_id().to_owned(),
            owners: registry
                .owners(info.id())
                .into_iter()
                .map(|owner| owner.display_key().to_owned())
                .collect(),
        }
    }
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() { "-" } else { s }
}

impl Render for BlocksReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        match &self.key {
            Some(key) => writeln!(w, "Block device {} (source: {})", key.bold(), self.source)?,
            None => writeln!(w, "Block devices (source: {})", self.source.bold())?,
        }
        if self.blocks.is_empty() {
            writeln!(w, "  No block devices found")?;
            return Ok(());
        }

        writeln!(
            w,
            "{}",
            format!(
                "{:<8} {:<36} {:<24} {:<16} {:<28} {}",
                "ID", "WWID", "Type", "Path", "Preferred Path", "Owners"
            )
            .bold()
        )?;
        for block in &self.blocks {
            let owners = if block.owners.is_empty() {
                "-".to_owned()
            } else {
                block.owners.join(", ")
            };
            writeln!(
                w,
                "{:<8} {:<36} {:<24} {:<16} {:<28} {}",
                block.id,
                or_dash(&block.wwid),
                block.blk_type,
                or_dash(&block.path),
                or_dash(&block.preferred_path),
                owners
            )?;
        }
        Ok(())
    }
}
