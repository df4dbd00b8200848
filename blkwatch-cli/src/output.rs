//! Output formatting for text vs JSON rendering
//!
//! Report-style output flows through [`OutputWriter`]. Streamed events are
//! written one per line by [`write_event`] so that `--follow` output can be
//! consumed while the command is still running.

use std::io::Write;

use colored::Colorize;
use serde::Serialize;

use blkwatch_core::types::Severity;
use blkwatch_event_engine::{BlockRegistry, Event};

use crate::cli::OutputFormat;
use crate::error::CliError;

/// Writes command reports in the selected format.
pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Render a payload to stdout.
    pub fn render<T: Render + Serialize>(&self, payload: &T) -> Result<(), CliError> {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        self.render_to(&mut handle, payload)
    }

    /// Render a payload to `w`.
    ///
    /// `Text` delegates to [`Render::render_text`]; `Json` serialises via `serde_json`.
    pub fn render_to<T: Render + Serialize>(
        &self,
        w: &mut dyn Write,
        payload: &T,
    ) -> Result<(), CliError> {
        match self.format {
            OutputFormat::Text => payload.render_text(w)?,
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut *w, payload)?;
                writeln!(w)?;
            }
        }
        Ok(())
    }
}

/// Human-readable text rendering, implemented alongside `serde::Serialize`.
pub trait Render {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()>;
}

/// Write one event as a line of text or a single-line JSON object.
pub fn write_event(
    format: OutputFormat,
    event: &Event,
    registry: &BlockRegistry,
    w: &mut dyn Write,
) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let json = event.to_json_string(registry)?;
            writeln!(w, "{json}")?;
        }
        OutputFormat::Text => {
            let device = event
                .block()
                .and_then(|id| registry.get(id))
                .map(|info| info.display_key())
                .unwrap_or("-");
            writeln!(
                w,
                "{} {} {} {} {} {}",
                event.timestamp().dimmed(),
                severity_label(event.severity()),
                event.subsystem().cyan(),
                event.event_id().bold(),
                device,
                event.message()
            )?;
        }
    }
    Ok(())
}

/// Fixed-width severity label, coloured by urgency.
pub fn severity_label(severity: Severity) -> colored::ColoredString {
    let label = format!("{:<9}", severity.as_str());
    match severity {
        Severity::Emergency | Severity::Alert | Severity::Critical => label.red().bold(),
        Severity::Error => label.red(),
        Severity::Warning => label.yellow(),
        Severity::Notice | Severity::Info => label.green(),
        Severity::Debug | Severity::Unknown => label.normal(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct TestPayload {
        field1: String,
        field2: u32,
    }

    impl Render for TestPayload {
        fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
            writeln!(w, "Field1: {}", self.field1)?;
            writeln!(w, "Field2: {}", self.field2)?;
            Ok(())
        }
    }

    fn payload() -> TestPayload {
        TestPayload {
            field1: "test value".to_owned(),
            field2: 42,
        }
    }

    #[test]
    fn test_render_to_text_uses_render_impl() {
        let mut buffer = Vec::new();
        OutputWriter::new(OutputFormat::Text)
            .render_to(&mut buffer, &payload())
            .expect("text rendering should succeed");
        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("Field1: test value"));
        assert!(output.contains("Field2: 42"));
    }

    #[test]
    fn test_render_to_json_is_pretty_and_parseable() {
        let mut buffer = Vec::new();
        OutputWriter::new(OutputFormat::Json)
            .render_to(&mut buffer, &payload())
            .expect("json rendering should succeed");
        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains('\n'));
        let parsed: serde_json::Value = serde_json::from_str(&output).expect("valid JSON");
        assert_eq!(parsed["field1"].as_str(), Some("test value"));
        assert_eq!(parsed["field2"].as_u64(), Some(42));
    }

    #[test]
    fn test_severity_label_is_padded() {
        colored::control::set_override(false);
        assert_eq!(severity_label(Severity::Error).to_string(), "ERROR    ");
        assert_eq!(severity_label(Severity::Emergency).to_string(), "EMERGENCY");
    }
}
