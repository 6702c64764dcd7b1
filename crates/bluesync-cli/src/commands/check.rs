//! Check command implementation.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use bluesync_core::{Address, InboundEvent, replay};
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::format::{to_json, write_output};

/// What a script contains, without applying it.
#[derive(Debug, Default, PartialEq, Serialize)]
pub struct ScriptSummary {
    pub events: usize,
    /// Event count per kind.
    pub kinds: BTreeMap<String, usize>,
    /// Distinct device addresses mentioned.
    pub devices: usize,
    /// Device-scoped events without an address. The dispatcher drops these.
    pub missing_address: usize,
}

pub fn summarize_script(events: &[InboundEvent]) -> ScriptSummary {
    let mut summary = ScriptSummary {
        events: events.len(),
        ..ScriptSummary::default()
    };
    let mut devices: Vec<&Address> = Vec::new();
    for event in events {
        *summary.kinds.entry(event.kind().to_string()).or_default() += 1;
        match event.address() {
            Some(address) => {
                if !devices.contains(&address) {
                    devices.push(address);
                }
            }
            None if event.is_device_scoped() => summary.missing_address += 1,
            None => {}
        }
    }
    summary.devices = devices.len();
    summary
}

fn format_summary_text(path: &Path, summary: &ScriptSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}: {} events, {} devices",
        path.display(),
        summary.events,
        summary.devices
    );
    for (kind, count) in &summary.kinds {
        let _ = writeln!(out, "    {:<34} {}", kind, count);
    }
    if summary.missing_address > 0 {
        let _ = writeln!(
            out,
            "warning: {} device events have no address and will be dropped",
            summary.missing_address
        );
    }
    out
}

pub fn cmd_check(script: &Path, format: OutputFormat, output: Option<&Path>) -> Result<()> {
    let events = replay::load_script(script)
        .with_context(|| format!("Failed to load script: {}", script.display()))?;
    let summary = summarize_script(&events);
    let content = match format {
        OutputFormat::Json => to_json(&summary)?,
        OutputFormat::Text => format_summary_text(script, &summary),
    };
    write_output(output, &content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_script() {
        let events = replay::parse_script(
            r#"
{"kind":"device_found","address":"aa:bb:cc:dd:ee:ff"}
{"kind":"device_found","address":"AA:BB:CC:DD:EE:FF","rssi":-60}
{"kind":"device_found","address":"11:22:33:44:55:66"}
{"kind":"device_disappeared"}
{"kind":"scanning_state_changed","discovering":true}
"#,
        )
        .unwrap();

        let summary = summarize_script(&events);
        assert_eq!(summary.events, 5);
        assert_eq!(summary.devices, 2);
        assert_eq!(summary.missing_address, 1);
        assert_eq!(summary.kinds["device_found"], 3);
        assert_eq!(summary.kinds["scanning_state_changed"], 1);
    }

    #[test]
    fn test_text_warns_about_missing_addresses() {
        let summary = ScriptSummary {
            events: 1,
            missing_address: 1,
            ..ScriptSummary::default()
        };
        let text = format_summary_text(Path::new("s.jsonl"), &summary);
        assert!(text.starts_with("s.jsonl: 1 events, 0 devices"));
        assert!(text.contains("warning: 1 device events"));
    }
}
