//! Event scripts.
//!
//! An event script is a JSON Lines file with one [`InboundEvent`] per line.
//! Blank lines and lines starting with `#` are ignored. Scripts are used to
//! replay captured platform traffic and to drive the CLI.
//!
//! Parsing is strict: any line that does not decode, including one whose
//! address is present but not a valid hardware address, rejects the whole
//! script. An event that decodes but omits its address is accepted here
//! and dropped by the dispatcher, the same as live traffic.
//!
//! ```text
//! # pair a headset
//! {"kind":"device_found","address":"AA:BB:CC:DD:EE:FF","name":"Headset","rssi":-40}
//! {"kind":"bond_state_changed","address":"AA:BB:CC:DD:EE:FF","state":"bonding"}
//! {"kind":"bond_state_changed","address":"AA:BB:CC:DD:EE:FF","state":"bonded"}
//! ```

use std::io::BufRead;
use std::path::Path;

use tracing::debug;

use crate::dispatcher::DispatcherHandle;
use crate::error::{Error, Result};
use crate::events::InboundEvent;

/// Parse a script held in memory.
///
/// Fails on the first line that is not a valid event, naming the line.
pub fn parse_script(script: &str) -> Result<Vec<InboundEvent>> {
    read_script(script.as_bytes())
}

/// Parse a script from any buffered reader.
pub fn read_script(reader: impl BufRead) -> Result<Vec<InboundEvent>> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let event = serde_json::from_str(trimmed)
            .map_err(|e| Error::malformed(format!("line {}: {}", index + 1, e)))?;
        events.push(event);
    }
    debug!("Parsed {} scripted events", events.len());
    Ok(events)
}

/// Parse a script file.
pub fn load_script(path: impl AsRef<Path>) -> Result<Vec<InboundEvent>> {
    let file = std::fs::File::open(path.as_ref())?;
    read_script(std::io::BufReader::new(file))
}

/// Render events as a script, one per line.
pub fn write_script(events: &[InboundEvent]) -> Result<String> {
    let mut out = String::new();
    for event in events {
        let line = serde_json::to_string(event).map_err(|e| Error::malformed(e.to_string()))?;
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

/// Queue every event in order. Returns how many were sent.
pub async fn replay(handle: &DispatcherHandle, events: Vec<InboundEvent>) -> Result<usize> {
    let mut sent = 0;
    for event in events {
        handle.send(event).await?;
        sent += 1;
    }
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bluesync_types::{Address, BondState};

    const SCRIPT: &str = r#"
# comment
{"kind":"device_found","address":"aa:bb:cc:dd:ee:ff","name":"Headset","rssi":-40}

{"kind":"bond_state_changed","address":"AA:BB:CC:DD:EE:FF","state":"bonded"}
"#;

    #[test]
    fn test_parse_script_skips_comments_and_blanks() {
        let events = parse_script(SCRIPT).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind(), "device_found");
        assert_eq!(
            events[1],
            InboundEvent::bond(Address::new("AA:BB:CC:DD:EE:FF").unwrap(), BondState::Bonded)
        );
    }

    #[test]
    fn test_parse_error_names_line() {
        let err = parse_script("{\"kind\":\"device_found\"}\nnot json\n").unwrap_err();
        assert!(matches!(err, Error::Malformed(_)));
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_invalid_address_rejects_script() {
        let script = concat!(
            "{\"kind\":\"device_found\",\"address\":\"AA:BB:CC:DD:EE:FF\"}\n",
            "{\"kind\":\"device_found\",\"address\":\"zz zz\"}\n",
        );
        let err = parse_script(script).unwrap_err();
        assert!(matches!(err, Error::Malformed(_)));
        assert!(err.to_string().contains("line 2"));

        // An absent address still parses.
        let events = parse_script("{\"kind\":\"device_found\"}").unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].address().is_none());
    }

    #[test]
    fn test_write_then_parse() {
        let events = parse_script(SCRIPT).unwrap();
        let written = write_script(&events).unwrap();
        assert_eq!(written.lines().count(), 2);
        assert_eq!(parse_script(&written).unwrap(), events);
    }

    #[test]
    fn test_missing_file() {
        let err = load_script("/nonexistent/bluesync/script.jsonl").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
