//! Output formatting for text and JSON output.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use bluesync_core::{
    BondState, ConnectionState, DeviceSnapshot, DispatchStats, NotificationSummary,
    ProfileDescriptor, ProfileId, QueryOutcome,
};
use owo_colors::OwoColorize;
use serde::Serialize;

/// Formatting options for output.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    /// Disable colored output.
    pub no_color: bool,
}

impl FormatOptions {
    pub fn new(no_color: bool) -> Self {
        Self { no_color }
    }

    fn paint_bond(&self, state: BondState) -> String {
        if self.no_color {
            return state.to_string();
        }
        match state {
            BondState::Bonded => state.green().to_string(),
            BondState::Bonding => state.yellow().to_string(),
            BondState::None => state.dimmed().to_string(),
        }
    }

    fn paint_connection(&self, state: ConnectionState) -> String {
        if self.no_color {
            return state.to_string();
        }
        match state {
            ConnectionState::Connected => state.green().to_string(),
            ConnectionState::Connecting | ConnectionState::Disconnecting => {
                state.yellow().to_string()
            }
            ConnectionState::Disconnected => state.dimmed().to_string(),
        }
    }

    fn paint_outcome(&self, outcome: &QueryOutcome) -> String {
        if self.no_color {
            return outcome.to_string();
        }
        match outcome {
            QueryOutcome::Success(true) => outcome.green().to_string(),
            QueryOutcome::Success(false) => outcome.to_string(),
            _ => outcome.red().to_string(),
        }
    }

    fn heading(&self, text: &str) -> String {
        if self.no_color {
            text.to_string()
        } else {
            text.bold().to_string()
        }
    }
}

/// Serialize a value as pretty JSON with a trailing newline.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut out = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    out.push('\n');
    Ok(out)
}

/// Describe a notification on one line.
pub fn format_notification(summary: &NotificationSummary, opts: &FormatOptions) -> String {
    match summary {
        NotificationSummary::AdapterStateChanged { state } => format!("adapter {}", state),
        NotificationSummary::ScanningStateChanged { started } => {
            if *started {
                "discovery started".to_string()
            } else {
                "discovery finished".to_string()
            }
        }
        NotificationSummary::DeviceAdded { address, name } => match name {
            Some(name) => format!("{} added ({})", address, name),
            None => format!("{} added", address),
        },
        NotificationSummary::DeviceDeleted { address } => format!("{} deleted", address),
        NotificationSummary::DeviceBondStateChanged { address, state } => {
            format!("{} bond {}", address, opts.paint_bond(*state))
        }
        NotificationSummary::DeviceAttributesChanged { address } => {
            format!("{} attributes changed", address)
        }
        NotificationSummary::ProfileConnectionStateChanged {
            address,
            profile,
            state,
        } => format!("{} {} {}", address, profile, opts.paint_connection(*state)),
        NotificationSummary::ServiceConnected { profile } => format!("{} service bound", profile),
        NotificationSummary::ServiceDisconnected { profile } => {
            format!("{} service unbound", profile)
        }
        NotificationSummary::PairingFailed {
            address, message, ..
        } => {
            let text = format!("{} pairing failed: {}", address, message);
            if opts.no_color {
                text
            } else {
                text.red().to_string()
            }
        }
    }
}

/// Device table, one row per device plus one indented line per profile
/// that is not disconnected.
pub fn format_devices(devices: &[DeviceSnapshot], opts: &FormatOptions) -> String {
    let mut out = String::new();
    if devices.is_empty() {
        out.push_str("No devices\n");
        return out;
    }

    let _ = writeln!(
        out,
        "{}",
        opts.heading(&format!(
            "{:<17}  {:<20}  {:<7}  {:<13}  {:<7}  {:>4}",
            "ADDRESS", "NAME", "BOND", "CONNECTION", "VISIBLE", "RSSI"
        ))
    );
    for device in devices {
        let name = device
            .alias
            .as_deref()
            .or(device.name.as_deref())
            .unwrap_or("-");
        let rssi = device
            .rssi
            .map(|r| r.to_string())
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "{:<17}  {:<20}  {}  {}  {:<7}  {:>4}",
            device.address.as_str(),
            truncate(name, 20),
            pad_painted(opts.paint_bond(device.bond_state), &device.bond_state.to_string(), 7),
            pad_painted(
                opts.paint_connection(device.connection),
                &device.connection.to_string(),
                13
            ),
            if device.visible { "yes" } else { "no" },
            rssi
        );
        for (profile, state) in &device.profiles {
            if *state != ConnectionState::Disconnected {
                let _ = writeln!(out, "    {:<10} {}", profile.key(), opts.paint_connection(*state));
            }
        }
    }
    out
}

/// Pad a colored cell by its plain width so escape codes do not break
/// column alignment.
fn pad_painted(painted: String, plain: &str, width: usize) -> String {
    let padding = width.saturating_sub(plain.chars().count());
    format!("{}{}", painted, " ".repeat(padding))
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
        cut.push('~');
        cut
    }
}

pub fn format_profiles(profiles: &[ProfileDescriptor], opts: &FormatOptions) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}",
        opts.heading(&format!(
            "{:<12}  {:<16}  {:<11}  {}",
            "KEY", "NAME", "CONNECTABLE", "AUTO-CONNECT"
        ))
    );
    for profile in profiles {
        let _ = writeln!(
            out,
            "{:<12}  {:<16}  {:<11}  {}",
            profile.id.key(),
            profile.name,
            yes_no(profile.connectable),
            yes_no(profile.auto_connectable)
        );
    }
    out
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

/// Per-profile preference answers for one device.
pub fn format_outcomes(
    device: &str,
    outcomes: &[(ProfileId, QueryOutcome)],
    opts: &FormatOptions,
) -> String {
    let mut out = String::new();
    let all = !outcomes.is_empty() && outcomes.iter().all(|(_, o)| o.as_bool());
    let _ = writeln!(
        out,
        "{} preferred by all profiles: {}",
        device,
        yes_no(all)
    );
    if outcomes.is_empty() {
        out.push_str("    (no auto-connect profiles bound)\n");
    }
    for (profile, outcome) in outcomes {
        let _ = writeln!(out, "    {:<10} {}", profile.key(), opts.paint_outcome(outcome));
    }
    out
}

/// Per-profile results of a connect request. `None` marks success.
pub fn format_connect_results(
    device: &str,
    results: &BTreeMap<ProfileId, Option<String>>,
) -> String {
    let mut out = String::new();
    if results.is_empty() {
        let _ = writeln!(out, "{}: no profiles to connect", device);
        return out;
    }
    for (profile, error) in results {
        match error {
            None => {
                let _ = writeln!(out, "{}: {} connect requested", device, profile);
            }
            Some(e) => {
                let _ = writeln!(out, "{}: {} connect failed: {}", device, profile, e);
            }
        }
    }
    out
}

pub fn format_stats(stats: &DispatchStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "events handled:          {}", stats.events_handled);
    let _ = writeln!(out, "events dropped:          {}", stats.events_dropped);
    let _ = writeln!(out, "notifications published: {}", stats.notifications_published);
    let _ = writeln!(out, "listener failures:       {}", stats.listener_failures);
    let _ = writeln!(out, "query timeouts:          {}", stats.query_timeouts);
    let _ = writeln!(out, "queries:                 {}", stats.queries.count);
    if let Some(avg) = stats.queries.avg_duration_ms {
        let _ = writeln!(out, "query avg latency:       {:.1} ms", avg);
    }
    out
}

/// Write to a file when given, stdout otherwise.
pub fn write_output(output: Option<&Path>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }
        None => {
            print!("{}", content);
            io::stdout().flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bluesync_core::{Address, DeviceClass};

    fn plain() -> FormatOptions {
        FormatOptions::new(true)
    }

    fn address() -> Address {
        "aa:bb:cc:dd:ee:ff".parse().unwrap()
    }

    fn snapshot() -> DeviceSnapshot {
        let mut profiles = BTreeMap::new();
        profiles.insert(ProfileId::A2dp, ConnectionState::Connected);
        profiles.insert(ProfileId::Headset, ConnectionState::Disconnected);
        DeviceSnapshot {
            address: address(),
            name: Some("Headphones".to_string()),
            alias: None,
            class: DeviceClass::default(),
            rssi: Some(-52),
            bond_state: BondState::Bonded,
            visible: true,
            uuids: Vec::new(),
            profiles,
            connection: ConnectionState::Connected,
            last_seen: None,
        }
    }

    #[test]
    fn test_format_notification_plain() {
        let added = NotificationSummary::DeviceAdded {
            address: address(),
            name: Some("Headphones".to_string()),
        };
        assert_eq!(
            format_notification(&added, &plain()),
            "AA:BB:CC:DD:EE:FF added (Headphones)"
        );

        let profile = NotificationSummary::ProfileConnectionStateChanged {
            address: address(),
            profile: ProfileId::A2dp,
            state: ConnectionState::Connecting,
        };
        assert_eq!(
            format_notification(&profile, &plain()),
            "AA:BB:CC:DD:EE:FF a2dp connecting"
        );
    }

    #[test]
    fn test_format_devices_lists_active_profiles_only() {
        let text = format_devices(&[snapshot()], &plain());
        let lines: Vec<&str> = text.lines().collect();

        assert!(lines[0].starts_with("ADDRESS"));
        assert!(lines[1].starts_with("AA:BB:CC:DD:EE:FF"));
        assert!(lines[1].contains("Headphones"));
        assert!(lines[1].contains("bonded"));
        assert!(lines[1].ends_with(" -52"));
        assert_eq!(lines.len(), 3);
        assert!(lines[2].contains("a2dp"));
    }

    #[test]
    fn test_format_devices_empty() {
        assert_eq!(format_devices(&[], &plain()), "No devices\n");
    }

    #[test]
    fn test_alias_takes_precedence() {
        let mut device = snapshot();
        device.alias = Some("Kitchen".to_string());
        assert!(format_devices(&[device], &plain()).contains("Kitchen"));
    }

    #[test]
    fn test_format_outcomes_fails_closed() {
        let outcomes = vec![
            (ProfileId::A2dp, QueryOutcome::Success(true)),
            (ProfileId::Headset, QueryOutcome::Timeout),
        ];
        let text = format_outcomes("AA:BB:CC:DD:EE:FF", &outcomes, &plain());
        assert!(text.starts_with("AA:BB:CC:DD:EE:FF preferred by all profiles: no"));
        assert!(text.contains("timed out"));

        let none = format_outcomes("AA:BB:CC:DD:EE:FF", &[], &plain());
        assert!(none.contains("preferred by all profiles: no"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 20), "short");
        assert_eq!(truncate("abcdefghij", 5), "abcd~");
    }

    #[test]
    fn test_json_has_trailing_newline() {
        let summary = NotificationSummary::ServiceConnected {
            profile: ProfileId::Headset,
        };
        let json = to_json(&summary).unwrap();
        assert!(json.ends_with("}\n"));
        assert!(json.contains("\"type\": \"service_connected\""));
    }
}
