//! Replay command implementation.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use bluesync_core::mock::MockProfileService;
use bluesync_core::replay;
use bluesync_core::{
    Address, BluetoothManager, DeviceSnapshot, DispatchStats, FnListener, LocalProfile,
    ManagerConfig, NotificationSummary, ProfileId, QueryOutcome,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::{OutputFormat, ReplayArgs};
use crate::config::Config;
use crate::format::{
    FormatOptions, format_connect_results, format_devices, format_notification,
    format_outcomes, format_stats, to_json, write_output,
};

/// Everything a replay produced.
#[derive(Debug, Serialize)]
pub struct ReplayReport {
    pub events: usize,
    pub notifications: Vec<NotificationSummary>,
    pub devices: Vec<DeviceSnapshot>,
    pub connections: Vec<ConnectReport>,
    pub queries: Vec<QueryReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<DispatchStats>,
}

#[derive(Debug, Serialize)]
pub struct ConnectReport {
    pub device: Address,
    /// Set when the request was refused as a whole.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Per-profile error, `None` for success.
    pub profiles: BTreeMap<ProfileId, Option<String>>,
}

#[derive(Debug, Serialize)]
pub struct QueryReport {
    pub device: Address,
    pub all_preferred: bool,
    pub outcomes: Vec<ProfileOutcome>,
}

#[derive(Debug, Serialize)]
pub struct ProfileOutcome {
    pub profile: ProfileId,
    pub outcome: QueryOutcome,
}

/// Manager settings after command-line overrides.
pub fn effective_config(args: &ReplayArgs, config: &Config) -> Result<ManagerConfig> {
    let mut manager = config.manager.clone();
    if !args.profile.is_empty() {
        manager.profiles = args.profile.clone();
    }
    if let Some(ms) = args.query_timeout_ms {
        manager.query_timeout_ms = ms;
    }
    manager.validate()?;
    Ok(manager)
}

/// Run a script through a manager backed by in-memory profile services.
pub async fn run_replay(args: &ReplayArgs, config: &Config) -> Result<ReplayReport> {
    let events = replay::load_script(&args.script)
        .with_context(|| format!("Failed to load script: {}", args.script.display()))?;
    let manager_config = effective_config(args, config)?;

    let mut builder = BluetoothManager::builder().config(manager_config.clone());
    for profile in &manager_config.profiles {
        builder = builder.service(Arc::new(MockProfileService::new(*profile)));
    }
    let manager = builder.build()?;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    manager.subscribe(FnListener::new(move |n| {
        sink.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(n.summary());
        Ok(())
    }));

    manager.start()?;
    let sent = replay::replay(&manager.handle(), events).await?;
    manager.flush().await?;
    info!("Replayed {} events from {}", sent, args.script.display());

    for device in &args.prefer {
        for profile in manager.profiles().ready_profiles() {
            if let Err(e) = profile.set_preferred(device, true).await {
                warn!("Could not prefer {} on {}: {}", device, profile.id(), e);
            }
        }
    }

    let mut connections = Vec::with_capacity(args.connect.len());
    for device in &args.connect {
        let report = match manager.connect_device(device).await {
            Ok(results) => ConnectReport {
                device: device.clone(),
                error: None,
                profiles: results
                    .into_iter()
                    .map(|(profile, result)| (profile, result.err().map(|e| e.to_string())))
                    .collect(),
            },
            Err(e) => ConnectReport {
                device: device.clone(),
                error: Some(e.to_string()),
                profiles: BTreeMap::new(),
            },
        };
        connections.push(report);
    }
    // Services report connection progress through the queue.
    manager.flush().await?;

    let mut queries = Vec::with_capacity(args.query.len());
    for device in &args.query {
        let outcomes: Vec<ProfileOutcome> = manager
            .preference_outcomes(device)
            .await
            .into_iter()
            .map(|(profile, outcome)| ProfileOutcome { profile, outcome })
            .collect();
        let all_preferred =
            !outcomes.is_empty() && outcomes.iter().all(|o| o.outcome.as_bool());
        queries.push(QueryReport {
            device: device.clone(),
            all_preferred,
            outcomes,
        });
    }

    manager.shutdown().await;

    let devices = manager
        .registry()
        .devices()
        .await
        .iter()
        .map(|d| d.snapshot())
        .collect();
    let notifications = std::mem::take(&mut *seen.lock().unwrap_or_else(PoisonError::into_inner));
    let stats = args.stats.then(|| manager.metrics().snapshot());

    Ok(ReplayReport {
        events: sent,
        notifications,
        devices,
        connections,
        queries,
        stats,
    })
}

pub fn render_text(report: &ReplayReport, args: &ReplayArgs, opts: &FormatOptions) -> String {
    let mut out = String::new();
    if !args.devices_only {
        for summary in &report.notifications {
            let _ = writeln!(out, "{}", format_notification(summary, opts));
        }
        if !report.notifications.is_empty() {
            out.push('\n');
        }
    }

    out.push_str(&format_devices(&report.devices, opts));

    if !report.connections.is_empty() {
        out.push('\n');
    }
    for connection in &report.connections {
        let device = connection.device.as_str();
        match &connection.error {
            Some(error) => {
                let _ = writeln!(out, "{}: {}", device, error);
            }
            None => out.push_str(&format_connect_results(device, &connection.profiles)),
        }
    }

    if !report.queries.is_empty() {
        out.push('\n');
    }
    for query in &report.queries {
        let outcomes: Vec<(ProfileId, QueryOutcome)> = query
            .outcomes
            .iter()
            .map(|o| (o.profile, o.outcome.clone()))
            .collect();
        out.push_str(&format_outcomes(query.device.as_str(), &outcomes, opts));
    }

    if let Some(stats) = &report.stats {
        out.push('\n');
        out.push_str(&format_stats(stats));
    }
    out
}

pub async fn cmd_replay(
    args: &ReplayArgs,
    config: &Config,
    opts: &FormatOptions,
    output: Option<&Path>,
) -> Result<()> {
    let report = run_replay(args, config).await?;
    let content = match args.format.resolve(config.format) {
        OutputFormat::Json => to_json(&report)?,
        OutputFormat::Text => render_text(&report, args, opts),
    };
    write_output(output, &content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::FormatArgs;
    use bluesync_core::{BondState, ConnectionState};
    use std::io::Write;

    const SCRIPT: &str = r#"
# bind the audio services, then pair and connect a headset
{"kind":"service_connected","profile":"a2dp"}
{"kind":"service_connected","profile":"headset"}
{"kind":"device_found","address":"aa:bb:cc:dd:ee:ff","name":"Headset","rssi":-40}
{"kind":"bond_state_changed","address":"aa:bb:cc:dd:ee:ff","state":"bonding"}
{"kind":"bond_state_changed","address":"aa:bb:cc:dd:ee:ff","state":"bonded"}
{"kind":"profile_connection_state_changed","address":"aa:bb:cc:dd:ee:ff","profile":"a2dp","state":"connected"}
{"kind":"device_found","address":"11:22:33:44:55:66"}
{"kind":"device_disappeared","address":"11:22:33:44:55:66"}
"#;

    fn script_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn args(script: &Path) -> ReplayArgs {
        ReplayArgs {
            script: script.to_path_buf(),
            profile: vec![ProfileId::A2dp, ProfileId::Headset],
            prefer: Vec::new(),
            connect: Vec::new(),
            query: Vec::new(),
            query_timeout_ms: None,
            stats: false,
            devices_only: false,
            format: FormatArgs { format: None },
        }
    }

    fn headset() -> Address {
        "AA:BB:CC:DD:EE:FF".parse().unwrap()
    }

    #[tokio::test]
    async fn test_replay_builds_registry() {
        let file = script_file(SCRIPT);
        let report = run_replay(&args(file.path()), &Config::default())
            .await
            .unwrap();

        assert_eq!(report.events, 8);
        assert_eq!(report.devices.len(), 1);
        let device = &report.devices[0];
        assert_eq!(device.address, headset());
        assert_eq!(device.bond_state, BondState::Bonded);
        assert_eq!(device.profiles.get(&ProfileId::A2dp), Some(&ConnectionState::Connected));

        assert!(report.notifications.contains(&NotificationSummary::DeviceDeleted {
            address: "11:22:33:44:55:66".parse().unwrap(),
        }));
        assert!(report.stats.is_none());
    }

    #[tokio::test]
    async fn test_prefer_connect_and_query() {
        let file = script_file(SCRIPT);
        let mut args = args(file.path());
        args.prefer = vec![headset()];
        args.connect = vec![headset(), "00:00:00:00:00:01".parse().unwrap()];
        args.query = vec![headset()];
        args.stats = true;

        let report = run_replay(&args, &Config::default()).await.unwrap();

        assert_eq!(report.connections.len(), 2);
        let connected = &report.connections[0];
        assert!(connected.error.is_none());
        assert_eq!(connected.profiles.len(), 2);
        assert!(connected.profiles.values().all(Option::is_none));
        assert!(report.connections[1].error.is_some());

        let device = &report.devices[0];
        assert_eq!(
            device.profiles.get(&ProfileId::Headset),
            Some(&ConnectionState::Connected)
        );

        assert_eq!(report.queries.len(), 1);
        assert!(report.queries[0].all_preferred);
        assert_eq!(report.queries[0].outcomes.len(), 2);
        assert!(report.stats.unwrap().events_handled >= 8);
    }

    #[tokio::test]
    async fn test_query_without_bound_profiles_fails_closed() {
        let file = script_file(r#"{"kind":"device_found","address":"aa:bb:cc:dd:ee:ff"}"#);
        let mut args = args(file.path());
        args.query = vec![headset()];

        let report = run_replay(&args, &Config::default()).await.unwrap();
        assert!(!report.queries[0].all_preferred);
        assert!(report.queries[0].outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_bad_script_names_the_line() {
        let file = script_file("{\"kind\":\"device_found\"}\n{\"kind\":\"warp\"}\n");
        let err = run_replay(&args(file.path()), &Config::default())
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("line 2"));
    }

    #[tokio::test]
    async fn test_render_text() {
        let file = script_file(SCRIPT);
        let mut args = args(file.path());
        let report = run_replay(&args, &Config::default()).await.unwrap();
        let opts = FormatOptions::new(true);

        let text = render_text(&report, &args, &opts);
        assert!(text.contains("a2dp service bound"));
        assert!(text.contains("AA:BB:CC:DD:EE:FF bond bonded"));
        assert!(text.contains("ADDRESS"));

        args.devices_only = true;
        let table = render_text(&report, &args, &opts);
        assert!(table.starts_with("ADDRESS"));
    }

    #[test]
    fn test_effective_config_rejects_zero_timeout() {
        let mut args = args(Path::new("unused.jsonl"));
        args.query_timeout_ms = Some(0);
        assert!(effective_config(&args, &Config::default()).is_err());

        args.query_timeout_ms = Some(50);
        let config = effective_config(&args, &Config::default()).unwrap();
        assert_eq!(config.query_timeout_ms, 50);
        assert_eq!(config.profiles, vec![ProfileId::A2dp, ProfileId::Headset]);
    }
}
