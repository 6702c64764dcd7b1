//! Replay an event script through a manager backed by mock services.
//!
//! Run with: cargo run --example replay_events [-- path/to/script.jsonl]
//!
//! Without an argument a built-in script pairs a headset, connects its
//! audio profiles, and then loses an unbonded speaker.

use std::env;
use std::sync::Arc;

use bluesync_core::mock::MockProfileService;
use bluesync_core::replay;
use bluesync_core::{BluetoothManager, FnListener, ProfileId};
use tracing_subscriber::EnvFilter;

const DEMO_SCRIPT: &str = r#"
{"kind":"adapter_state_changed","state":"on"}
{"kind":"scanning_state_changed","discovering":true}
{"kind":"service_connected","profile":"a2dp"}
{"kind":"service_connected","profile":"headset"}
{"kind":"device_found","address":"00:1A:7D:DA:71:13","name":"Headphones","rssi":-48}
{"kind":"device_found","address":"5C:F3:70:00:00:01","name":"Speaker","rssi":-80}
{"kind":"bond_state_changed","address":"00:1A:7D:DA:71:13","state":"bonding"}
{"kind":"bond_state_changed","address":"00:1A:7D:DA:71:13","state":"bonded"}
{"kind":"profile_connection_state_changed","address":"00:1A:7D:DA:71:13","profile":"a2dp","state":"connecting"}
{"kind":"profile_connection_state_changed","address":"00:1A:7D:DA:71:13","profile":"a2dp","state":"connected"}
{"kind":"device_disappeared","address":"5C:F3:70:00:00:01"}
{"kind":"scanning_state_changed","discovering":false}
"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let events = match env::args().nth(1) {
        Some(path) => replay::load_script(&path)?,
        None => replay::parse_script(DEMO_SCRIPT)?,
    };

    let mut builder = BluetoothManager::builder();
    for profile in ProfileId::ALL {
        builder = builder.service(Arc::new(MockProfileService::new(profile)));
    }
    let manager = builder.build()?;

    manager.subscribe(FnListener::new(|n| {
        println!("  {:?}", n.summary());
        Ok(())
    }));

    println!("Replaying {} events", events.len());
    manager.start()?;
    replay::replay(&manager.handle(), events).await?;
    manager.shutdown().await;

    println!("\nDevices:");
    for device in manager.registry().devices().await {
        println!(
            "  {} {:<12} bond={} connection={} visible={}",
            device.address(),
            device.display_name(),
            device.bond_state(),
            device.connection_summary(),
            device.is_visible()
        );
    }

    let stats = manager.metrics().snapshot();
    println!(
        "\n{} events handled, {} dropped, {} notifications",
        stats.events_handled, stats.events_dropped, stats.notifications_published
    );
    Ok(())
}
