//! Bluetooth device state synchronization core.
//!
//! This crate keeps a consistent, observable model of nearby and paired
//! Bluetooth devices and of the per-device connection state of each
//! supported profile, driven by asynchronous events from the platform
//! Bluetooth stack.
//!
//! # Components
//!
//! | Component | Module | Role |
//! |-----------|--------|------|
//! | Device registry | [`registry`] | One shared record per hardware address |
//! | Profile tracker | [`profile`] | Uniform [`LocalProfile`] interface over bindable services |
//! | Event dispatcher | [`dispatcher`] | Applies [`InboundEvent`]s in arrival order on one task |
//! | Fan-out | [`fanout`] | Delivers [`Notification`]s to listeners, isolating failures |
//! | Query batches | [`query`] | Concurrent boolean queries that fail closed |
//!
//! [`BluetoothManager`] wires them together.
//!
//! # Data Flow
//!
//! ```text
//! platform ──InboundEvent──▶ Dispatcher ──▶ DeviceRegistry / ProfileTracker
//!                                 │
//!                                 └──Notification──▶ Fanout ──▶ listeners
//!                                                          └──▶ broadcast channel
//! ```
//!
//! Profile services report bind and unbind through the same queue as every
//! other event, so all state changes are applied by the dispatcher task.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use bluesync_core::{BluetoothManager, FnListener, InboundEvent};
//! use bluesync_types::Address;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = BluetoothManager::builder().build()?;
//! manager.subscribe(FnListener::new(|n| {
//!     println!("{:?}", n.summary());
//!     Ok(())
//! }));
//! manager.start()?;
//!
//! let headset: Address = "aa:bb:cc:dd:ee:ff".parse()?;
//! manager.send(InboundEvent::found(headset.clone())).await?;
//! manager.shutdown().await;
//!
//! let device = manager.registry().find_device(&headset).await.unwrap();
//! assert!(device.is_visible());
//! # Ok(())
//! # }
//! ```

pub mod dispatcher;
pub mod error;
pub mod events;
pub mod fanout;
pub mod manager;
pub mod metrics;
pub mod mock;
pub mod profile;
pub mod query;
pub mod registry;
pub mod replay;
pub mod settings;

// Core exports
pub use dispatcher::{AdapterStatus, Dispatcher, DispatcherHandle};
pub use error::{Error, Result};
pub use events::{InboundEvent, Notification, NotificationSummary};
pub use fanout::{DeviceListener, Fanout, FnListener, ListenerResult, PublishReport, SubscriptionId};
pub use manager::{BluetoothManager, BluetoothManagerBuilder, ManagerConfig};
pub use metrics::{DispatchMetrics, DispatchStats, LatencyStats};
pub use profile::{
    BindOutcome, LocalProfile, ManagedProfile, Priority, ProfileDescriptor, ProfileService,
    ProfileTracker,
};
pub use query::{QueryBatch, QueryId, QueryOutcome};
pub use registry::{DeviceHandle, DeviceRecord, DeviceRegistry, DeviceSnapshot, DeviceUpdate};
pub use settings::{MemorySettings, SettingsStore};

// Re-export from bluesync-types
pub use bluesync_types::uuids;
pub use bluesync_types::{
    AdapterState, Address, BondFailureReason, BondState, ConnectionState, DeviceClass, ProfileId,
};
