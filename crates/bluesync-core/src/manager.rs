//! Top-level wiring.
//!
//! [`BluetoothManager`] owns the registry, profile tracker, fan-out, and
//! dispatcher, and runs the dispatcher loop on a background task. Build it
//! with [`BluetoothManager::builder`], register profile services, then call
//! [`BluetoothManager::start`].
//!
//! ```
//! use std::sync::Arc;
//! use bluesync_core::{BluetoothManager, InboundEvent};
//! use bluesync_core::mock::MockProfileService;
//! use bluesync_types::{Address, ProfileId};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> bluesync_core::Result<()> {
//! let manager = BluetoothManager::builder()
//!     .service(Arc::new(MockProfileService::new(ProfileId::A2dp)))
//!     .build()?;
//! manager.start()?;
//!
//! let address = Address::new("AA:BB:CC:DD:EE:FF")?;
//! manager.send(InboundEvent::found(address.clone())).await?;
//! manager.shutdown().await;
//!
//! assert!(manager.registry().find_device(&address).await.is_some());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bluesync_types::{Address, ProfileId};

use crate::dispatcher::{AdapterStatus, DEFAULT_EVENT_CAPACITY, Dispatcher, DispatcherHandle};
use crate::error::{Error, Result};
use crate::events::{InboundEvent, NotificationSummary};
use crate::fanout::{DeviceListener, Fanout, SubscriptionId};
use crate::metrics::DispatchMetrics;
use crate::profile::{LocalProfile, ManagedProfile, ProfileService, ProfileTracker};
use crate::query::{QueryBatch, QueryOutcome};
use crate::registry::DeviceRegistry;
use crate::settings::{self, MemorySettings, SettingsStore};

/// Configuration for [`BluetoothManager`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Capacity of the inbound event queue.
    pub event_capacity: usize,
    /// Summaries buffered for each broadcast receiver.
    pub broadcast_capacity: usize,
    /// Default per-query timeout for query batches, in milliseconds.
    pub query_timeout_ms: u64,
    /// Deadline for a single profile service call, in milliseconds.
    pub service_timeout_ms: u64,
    /// Profiles to manage. Services for other profiles are ignored.
    pub profiles: Vec<ProfileId>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            event_capacity: DEFAULT_EVENT_CAPACITY,
            broadcast_capacity: 100,
            query_timeout_ms: 5_000,
            service_timeout_ms: 10_000,
            profiles: ProfileId::ALL.to_vec(),
        }
    }
}

impl ManagerConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn service_timeout(&self) -> Duration {
        Duration::from_millis(self.service_timeout_ms)
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(Error::invalid_config("event_capacity must be at least 1"));
        }
        if self.broadcast_capacity == 0 {
            return Err(Error::invalid_config(
                "broadcast_capacity must be at least 1",
            ));
        }
        if self.query_timeout_ms == 0 {
            return Err(Error::invalid_config("query_timeout_ms must be positive"));
        }
        if self.service_timeout_ms == 0 {
            return Err(Error::invalid_config("service_timeout_ms must be positive"));
        }
        for (index, profile) in self.profiles.iter().enumerate() {
            if self.profiles[..index].contains(profile) {
                return Err(Error::invalid_config(format!(
                    "profile '{}' listed more than once",
                    profile
                )));
            }
        }
        Ok(())
    }
}

/// Builder for [`BluetoothManager`].
#[must_use]
#[derive(Default)]
pub struct BluetoothManagerBuilder {
    config: ManagerConfig,
    services: Vec<Arc<dyn ProfileService>>,
    settings: Option<Arc<dyn SettingsStore>>,
}

impl BluetoothManagerBuilder {
    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a profile service.
    pub fn service(mut self, service: Arc<dyn ProfileService>) -> Self {
        self.services.push(service);
        self
    }

    /// Use an external settings store instead of an in-memory one.
    pub fn settings(mut self, settings: Arc<dyn SettingsStore>) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Validate the configuration and assemble the components.
    pub fn build(self) -> Result<BluetoothManager> {
        self.config.validate()?;

        let settings: Arc<dyn SettingsStore> = match self.settings {
            Some(settings) => settings,
            None => Arc::new(MemorySettings::new()),
        };
        let services: Vec<Arc<dyn ProfileService>> = self
            .services
            .into_iter()
            .filter(|s| {
                let enabled = self.config.profiles.contains(&s.profile());
                if !enabled {
                    debug!("Profile {} disabled by configuration", s.profile());
                }
                enabled
            })
            .collect();

        let profiles = Arc::new(ProfileTracker::new(
            services,
            Arc::clone(&settings),
            self.config.service_timeout(),
        ));
        let metrics = DispatchMetrics::shared();
        let fanout = Arc::new(Fanout::new(self.config.broadcast_capacity));
        let dispatcher = Dispatcher::new(
            Arc::new(DeviceRegistry::new()),
            profiles,
            fanout,
            Arc::clone(&settings),
            self.config.event_capacity,
        )
        .with_metrics(Arc::clone(&metrics));

        Ok(BluetoothManager {
            config: self.config,
            dispatcher: Arc::new(dispatcher),
            settings,
            metrics,
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        })
    }
}

/// Owns every component and the dispatcher task.
pub struct BluetoothManager {
    config: ManagerConfig,
    dispatcher: Arc<Dispatcher>,
    settings: Arc<dyn SettingsStore>,
    metrics: Arc<DispatchMetrics>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl std::fmt::Debug for BluetoothManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BluetoothManager")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .field("running", &self.is_running())
            .finish()
    }
}

impl BluetoothManager {
    pub fn builder() -> BluetoothManagerBuilder {
        BluetoothManagerBuilder::default()
    }

    /// Hand every profile service a dispatcher handle, then start the loop.
    ///
    /// Calling it again while running does nothing. Must be called from
    /// within a Tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            return Ok(());
        }
        if self.cancel.is_cancelled() {
            return Err(Error::DispatcherClosed);
        }

        self.dispatcher.profiles().attach(&self.dispatcher.handle());
        *task = Some(Arc::clone(&self.dispatcher).spawn(self.cancel.child_token()));
        info!(
            "Bluetooth manager started with {} profiles",
            self.dispatcher.profiles().profiles().len()
        );
        Ok(())
    }

    /// Whether the dispatcher task was started and not yet shut down.
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
            && self
                .task
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_some()
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn handle(&self) -> DispatcherHandle {
        self.dispatcher.handle()
    }

    /// Queue one inbound event.
    pub async fn send(&self, event: InboundEvent) -> Result<()> {
        self.dispatcher.handle().send(event).await
    }

    /// Wait until every event sent so far has been applied.
    pub async fn flush(&self) -> Result<()> {
        self.dispatcher.handle().flush().await
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        self.dispatcher.registry()
    }

    pub fn profiles(&self) -> &Arc<ProfileTracker> {
        self.dispatcher.profiles()
    }

    pub fn fanout(&self) -> &Arc<Fanout> {
        self.dispatcher.fanout()
    }

    pub fn settings(&self) -> &Arc<dyn SettingsStore> {
        &self.settings
    }

    pub fn metrics(&self) -> &Arc<DispatchMetrics> {
        &self.metrics
    }

    pub fn adapter_status(&self) -> AdapterStatus {
        self.dispatcher.adapter_status()
    }

    pub fn subscribe(&self, listener: impl DeviceListener + 'static) -> SubscriptionId {
        self.fanout().subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.fanout().unsubscribe(id)
    }

    /// Receive notification summaries on a broadcast channel.
    pub fn notifications(&self) -> broadcast::Receiver<NotificationSummary> {
        self.fanout().channel()
    }

    /// Connectable profiles that should be used for a device: bound,
    /// auto-connectable, preferred, and not opted out.
    async fn auto_connect_profiles(&self, device: &Address) -> Vec<Arc<ManagedProfile>> {
        let mut selected = Vec::new();
        for profile in self.profiles().ready_profiles() {
            if !profile.is_auto_connectable()
                || settings::is_auto_connect_opted_out(self.settings.as_ref(), profile.id(), device)
            {
                continue;
            }
            if profile.is_preferred(device).await {
                selected.push(profile);
            }
        }
        selected
    }

    /// Connect every preferred auto-connect profile of a known device.
    ///
    /// Profiles are connected concurrently. The map holds one result per
    /// attempted profile and is empty when nothing qualified.
    pub async fn connect_device(
        &self,
        device: &Address,
    ) -> Result<HashMap<ProfileId, Result<()>>> {
        if self.registry().find_device(device).await.is_none() {
            return Err(Error::DeviceNotFound(device.clone()));
        }

        let profiles = self.auto_connect_profiles(device).await;
        if profiles.is_empty() {
            debug!("No auto-connect profiles for {}", device);
        }
        let results = join_all(profiles.iter().map(|p| async move {
            let result = p.connect(device).await;
            if let Err(e) = &result {
                warn!("Connecting {} on {} failed: {}", device, p.id(), e);
            }
            (p.id(), result)
        }))
        .await;
        Ok(results.into_iter().collect())
    }

    /// Disconnect every bound connectable profile that reports the device
    /// as connected or connecting.
    pub async fn disconnect_device(
        &self,
        device: &Address,
    ) -> Result<HashMap<ProfileId, Result<()>>> {
        if self.registry().find_device(device).await.is_none() {
            return Err(Error::DeviceNotFound(device.clone()));
        }

        let mut targets = Vec::new();
        for profile in self.profiles().ready_profiles() {
            if !profile.is_connectable() {
                continue;
            }
            let state = profile.connection_state(device).await;
            if state.is_connected() || state.is_transitional() {
                targets.push(profile);
            }
        }

        let results = join_all(
            targets
                .iter()
                .map(|p| async move { (p.id(), p.disconnect(device).await) }),
        )
        .await;
        Ok(results.into_iter().collect())
    }

    /// Ask every bound auto-connectable profile whether the device is
    /// preferred, concurrently and with the configured timeout.
    pub async fn preference_outcomes(&self, device: &Address) -> Vec<(ProfileId, QueryOutcome)> {
        let profiles: Vec<Arc<ManagedProfile>> = self
            .profiles()
            .ready_profiles()
            .into_iter()
            .filter(|p| p.is_auto_connectable())
            .collect();

        let mut builder = QueryBatch::builder()
            .timeout(self.config.query_timeout())
            .metrics(Arc::clone(&self.metrics));
        let ids: Vec<_> = profiles
            .iter()
            .map(|profile| {
                let profile = Arc::clone(profile);
                let device = device.clone();
                builder.push(profile.id().key(), async move {
                    Ok::<_, Error>(profile.is_preferred(&device).await)
                })
            })
            .collect();
        let mut batch = builder.spawn();

        let mut outcomes = Vec::with_capacity(ids.len());
        for (profile, id) in profiles.iter().zip(ids) {
            outcomes.push((profile.id(), batch.outcome(id).await));
        }
        outcomes
    }

    /// Whether every bound auto-connectable profile prefers the device.
    ///
    /// Fails closed: a profile that errors or does not answer in time
    /// counts as not preferred. `false` when no such profile is bound.
    pub async fn all_preferred(&self, device: &Address) -> bool {
        let outcomes = self.preference_outcomes(device).await;
        !outcomes.is_empty() && outcomes.iter().all(|(_, o)| o.as_bool())
    }

    /// Stop the dispatcher and release every profile binding.
    ///
    /// Events already queued are applied before the loop exits. Safe to
    /// call more than once.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Dispatcher stopped with error: {}", e),
                Err(e) => warn!("Dispatcher task failed: {}", e),
            }
        }
        self.profiles().close().await;
        info!("Bluetooth manager shut down");
    }
}

impl Drop for BluetoothManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
