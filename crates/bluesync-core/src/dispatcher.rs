//! Event dispatcher.
//!
//! Every [`InboundEvent`] goes through one queue and is applied by one task,
//! so events for the same address are processed in arrival order. Each
//! event's registry mutation and the notifications it causes form a single
//! step: subscribers never see a notification for a change that has not
//! been applied yet.
//!
//! Setup is two-phase. [`Dispatcher::new`] builds the state and the queue;
//! [`Dispatcher::handle`] hands out senders that profile services can keep
//! before the loop runs; [`Dispatcher::run`] (or [`Dispatcher::spawn`])
//! starts consuming.
//!
//! Re-applying an event is harmless. Upserts and change detection mean a
//! duplicate broadcast neither changes state nor re-notifies.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bluesync_types::{AdapterState, Address, BondFailureReason, BondState, ConnectionState, ProfileId};

use crate::error::{Error, Result};
use crate::events::{InboundEvent, Notification};
use crate::fanout::Fanout;
use crate::metrics::DispatchMetrics;
use crate::profile::{BindOutcome, ProfileTracker};
use crate::registry::{DeviceHandle, DeviceRegistry, DeviceUpdate};
use crate::settings::{self, SettingsStore};

/// Default capacity of the inbound event queue.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// An entry in the dispatcher queue.
#[derive(Debug)]
enum Queued {
    Event(InboundEvent),
    /// Resolved once everything queued ahead of it has been applied.
    Barrier(oneshot::Sender<()>),
}

/// Cloneable sender into the dispatcher queue.
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    tx: mpsc::Sender<Queued>,
}

impl DispatcherHandle {
    /// Queue an event, waiting for room if the queue is full.
    pub async fn send(&self, event: InboundEvent) -> Result<()> {
        self.tx
            .send(Queued::Event(event))
            .await
            .map_err(|_| Error::DispatcherClosed)
    }

    /// Wait until every event queued before this call has been applied.
    ///
    /// Fails with [`Error::DispatcherClosed`] if the loop stops first.
    pub async fn flush(&self) -> Result<()> {
        let (done, applied) = oneshot::channel();
        self.tx
            .send(Queued::Barrier(done))
            .await
            .map_err(|_| Error::DispatcherClosed)?;
        applied.await.map_err(|_| Error::DispatcherClosed)
    }

    /// Queue an event without waiting.
    ///
    /// Fails with [`Error::DispatcherClosed`] after shutdown and with
    /// [`Error::Timeout`] when the queue is full.
    pub fn try_send(&self, event: InboundEvent) -> Result<()> {
        self.tx.try_send(Queued::Event(event)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                Error::timeout("dispatcher queue full", std::time::Duration::ZERO)
            }
            mpsc::error::TrySendError::Closed(_) => Error::DispatcherClosed,
        })
    }

    /// Queue an event from a thread outside the runtime.
    ///
    /// Platform callbacks arriving on their own threads use this. Panics if
    /// called from inside an async context, like
    /// [`mpsc::Sender::blocking_send`].
    pub fn blocking_send(&self, event: InboundEvent) -> Result<()> {
        self.tx
            .blocking_send(Queued::Event(event))
            .map_err(|_| Error::DispatcherClosed)
    }

    /// Whether the dispatcher has stopped accepting events.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Adapter-level state tracked by the dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterStatus {
    pub state: AdapterState,
    pub discovering: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_discovery: Option<OffsetDateTime>,
}

/// Applies inbound events to the registry and profile tracker and publishes
/// the resulting notifications.
pub struct Dispatcher {
    registry: Arc<DeviceRegistry>,
    profiles: Arc<ProfileTracker>,
    fanout: Arc<Fanout>,
    settings: Arc<dyn SettingsStore>,
    metrics: Arc<DispatchMetrics>,
    adapter: RwLock<AdapterStatus>,
    tx: mpsc::Sender<Queued>,
    rx: Mutex<Option<mpsc::Receiver<Queued>>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("adapter", &self.adapter_status())
            .field("fanout", &self.fanout)
            .finish()
    }
}

impl Dispatcher {
    /// Build the dispatcher with a queue of `capacity` events.
    pub fn new(
        registry: Arc<DeviceRegistry>,
        profiles: Arc<ProfileTracker>,
        fanout: Arc<Fanout>,
        settings: Arc<dyn SettingsStore>,
        capacity: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let last_discovery = settings::last_discovery_timestamp(settings.as_ref());
        Self {
            registry,
            profiles,
            fanout,
            settings,
            metrics: DispatchMetrics::shared(),
            adapter: RwLock::new(AdapterStatus {
                last_discovery,
                ..AdapterStatus::default()
            }),
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Share metrics with other components.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// A sender for this dispatcher's queue.
    pub fn handle(&self) -> DispatcherHandle {
        DispatcherHandle {
            tx: self.tx.clone(),
        }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn profiles(&self) -> &Arc<ProfileTracker> {
        &self.profiles
    }

    pub fn fanout(&self) -> &Arc<Fanout> {
        &self.fanout
    }

    pub fn metrics(&self) -> &Arc<DispatchMetrics> {
        &self.metrics
    }

    /// Current adapter state, discovery flag, and last discovery time.
    pub fn adapter_status(&self) -> AdapterStatus {
        self.adapter
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Consume the queue until `cancel` fires.
    ///
    /// On cancellation the queue is closed and events already queued are
    /// still applied before returning. Returns [`Error::DispatcherClosed`]
    /// if the loop has already run.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let mut rx = self
            .rx
            .lock()
            .await
            .take()
            .ok_or(Error::DispatcherClosed)?;
        info!("Event dispatcher started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Event dispatcher cancelled");
                    break;
                }
                queued = rx.recv() => match queued {
                    Some(queued) => self.apply(queued).await,
                    None => break,
                },
            }
        }

        rx.close();
        while let Some(queued) = rx.recv().await {
            self.apply(queued).await;
        }
        info!("Event dispatcher stopped");
        Ok(())
    }

    async fn apply(&self, queued: Queued) {
        match queued {
            Queued::Event(event) => self.handle_event(event).await,
            Queued::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }

    /// Run the loop on a new task.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    /// Apply one event.
    ///
    /// The loop calls this for every queued event. Tests may call it
    /// directly to drive the dispatcher synchronously.
    pub async fn handle_event(&self, event: InboundEvent) {
        self.metrics.record_event();
        debug!("Handling {} event", event.kind());

        match event {
            InboundEvent::DeviceFound {
                address,
                name,
                rssi,
                class,
            } => {
                let Some(address) = self.require_address(address, "device_found") else {
                    return;
                };
                let update = DeviceUpdate {
                    name,
                    rssi,
                    class,
                    visible: Some(true),
                    ..DeviceUpdate::default()
                };
                self.device_found(address, update).await;
            }
            InboundEvent::DeviceDisappeared { address } => {
                let Some(address) = self.require_address(address, "device_disappeared") else {
                    return;
                };
                if let Some(device) = self.registry.take_removable(&address).await {
                    self.publish(Notification::DeviceDeleted(device));
                }
            }
            InboundEvent::NameChanged { address, name } => {
                let Some(address) = self.require_address(address, "name_changed") else {
                    return;
                };
                let update = DeviceUpdate {
                    name,
                    ..DeviceUpdate::default()
                };
                self.update_existing(&address, &update).await;
            }
            InboundEvent::BondStateChanged {
                address,
                state,
                reason,
            } => {
                let Some(address) = self.require_address(address, "bond_state_changed") else {
                    return;
                };
                self.bond_state_changed(address, state, reason).await;
            }
            InboundEvent::ClassChanged { address, class } => {
                let Some(address) = self.require_address(address, "class_changed") else {
                    return;
                };
                self.update_existing(&address, &DeviceUpdate::new().class(class))
                    .await;
            }
            InboundEvent::UuidChanged { address, uuids } => {
                let Some(address) = self.require_address(address, "uuid_changed") else {
                    return;
                };
                self.update_existing(&address, &DeviceUpdate::new().uuids(uuids))
                    .await;
            }
            InboundEvent::PairingCancel { address } => {
                let Some(address) = self.require_address(address, "pairing_cancel") else {
                    return;
                };
                if let Some(device) = self.registry.find_device(&address).await
                    && device.mark_pairing_canceled()
                {
                    self.publish(Notification::PairingFailed {
                        device,
                        reason: BondFailureReason::AuthCanceled,
                    });
                }
            }
            InboundEvent::AdapterStateChanged { state } => {
                self.adapter_state_changed(state).await;
            }
            InboundEvent::ScanningStateChanged { discovering } => {
                self.scanning_state_changed(discovering);
            }
            InboundEvent::DockUndocked { address } => {
                let Some(address) = self.require_address(address, "dock_undocked") else {
                    return;
                };
                if let Some(device) = self.registry.find_device(&address).await
                    && !device.is_bonded()
                    && device.set_visible(false)
                {
                    self.publish(Notification::DeviceAttributesChanged(device));
                }
            }
            InboundEvent::ProfileConnectionStateChanged {
                address,
                profile,
                state,
            } => {
                let Some(address) =
                    self.require_address(address, "profile_connection_state_changed")
                else {
                    return;
                };
                let device = self.upsert(address, DeviceUpdate::new()).await;
                self.set_profile_state(&device, profile, state);
            }
            InboundEvent::ServiceConnected { profile } => {
                self.service_connected(profile).await;
            }
            InboundEvent::ServiceDisconnected { profile } => {
                self.service_disconnected(profile).await;
            }
        }
    }

    fn require_address(&self, address: Option<Address>, kind: &str) -> Option<Address> {
        if address.is_none() {
            warn!("Dropping {} event without an address", kind);
            self.metrics.record_dropped();
        }
        address
    }

    fn publish(&self, notification: Notification) {
        let report = self.fanout.publish(&notification);
        self.metrics.record_publish(report.failed);
    }

    /// Find or create a record, announcing it when created.
    async fn upsert(&self, address: Address, initial: DeviceUpdate) -> DeviceHandle {
        let insertion = self.registry.get_or_insert(address, initial).await;
        if insertion.created {
            self.publish(Notification::DeviceAdded(Arc::clone(&insertion.device)));
        }
        insertion.device
    }

    async fn device_found(&self, address: Address, update: DeviceUpdate) {
        let insertion = self.registry.get_or_insert(address, update.clone()).await;
        let device = insertion.device;
        device.touch(OffsetDateTime::now_utc());

        if insertion.created {
            self.publish(Notification::DeviceAdded(device));
        } else if device.apply(&update) {
            self.publish(Notification::DeviceAttributesChanged(device));
        }
    }

    async fn update_existing(&self, address: &Address, update: &DeviceUpdate) {
        match self.registry.find_device(address).await {
            Some(device) => {
                if device.apply(update) {
                    self.publish(Notification::DeviceAttributesChanged(device));
                }
            }
            None => debug!("Attribute change for unknown device {} ignored", address),
        }
    }

    async fn bond_state_changed(&self, address: Address, state: BondState, reason: Option<i32>) {
        let device = self.upsert(address, DeviceUpdate::new()).await;
        let cancel_reported = device.pairing_cancel_pending();
        let Some(previous) = device.set_bond_state(state) else {
            return;
        };
        info!(
            "Bond state for {}: {} -> {}",
            device.address(),
            previous,
            state
        );
        self.publish(Notification::DeviceBondStateChanged(
            Arc::clone(&device),
            state,
        ));

        if state != BondState::None {
            return;
        }
        match previous {
            BondState::Bonded => {
                self.profiles.forget_device(device.address()).await;
            }
            BondState::Bonding => {
                let Some(code) = reason else {
                    return;
                };
                let reason = BondFailureReason::from_code(code);
                // A cancel was already reported through PairingCancel.
                let duplicate = cancel_reported && reason == BondFailureReason::AuthCanceled;
                if reason.is_user_visible() && !duplicate {
                    self.publish(Notification::PairingFailed { device, reason });
                }
            }
            BondState::None => {}
        }
    }

    async fn adapter_state_changed(&self, state: AdapterState) {
        let was_discovering = {
            let mut adapter = self.adapter.write().unwrap_or_else(PoisonError::into_inner);
            if adapter.state == state {
                return;
            }
            adapter.state = state;
            let was_discovering = adapter.discovering;
            if state.is_going_off() {
                adapter.discovering = false;
            }
            was_discovering
        };
        info!("Adapter state: {}", state);

        if state.is_going_off() {
            for device in self.registry.devices().await {
                device.set_visible(false);
            }
            if was_discovering {
                self.publish(Notification::ScanningStateChanged(false));
            }
        }
        self.publish(Notification::AdapterStateChanged(state));
    }

    fn scanning_state_changed(&self, discovering: bool) {
        {
            let mut adapter = self.adapter.write().unwrap_or_else(PoisonError::into_inner);
            if adapter.discovering == discovering {
                return;
            }
            adapter.discovering = discovering;
            if discovering {
                let now = OffsetDateTime::now_utc();
                adapter.last_discovery = Some(now);
                settings::record_discovery_timestamp(self.settings.as_ref(), now);
            }
        }
        debug!("Discovery {}", if discovering { "started" } else { "stopped" });
        self.publish(Notification::ScanningStateChanged(discovering));
    }

    fn set_profile_state(&self, device: &DeviceHandle, profile: ProfileId, state: ConnectionState) {
        if device.set_profile_state(profile, state) {
            debug!("{} {} -> {}", device.address(), profile, state);
            self.publish(Notification::ProfileConnectionStateChanged {
                device: Arc::clone(device),
                profile,
                state,
            });
        }
    }

    async fn service_connected(&self, profile: ProfileId) {
        match self.profiles.bind(profile).await {
            Ok(BindOutcome::Bound(connected)) => {
                for address in connected {
                    let device = self.upsert(address, DeviceUpdate::new()).await;
                    self.set_profile_state(&device, profile, ConnectionState::Connected);
                }
                self.publish(Notification::ServiceConnected(profile));
            }
            Ok(BindOutcome::AlreadyBound) => {}
            Err(e) => {
                warn!("Dropping service_connected event: {}", e);
                self.metrics.record_dropped();
            }
        }
    }

    async fn service_disconnected(&self, profile: ProfileId) {
        match self.profiles.unbind(profile) {
            Ok(true) => {
                for device in self.registry.devices().await {
                    if device.profile_state(profile) != ConnectionState::Disconnected {
                        self.set_profile_state(&device, profile, ConnectionState::Disconnected);
                    }
                }
                self.publish(Notification::ServiceDisconnected(profile));
            }
            Ok(false) => {}
            Err(e) => {
                warn!("Dropping service_disconnected event: {}", e);
                self.metrics.record_dropped();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::events::NotificationSummary;
    use crate::fanout::FnListener;
    use crate::mock::MockProfileService;
    use crate::profile::{LocalProfile, Priority, ProfileService};
    use crate::settings::MemorySettings;

    struct Harness {
        dispatcher: Dispatcher,
        seen: Arc<std::sync::Mutex<Vec<NotificationSummary>>>,
        settings: Arc<MemorySettings>,
    }

    impl Harness {
        fn new(services: Vec<Arc<dyn ProfileService>>) -> Self {
            let settings = Arc::new(MemorySettings::new());
            let profiles = Arc::new(ProfileTracker::new(
                services,
                settings.clone(),
                Duration::from_secs(1),
            ));
            let fanout = Arc::new(Fanout::new(16));
            let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
            let sink = Arc::clone(&seen);
            fanout.subscribe(FnListener::new(move |n| {
                sink.lock().unwrap().push(n.summary());
                Ok(())
            }));
            let dispatcher = Dispatcher::new(
                Arc::new(DeviceRegistry::new()),
                profiles,
                fanout,
                settings.clone(),
                16,
            );
            Self {
                dispatcher,
                seen,
                settings,
            }
        }

        fn take(&self) -> Vec<NotificationSummary> {
            std::mem::take(&mut *self.seen.lock().unwrap())
        }
    }

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_device_found_creates_once() {
        let h = Harness::new(vec![]);
        let event = InboundEvent::DeviceFound {
            address: Some(addr("AA:BB:CC:DD:EE:FF")),
            name: Some("Headset".into()),
            rssi: Some(-40),
            class: None,
        };
        h.dispatcher.handle_event(event.clone()).await;
        h.dispatcher.handle_event(event).await;

        assert_eq!(h.dispatcher.registry().len().await, 1);
        let seen = h.take();
        assert_eq!(seen.len(), 1);
        assert!(matches!(seen[0], NotificationSummary::DeviceAdded { .. }));

        let device = h
            .dispatcher
            .registry()
            .find_device(&addr("AA:BB:CC:DD:EE:FF"))
            .await
            .unwrap();
        assert!(device.is_visible());
        assert!(device.last_seen().is_some());
        assert_eq!(device.bond_state(), BondState::None);
    }

    #[tokio::test]
    async fn test_missing_address_is_dropped() {
        let h = Harness::new(vec![]);
        h.dispatcher
            .handle_event(InboundEvent::DeviceDisappeared { address: None })
            .await;
        assert!(h.take().is_empty());
        assert_eq!(h.dispatcher.metrics().snapshot().events_dropped, 1);
    }

    #[tokio::test]
    async fn test_name_change_for_unknown_device_is_noop() {
        let h = Harness::new(vec![]);
        h.dispatcher
            .handle_event(InboundEvent::NameChanged {
                address: Some(addr("AA:BB:CC:DD:EE:FF")),
                name: Some("Ghost".into()),
            })
            .await;
        assert!(h.dispatcher.registry().is_empty().await);
        assert!(h.take().is_empty());
    }

    #[tokio::test]
    async fn test_bond_failure_surfaces_reason() {
        let h = Harness::new(vec![]);
        let a = addr("AA:BB:CC:DD:EE:FF");
        h.dispatcher
            .handle_event(InboundEvent::bond(a.clone(), BondState::Bonding))
            .await;
        h.dispatcher
            .handle_event(InboundEvent::BondStateChanged {
                address: Some(a.clone()),
                state: BondState::None,
                reason: Some(1),
            })
            .await;

        let seen = h.take();
        assert!(matches!(seen[0], NotificationSummary::DeviceAdded { .. }));
        assert!(matches!(
            seen.last(),
            Some(NotificationSummary::PairingFailed {
                reason: BondFailureReason::AuthFailed,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_pairing_cancel_reported_once() {
        let h = Harness::new(vec![]);
        let a = addr("AA:BB:CC:DD:EE:FF");
        h.dispatcher
            .handle_event(InboundEvent::bond(a.clone(), BondState::Bonding))
            .await;
        h.take();

        let cancel = InboundEvent::PairingCancel {
            address: Some(a.clone()),
        };
        h.dispatcher.handle_event(cancel.clone()).await;
        h.dispatcher.handle_event(cancel).await;
        h.dispatcher
            .handle_event(InboundEvent::BondStateChanged {
                address: Some(a),
                state: BondState::None,
                reason: Some(3),
            })
            .await;

        let failures = h
            .take()
            .into_iter()
            .filter(|n| matches!(n, NotificationSummary::PairingFailed { .. }))
            .count();
        assert_eq!(failures, 1);
    }

    #[tokio::test]
    async fn test_unpair_forgets_preferences() {
        let a = addr("AA:BB:CC:DD:EE:FF");
        let service = Arc::new(MockProfileService::new(ProfileId::A2dp));
        let h = Harness::new(vec![service.clone()]);
        h.dispatcher
            .handle_event(InboundEvent::ServiceConnected {
                profile: ProfileId::A2dp,
            })
            .await;
        h.dispatcher
            .handle_event(InboundEvent::bond(a.clone(), BondState::Bonded))
            .await;

        let profile = h.dispatcher.profiles().profile(ProfileId::A2dp).unwrap();
        profile.set_preferred(&a, false).await.unwrap();
        assert!(!h.settings.is_empty());

        h.dispatcher
            .handle_event(InboundEvent::BondStateChanged {
                address: Some(a.clone()),
                state: BondState::None,
                reason: Some(9),
            })
            .await;
        assert!(h.settings.is_empty());
        assert_eq!(service.priority(&a).await, Priority::Undefined);
        // Removal is not a failure.
        assert!(
            !h.take()
                .iter()
                .any(|n| matches!(n, NotificationSummary::PairingFailed { .. }))
        );
    }

    #[tokio::test]
    async fn test_adapter_off_hides_without_removing() {
        let h = Harness::new(vec![]);
        h.dispatcher
            .handle_event(InboundEvent::AdapterStateChanged {
                state: AdapterState::On,
            })
            .await;
        h.dispatcher
            .handle_event(InboundEvent::found(addr("00:00:00:00:00:01")))
            .await;
        h.dispatcher
            .handle_event(InboundEvent::bond(addr("00:00:00:00:00:02"), BondState::Bonded))
            .await;
        h.take();

        let off = InboundEvent::AdapterStateChanged {
            state: AdapterState::TurningOff,
        };
        h.dispatcher.handle_event(off.clone()).await;
        h.dispatcher.handle_event(off).await;

        assert_eq!(
            h.take(),
            vec![NotificationSummary::AdapterStateChanged {
                state: AdapterState::TurningOff
            }]
        );
        let devices = h.dispatcher.registry().devices().await;
        assert_eq!(devices.len(), 2);
        assert!(devices.iter().all(|d| !d.is_visible()));

        let unbonded = h
            .dispatcher
            .registry()
            .find_device(&addr("00:00:00:00:00:01"))
            .await;
        assert!(unbonded.is_some());
    }

    #[tokio::test]
    async fn test_scanning_records_timestamp() {
        let h = Harness::new(vec![]);
        h.dispatcher
            .handle_event(InboundEvent::ScanningStateChanged { discovering: true })
            .await;
        h.dispatcher
            .handle_event(InboundEvent::ScanningStateChanged { discovering: true })
            .await;

        assert_eq!(h.take().len(), 1);
        let status = h.dispatcher.adapter_status();
        assert!(status.discovering);
        assert!(status.last_discovery.is_some());
        assert_eq!(
            settings::last_discovery_timestamp(h.settings.as_ref()),
            status.last_discovery
        );
    }

    #[tokio::test]
    async fn test_undock_hides_unbonded_only() {
        let h = Harness::new(vec![]);
        let loose = addr("00:00:00:00:00:01");
        let paired = addr("00:00:00:00:00:02");
        h.dispatcher.handle_event(InboundEvent::found(loose.clone())).await;
        h.dispatcher.handle_event(InboundEvent::found(paired.clone())).await;
        h.dispatcher
            .handle_event(InboundEvent::bond(paired.clone(), BondState::Bonded))
            .await;

        for address in [&loose, &paired] {
            h.dispatcher
                .handle_event(InboundEvent::DockUndocked {
                    address: Some(address.clone()),
                })
                .await;
        }

        let registry = h.dispatcher.registry();
        assert!(!registry.find_device(&loose).await.unwrap().is_visible());
        assert!(registry.find_device(&paired).await.unwrap().is_visible());
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_run_drains_queue_on_cancel() {
        let h = Harness::new(vec![]);
        let dispatcher = Arc::new(h.dispatcher);
        let handle = dispatcher.handle();
        handle
            .send(InboundEvent::found(addr("AA:BB:CC:DD:EE:FF")))
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        Arc::clone(&dispatcher).spawn(cancel).await.unwrap().unwrap();

        assert_eq!(dispatcher.registry().len().await, 1);
        assert!(handle.is_closed());
        assert!(matches!(
            handle.send(InboundEvent::found(addr("AA:BB:CC:DD:EE:FE"))).await,
            Err(Error::DispatcherClosed)
        ));
        // The receiver is gone; a second run is refused.
        assert!(matches!(
            dispatcher.run(CancellationToken::new()).await,
            Err(Error::DispatcherClosed)
        ));
    }

    #[tokio::test]
    async fn test_flush_waits_for_queued_events() {
        let h = Harness::new(vec![]);
        let dispatcher = Arc::new(h.dispatcher);
        let handle = dispatcher.handle();
        let cancel = CancellationToken::new();
        let task = Arc::clone(&dispatcher).spawn(cancel.clone());

        for i in 0..10u8 {
            let address = addr(&format!("AA:BB:CC:DD:EE:{:02X}", i));
            handle.send(InboundEvent::found(address)).await.unwrap();
        }
        handle.flush().await.unwrap();
        assert_eq!(dispatcher.registry().len().await, 10);

        cancel.cancel();
        task.await.unwrap().unwrap();
        assert!(matches!(handle.flush().await, Err(Error::DispatcherClosed)));
    }
}
