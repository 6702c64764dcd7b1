//! Mock profile service for testing.
//!
//! [`MockProfileService`] implements [`ProfileService`] entirely in memory so
//! the dispatcher, the profile tracker, and the manager can be exercised
//! without a Bluetooth stack.
//!
//! # Features
//!
//! - **Failure injection**: fail every call, or only the next few connects
//! - **Latency simulation**: delay connects to exercise timeouts
//! - **Event emission**: once attached, connects and disconnects are reported
//!   back through the dispatcher like a real service would

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use bluesync_types::{Address, ConnectionState, ProfileId};

use crate::dispatcher::DispatcherHandle;
use crate::error::{Error, Result};
use crate::events::InboundEvent;
use crate::profile::{Priority, ProfileService};

/// In-memory [`ProfileService`].
///
/// # Example
///
/// ```
/// use bluesync_core::mock::MockProfileService;
/// use bluesync_core::ProfileService;
/// use bluesync_types::{Address, ProfileId};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let device = Address::new("AA:BB:CC:DD:EE:FF").unwrap();
/// let service = MockProfileService::builder(ProfileId::A2dp)
///     .connected(device.clone())
///     .build();
/// assert_eq!(service.connected_devices().await, vec![device]);
/// # }
/// ```
pub struct MockProfileService {
    profile: ProfileId,
    connected: RwLock<BTreeSet<Address>>,
    priorities: RwLock<HashMap<Address, Priority>>,
    should_fail: AtomicBool,
    fail_message: RwLock<String>,
    /// Simulated connect latency in milliseconds (0 = no delay).
    connect_latency_ms: AtomicU64,
    remaining_failures: AtomicU32,
    connect_count: AtomicU32,
    events: Mutex<Option<DispatcherHandle>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for MockProfileService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockProfileService")
            .field("profile", &self.profile)
            .field("should_fail", &self.should_fail.load(Ordering::Relaxed))
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl MockProfileService {
    /// Create a mock with no connected devices.
    pub fn new(profile: ProfileId) -> Self {
        Self {
            profile,
            connected: RwLock::new(BTreeSet::new()),
            priorities: RwLock::new(HashMap::new()),
            should_fail: AtomicBool::new(false),
            fail_message: RwLock::new("Mock failure".to_string()),
            connect_latency_ms: AtomicU64::new(0),
            remaining_failures: AtomicU32::new(0),
            connect_count: AtomicU32::new(0),
            events: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn builder(profile: ProfileId) -> MockProfileServiceBuilder {
        MockProfileServiceBuilder::new(profile)
    }

    /// Make every call fail until cleared.
    pub async fn set_should_fail(&self, fail: bool, message: Option<&str>) {
        self.should_fail.store(fail, Ordering::Relaxed);
        if let Some(msg) = message {
            *self.fail_message.write().await = msg.to_string();
        }
    }

    /// Fail the next `count` connects, then succeed.
    pub fn set_transient_failures(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::Relaxed);
    }

    /// Delay each connect by `latency`. `Duration::ZERO` disables it.
    pub fn set_connect_latency(&self, latency: Duration) {
        self.connect_latency_ms.store(
            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
    }

    /// Change the platform-side connection state without emitting events.
    pub async fn set_connected(&self, device: Address, connected: bool) {
        let mut devices = self.connected.write().await;
        if connected {
            devices.insert(device);
        } else {
            devices.remove(&device);
        }
    }

    /// Number of connect calls received, successful or not.
    pub fn connect_count(&self) -> u32 {
        self.connect_count.load(Ordering::Relaxed)
    }

    /// Whether a dispatcher handle was attached.
    pub fn is_attached(&self) -> bool {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    async fn check_failure(&self) -> Result<()> {
        if self.should_fail.load(Ordering::Relaxed) {
            let message = self.fail_message.read().await.clone();
            return Err(Error::service(self.profile, message));
        }
        Ok(())
    }

    /// Report a state change to the attached dispatcher, if any.
    fn emit(&self, device: &Address, state: ConnectionState) {
        let handle = self
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(handle) = handle {
            let event = InboundEvent::profile_state(device.clone(), self.profile, state);
            if let Err(e) = handle.try_send(event) {
                debug!("Mock {} could not report {}: {}", self.profile, state, e);
            }
        }
    }
}

#[async_trait]
impl ProfileService for MockProfileService {
    fn profile(&self) -> ProfileId {
        self.profile
    }

    async fn connect(&self, device: &Address) -> Result<()> {
        self.connect_count.fetch_add(1, Ordering::Relaxed);

        let latency = self.connect_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        let transient = self
            .remaining_failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if transient {
            return Err(Error::service(self.profile, "transient failure"));
        }
        self.check_failure().await?;

        let newly = self.connected.write().await.insert(device.clone());
        if newly {
            self.emit(device, ConnectionState::Connecting);
            self.emit(device, ConnectionState::Connected);
        }
        Ok(())
    }

    async fn disconnect(&self, device: &Address) -> Result<()> {
        self.check_failure().await?;
        let was_connected = self.connected.write().await.remove(device);
        if was_connected {
            self.emit(device, ConnectionState::Disconnected);
        }
        Ok(())
    }

    async fn connection_state(&self, device: &Address) -> ConnectionState {
        if self.connected.read().await.contains(device) {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    async fn connected_devices(&self) -> Vec<Address> {
        self.connected.read().await.iter().cloned().collect()
    }

    async fn set_priority(&self, device: &Address, priority: Priority) -> Result<()> {
        self.check_failure().await?;
        self.priorities
            .write()
            .await
            .insert(device.clone(), priority);
        Ok(())
    }

    async fn priority(&self, device: &Address) -> Priority {
        self.priorities
            .read()
            .await
            .get(device)
            .copied()
            .unwrap_or_default()
    }

    fn attach(&self, events: DispatcherHandle) {
        *self.events.lock().unwrap_or_else(PoisonError::into_inner) = Some(events);
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Builder for [`MockProfileService`].
#[derive(Debug)]
#[must_use]
pub struct MockProfileServiceBuilder {
    profile: ProfileId,
    connected: Vec<Address>,
    priorities: Vec<(Address, Priority)>,
    connect_latency: Duration,
}

impl MockProfileServiceBuilder {
    pub fn new(profile: ProfileId) -> Self {
        Self {
            profile,
            connected: Vec::new(),
            priorities: Vec::new(),
            connect_latency: Duration::ZERO,
        }
    }

    /// Start with the device connected.
    pub fn connected(mut self, device: Address) -> Self {
        self.connected.push(device);
        self
    }

    /// Start with a stored priority for the device.
    pub fn priority(mut self, device: Address, priority: Priority) -> Self {
        self.priorities.push((device, priority));
        self
    }

    pub fn connect_latency(mut self, latency: Duration) -> Self {
        self.connect_latency = latency;
        self
    }

    pub fn build(self) -> MockProfileService {
        let mut service = MockProfileService::new(self.profile);
        service.set_connect_latency(self.connect_latency);
        *service.connected.get_mut() = self.connected.into_iter().collect();
        *service.priorities.get_mut() = self.priorities.into_iter().collect();
        service
    }
}
