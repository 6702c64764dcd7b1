//! Profile state tracking.
//!
//! Every Bluetooth profile (media audio, phone audio, input, message
//! access, ...) is exposed through the same [`LocalProfile`] capability
//! trait so the dispatcher and front ends can treat them uniformly.
//!
//! A profile talks to the platform through a [`ProfileService`] proxy. The
//! proxy binds asynchronously and may come and go over the process lifetime:
//! "not ready" is an ordinary, queryable state. While unbound, queries
//! report [`ConnectionState::Disconnected`] and operations fail fast with
//! [`Error::ServiceUnavailable`] instead of blocking.
//!
//! Bind and unbind are not applied on the service's own thread. The service
//! reports them as [`crate::InboundEvent::ServiceConnected`] and
//! [`crate::InboundEvent::ServiceDisconnected`], and the dispatcher calls
//! [`ProfileTracker::bind`] / [`ProfileTracker::unbind`] from its single
//! delivery task.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use bluesync_types::{Address, ConnectionState, ProfileId};

use crate::dispatcher::DispatcherHandle;
use crate::error::{Error, Result};
use crate::settings::{SettingsStore, keys};

/// Connection priority stored by a profile service for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Never configured.
    #[default]
    Undefined,
    /// Connections refused.
    Off,
    /// Connections allowed when initiated.
    On,
    /// Connect automatically whenever the device is in range.
    AutoConnect,
}

/// Proxy to a platform profile service.
///
/// Implementations wrap whatever IPC the platform offers. They must be
/// cheap to call from the dispatcher task and must not block.
#[async_trait]
pub trait ProfileService: Send + Sync {
    /// Profile this service implements.
    fn profile(&self) -> ProfileId;

    /// Ask the service to connect the device.
    async fn connect(&self, device: &Address) -> Result<()>;

    /// Ask the service to disconnect the device.
    async fn disconnect(&self, device: &Address) -> Result<()>;

    /// The service's view of the device's connection state.
    async fn connection_state(&self, device: &Address) -> ConnectionState;

    /// Devices the service currently reports as connected.
    async fn connected_devices(&self) -> Vec<Address>;

    /// Store the device's connection priority.
    async fn set_priority(&self, device: &Address, priority: Priority) -> Result<()>;

    /// Read the device's connection priority.
    async fn priority(&self, device: &Address) -> Priority;

    /// Hand the service a way to report state changes back into the
    /// dispatcher. Called once during manager start-up.
    fn attach(&self, _events: DispatcherHandle) {}

    /// Release the platform binding.
    async fn close(&self) {}
}

/// Static description of a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDescriptor {
    pub id: ProfileId,
    pub name: String,
    pub ordinal: u8,
    pub connectable: bool,
    pub auto_connectable: bool,
}

impl ProfileDescriptor {
    /// Descriptor with the default flags for a profile.
    pub fn for_profile(id: ProfileId) -> Self {
        Self {
            id,
            name: id.display_name().to_string(),
            ordinal: id.ordinal(),
            connectable: id.is_connectable(),
            auto_connectable: id.is_auto_connectable(),
        }
    }
}

/// Uniform capability interface over every profile.
///
/// # Example
///
/// ```
/// use bluesync_core::{Address, LocalProfile};
///
/// async fn print_state(profile: &dyn LocalProfile, device: &Address) {
///     println!("{}: {}", profile.name(), profile.connection_state(device).await);
/// }
/// # fn main() {}
/// ```
#[async_trait]
pub trait LocalProfile: Send + Sync {
    fn id(&self) -> ProfileId;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Display ordinal. Lower sorts first.
    fn ordinal(&self) -> u8;

    fn is_connectable(&self) -> bool;

    fn is_auto_connectable(&self) -> bool;

    /// Whether the service proxy is bound.
    fn is_ready(&self) -> bool;

    /// Connect the device. Fails fast when the proxy is unbound.
    async fn connect(&self, device: &Address) -> Result<()>;

    /// Disconnect the device. Fails fast when the proxy is unbound.
    async fn disconnect(&self, device: &Address) -> Result<()>;

    /// Connection state, or `Disconnected` when unbound or unknown.
    async fn connection_state(&self, device: &Address) -> ConnectionState;

    /// Whether the device is preferred for this profile.
    async fn is_preferred(&self, device: &Address) -> bool;

    /// Mark the device preferred or not.
    async fn set_preferred(&self, device: &Address, preferred: bool) -> Result<()>;

    /// Devices currently connected on this profile. Empty when unbound.
    async fn connected_devices(&self) -> Vec<Address>;
}

/// A profile together with its (possibly absent) service binding.
pub struct ManagedProfile {
    descriptor: ProfileDescriptor,
    service: Arc<dyn ProfileService>,
    proxy: RwLock<Option<Arc<dyn ProfileService>>>,
    settings: Arc<dyn SettingsStore>,
    call_timeout: Duration,
}

impl std::fmt::Debug for ManagedProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedProfile")
            .field("descriptor", &self.descriptor)
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl ManagedProfile {
    /// Wrap a service. The profile starts unbound.
    pub fn new(
        service: Arc<dyn ProfileService>,
        settings: Arc<dyn SettingsStore>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            descriptor: ProfileDescriptor::for_profile(service.profile()),
            service,
            proxy: RwLock::new(None),
            settings,
            call_timeout,
        }
    }

    pub fn descriptor(&self) -> &ProfileDescriptor {
        &self.descriptor
    }

    fn proxy(&self) -> Option<Arc<dyn ProfileService>> {
        self.proxy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn ready_proxy(&self) -> Result<Arc<dyn ProfileService>> {
        self.proxy()
            .ok_or(Error::ServiceUnavailable(self.descriptor.id))
    }

    /// Bind the proxy. Returns `false` when it was already bound.
    pub(crate) fn bind(&self) -> bool {
        let mut proxy = self.proxy.write().unwrap_or_else(PoisonError::into_inner);
        if proxy.is_some() {
            return false;
        }
        *proxy = Some(Arc::clone(&self.service));
        true
    }

    /// Drop the proxy. Returns `false` when it was not bound.
    pub(crate) fn unbind(&self) -> bool {
        self.proxy
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }

    /// Priority the profile uses for a preferred device.
    fn preferred_priority(&self) -> Priority {
        if self.descriptor.auto_connectable {
            Priority::AutoConnect
        } else {
            Priority::On
        }
    }

    async fn with_timeout<T>(
        &self,
        operation: &str,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.call_timeout, fut)
            .await
            .map_err(|_| {
                Error::timeout(
                    format!("{}.{}", self.descriptor.id, operation),
                    self.call_timeout,
                )
            })?
    }

    /// Forget every stored preference for a device.
    ///
    /// Called when a bond is removed so that a re-paired device starts
    /// from the profile defaults.
    pub async fn forget_device(&self, device: &Address) {
        self.settings
            .remove(&keys::auto_connect_optout(self.descriptor.id, device));
        if let Some(proxy) = self.proxy() {
            let result = self
                .with_timeout("set_priority", proxy.set_priority(device, Priority::Undefined))
                .await;
            if let Err(e) = result {
                warn!(
                    "Failed to reset {} priority for {}: {}",
                    self.descriptor.id, device, e
                );
            }
        }
    }

    /// Release the binding and the underlying service.
    pub async fn close(&self) {
        self.unbind();
        self.service.close().await;
    }
}

#[async_trait]
impl LocalProfile for ManagedProfile {
    fn id(&self) -> ProfileId {
        self.descriptor.id
    }

    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn ordinal(&self) -> u8 {
        self.descriptor.ordinal
    }

    fn is_connectable(&self) -> bool {
        self.descriptor.connectable
    }

    fn is_auto_connectable(&self) -> bool {
        self.descriptor.auto_connectable
    }

    fn is_ready(&self) -> bool {
        self.proxy().is_some()
    }

    async fn connect(&self, device: &Address) -> Result<()> {
        let proxy = self.ready_proxy()?;
        debug!("Connecting {} on {}", device, self.descriptor.id);
        self.with_timeout("connect", proxy.connect(device)).await
    }

    async fn disconnect(&self, device: &Address) -> Result<()> {
        let proxy = self.ready_proxy()?;
        debug!("Disconnecting {} on {}", device, self.descriptor.id);
        self.with_timeout("disconnect", proxy.disconnect(device)).await
    }

    async fn connection_state(&self, device: &Address) -> ConnectionState {
        match self.proxy() {
            Some(proxy) => self
                .with_timeout("connection_state", async {
                    Ok(proxy.connection_state(device).await)
                })
                .await
                .unwrap_or_default(),
            None => ConnectionState::Disconnected,
        }
    }

    async fn is_preferred(&self, device: &Address) -> bool {
        let Some(proxy) = self.proxy() else {
            return false;
        };
        let priority = self
            .with_timeout("priority", async { Ok(proxy.priority(device).await) })
            .await
            .unwrap_or_default();
        matches!(priority, Priority::On | Priority::AutoConnect)
    }

    async fn set_preferred(&self, device: &Address, preferred: bool) -> Result<()> {
        let proxy = self.ready_proxy()?;
        let priority = if preferred {
            self.preferred_priority()
        } else {
            Priority::Off
        };
        self.with_timeout("set_priority", proxy.set_priority(device, priority))
            .await?;

        let key = keys::auto_connect_optout(self.descriptor.id, device);
        if preferred {
            self.settings.remove(&key);
        } else if self.descriptor.auto_connectable {
            self.settings.put(&key, "1");
        }
        Ok(())
    }

    async fn connected_devices(&self) -> Vec<Address> {
        match self.proxy() {
            Some(proxy) => self
                .with_timeout("connected_devices", async {
                    Ok(proxy.connected_devices().await)
                })
                .await
                .unwrap_or_default(),
            None => Vec::new(),
        }
    }
}

/// Result of [`ProfileTracker::bind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    /// The proxy was newly bound; carries the devices it reports connected.
    Bound(Vec<Address>),
    /// The proxy was already bound; nothing changed.
    AlreadyBound,
}

/// Owns one [`ManagedProfile`] per registered service.
#[derive(Debug)]
pub struct ProfileTracker {
    profiles: Vec<Arc<ManagedProfile>>,
}

impl ProfileTracker {
    /// Build the tracker. Later services for an already registered
    /// profile are ignored.
    pub fn new(
        services: Vec<Arc<dyn ProfileService>>,
        settings: Arc<dyn SettingsStore>,
        call_timeout: Duration,
    ) -> Self {
        let mut profiles: Vec<Arc<ManagedProfile>> = Vec::with_capacity(services.len());
        for service in services {
            let id = service.profile();
            if profiles.iter().any(|p| p.id() == id) {
                warn!("Duplicate service for profile {} ignored", id);
                continue;
            }
            profiles.push(Arc::new(ManagedProfile::new(
                service,
                Arc::clone(&settings),
                call_timeout,
            )));
        }
        profiles.sort_by_key(|p| p.ordinal());
        Self { profiles }
    }

    /// Give every service a handle back into the dispatcher.
    pub fn attach(&self, events: &DispatcherHandle) {
        for profile in &self.profiles {
            profile.service.attach(events.clone());
        }
    }

    /// Look up a profile.
    pub fn profile(&self, id: ProfileId) -> Option<Arc<ManagedProfile>> {
        self.profiles.iter().find(|p| p.id() == id).cloned()
    }

    /// Every registered profile, in display order.
    pub fn profiles(&self) -> &[Arc<ManagedProfile>] {
        &self.profiles
    }

    /// Profiles whose proxy is currently bound.
    pub fn ready_profiles(&self) -> Vec<Arc<ManagedProfile>> {
        self.profiles
            .iter()
            .filter(|p| p.is_ready())
            .cloned()
            .collect()
    }

    /// Bind a profile's proxy and report the devices it has connected.
    pub async fn bind(&self, id: ProfileId) -> Result<BindOutcome> {
        let profile = self.profile(id).ok_or(Error::ProfileNotFound(id))?;
        if !profile.bind() {
            debug!("Profile {} already bound", id);
            return Ok(BindOutcome::AlreadyBound);
        }
        info!("Profile service bound: {}", id);
        Ok(BindOutcome::Bound(profile.connected_devices().await))
    }

    /// Unbind a profile's proxy. Returns whether it was bound.
    pub fn unbind(&self, id: ProfileId) -> Result<bool> {
        let profile = self.profile(id).ok_or(Error::ProfileNotFound(id))?;
        let was_bound = profile.unbind();
        if was_bound {
            info!("Profile service unbound: {}", id);
        } else {
            debug!("Profile {} already unbound", id);
        }
        Ok(was_bound)
    }

    /// Forget stored preferences for a device on every profile.
    pub async fn forget_device(&self, device: &Address) {
        join_all(self.profiles.iter().map(|p| p.forget_device(device))).await;
    }

    /// Release every binding. Safe to call more than once.
    pub async fn close(&self) {
        join_all(self.profiles.iter().map(|p| p.close())).await;
    }
}
