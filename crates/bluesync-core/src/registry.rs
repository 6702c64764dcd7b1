//! Registry of known remote devices.
//!
//! The [`DeviceRegistry`] owns exactly one [`DeviceRecord`] per hardware
//! address. Records are created lazily on first sighting and handed out as
//! shared [`DeviceHandle`]s, so every component observes the same record
//! rather than a copy that could drift.
//!
//! Presence (membership in the registry) and display visibility
//! ([`DeviceRecord::is_visible`]) are tracked separately: a bonded device
//! that goes out of range stays in the registry but may be hidden.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock as StdRwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use bluesync_types::{Address, BondState, ConnectionState, DeviceClass, ProfileId};

/// Shared reference to a registry-owned device record.
pub type DeviceHandle = Arc<DeviceRecord>;

/// Partial update for a device record.
///
/// Absent fields leave the existing value untouched; they never reset it to
/// a default.
///
/// # Example
///
/// ```
/// use bluesync_core::DeviceUpdate;
///
/// let update = DeviceUpdate::new().name("Headset").rssi(-40).visible(true);
/// assert!(!update.is_empty());
/// assert!(DeviceUpdate::new().is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceUpdate {
    pub name: Option<String>,
    pub alias: Option<String>,
    pub class: Option<DeviceClass>,
    pub rssi: Option<i16>,
    pub bond_state: Option<BondState>,
    pub visible: Option<bool>,
    pub uuids: Option<Vec<Uuid>>,
}

impl DeviceUpdate {
    /// Create an empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    #[must_use]
    pub fn class(mut self, class: DeviceClass) -> Self {
        self.class = Some(class);
        self
    }

    #[must_use]
    pub fn rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }

    #[must_use]
    pub fn bond_state(mut self, state: BondState) -> Self {
        self.bond_state = Some(state);
        self
    }

    #[must_use]
    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = Some(visible);
        self
    }

    #[must_use]
    pub fn uuids(mut self, uuids: Vec<Uuid>) -> Self {
        self.uuids = Some(uuids);
        self
    }

    /// Whether the update carries no fields.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Default)]
struct DeviceState {
    name: Option<String>,
    alias: Option<String>,
    class: DeviceClass,
    rssi: Option<i16>,
    bond_state: BondState,
    visible: bool,
    uuids: Vec<Uuid>,
    pairing_cancel_pending: bool,
    profiles: BTreeMap<ProfileId, ConnectionState>,
    last_seen: Option<OffsetDateTime>,
}

impl DeviceState {
    fn merge(&mut self, update: &DeviceUpdate) -> bool {
        let mut changed = false;
        changed |= assign(&mut self.name, update.name.clone().map(Some));
        changed |= assign(&mut self.alias, update.alias.clone().map(Some));
        changed |= assign(&mut self.class, update.class);
        changed |= assign(&mut self.rssi, update.rssi.map(Some));
        changed |= assign(&mut self.bond_state, update.bond_state);
        changed |= assign(&mut self.visible, update.visible);
        changed |= assign(&mut self.uuids, update.uuids.clone());
        changed
    }
}

/// Store `value` into `slot` when present and different.
fn assign<T: PartialEq>(slot: &mut T, value: Option<T>) -> bool {
    match value {
        Some(v) if *slot != v => {
            *slot = v;
            true
        }
        _ => false,
    }
}

/// Point-in-time copy of a device record, for display and serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub address: Address,
    pub name: Option<String>,
    pub alias: Option<String>,
    pub class: DeviceClass,
    pub rssi: Option<i16>,
    pub bond_state: BondState,
    pub visible: bool,
    pub uuids: Vec<Uuid>,
    pub profiles: BTreeMap<ProfileId, ConnectionState>,
    pub connection: ConnectionState,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_seen: Option<OffsetDateTime>,
}

/// A remote device known to the registry.
///
/// Fields are read through accessors; mutation goes through the registry and
/// the dispatcher so that every change is paired with its notification.
#[derive(Debug)]
pub struct DeviceRecord {
    address: Address,
    state: StdRwLock<DeviceState>,
}

impl DeviceRecord {
    fn new(address: Address, initial: &DeviceUpdate) -> Self {
        let mut state = DeviceState::default();
        state.merge(initial);
        Self {
            address,
            state: StdRwLock::new(state),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, DeviceState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, DeviceState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hardware address.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Name reported by the device, if any.
    pub fn name(&self) -> Option<String> {
        self.read().name.clone()
    }

    /// User-assigned alias, if any.
    pub fn alias(&self) -> Option<String> {
        self.read().alias.clone()
    }

    /// Name to show: alias, then reported name, then the address.
    pub fn display_name(&self) -> String {
        let state = self.read();
        state
            .alias
            .clone()
            .or_else(|| state.name.clone())
            .unwrap_or_else(|| self.address.to_string())
    }

    pub fn class(&self) -> DeviceClass {
        self.read().class
    }

    /// Last known signal strength in dBm. May be stale.
    pub fn rssi(&self) -> Option<i16> {
        self.read().rssi
    }

    pub fn bond_state(&self) -> BondState {
        self.read().bond_state
    }

    pub fn is_bonded(&self) -> bool {
        self.bond_state().is_bonded()
    }

    /// Whether discovery currently sees the device.
    pub fn is_visible(&self) -> bool {
        self.read().visible
    }

    /// Service UUIDs last reported by the device.
    pub fn uuids(&self) -> Vec<Uuid> {
        self.read().uuids.clone()
    }

    /// Profiles the device advertises through its service UUIDs.
    pub fn advertised_profiles(&self) -> Vec<ProfileId> {
        let mut profiles: Vec<ProfileId> = self
            .read()
            .uuids
            .iter()
            .filter_map(ProfileId::from_service_uuid)
            .collect();
        profiles.sort_unstable();
        profiles.dedup();
        profiles
    }

    /// Whether a pairing cancel was observed since the last bond change.
    pub fn pairing_cancel_pending(&self) -> bool {
        self.read().pairing_cancel_pending
    }

    /// Connection state for one profile. Unknown profiles are disconnected.
    pub fn profile_state(&self, profile: ProfileId) -> ConnectionState {
        self.read()
            .profiles
            .get(&profile)
            .copied()
            .unwrap_or_default()
    }

    /// All recorded per-profile connection states.
    pub fn profile_states(&self) -> BTreeMap<ProfileId, ConnectionState> {
        self.read().profiles.clone()
    }

    /// Strongest connection state across every profile.
    pub fn connection_summary(&self) -> ConnectionState {
        self.read()
            .profiles
            .values()
            .copied()
            .max_by_key(|s| s.rank())
            .unwrap_or_default()
    }

    /// Whether any profile is connected.
    pub fn is_connected(&self) -> bool {
        self.connection_summary().is_connected()
    }

    /// When the device was last seen by discovery.
    pub fn last_seen(&self) -> Option<OffsetDateTime> {
        self.read().last_seen
    }

    /// Copy the current state.
    pub fn snapshot(&self) -> DeviceSnapshot {
        let connection = self.connection_summary();
        let state = self.read();
        DeviceSnapshot {
            address: self.address.clone(),
            name: state.name.clone(),
            alias: state.alias.clone(),
            class: state.class,
            rssi: state.rssi,
            bond_state: state.bond_state,
            visible: state.visible,
            uuids: state.uuids.clone(),
            profiles: state.profiles.clone(),
            connection,
            last_seen: state.last_seen,
        }
    }

    /// Display ordering: bonded, then connected, then visible, then stronger
    /// signal, then name.
    pub fn display_cmp(&self, other: &DeviceRecord) -> Ordering {
        let a = self.snapshot();
        let b = other.snapshot();
        b.bond_state
            .is_bonded()
            .cmp(&a.bond_state.is_bonded())
            .then_with(|| b.connection.is_connected().cmp(&a.connection.is_connected()))
            .then_with(|| b.visible.cmp(&a.visible))
            .then_with(|| b.rssi.unwrap_or(i16::MIN).cmp(&a.rssi.unwrap_or(i16::MIN)))
            .then_with(|| self.display_name().cmp(&other.display_name()))
    }

    pub(crate) fn apply(&self, update: &DeviceUpdate) -> bool {
        self.write().merge(update)
    }

    /// Returns the previous state when it changed.
    pub(crate) fn set_bond_state(&self, bond_state: BondState) -> Option<BondState> {
        let mut state = self.write();
        if state.bond_state == bond_state {
            return None;
        }
        let previous = state.bond_state;
        state.bond_state = bond_state;
        state.pairing_cancel_pending = false;
        Some(previous)
    }

    pub(crate) fn set_profile_state(&self, profile: ProfileId, conn: ConnectionState) -> bool {
        let mut state = self.write();
        let current = state.profiles.get(&profile).copied().unwrap_or_default();
        if current == conn && state.profiles.contains_key(&profile) {
            return false;
        }
        state.profiles.insert(profile, conn);
        current != conn
    }

    pub(crate) fn set_visible(&self, visible: bool) -> bool {
        let mut state = self.write();
        assign(&mut state.visible, Some(visible))
    }

    /// Returns whether the flag was newly raised.
    pub(crate) fn mark_pairing_canceled(&self) -> bool {
        let mut state = self.write();
        !std::mem::replace(&mut state.pairing_cancel_pending, true)
    }

    pub(crate) fn touch(&self, at: OffsetDateTime) {
        self.write().last_seen = Some(at);
    }
}

/// Result of [`DeviceRegistry::get_or_insert`].
#[derive(Debug, Clone)]
pub struct Insertion {
    pub device: DeviceHandle,
    /// Whether this call created the record.
    pub created: bool,
}

/// Authoritative set of known devices.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<Address, DeviceHandle>>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a device. Never creates a record.
    pub async fn find_device(&self, address: &Address) -> Option<DeviceHandle> {
        self.devices.read().await.get(address).cloned()
    }

    /// Create a record or return the existing one.
    ///
    /// `initial` is applied only when the record is created. Concurrent calls
    /// for the same address all receive the record created by the first.
    pub async fn add_device(&self, address: Address, initial: DeviceUpdate) -> DeviceHandle {
        self.get_or_insert(address, initial).await.device
    }

    /// Like [`add_device`](Self::add_device), but reports whether the record
    /// was created by this call.
    pub async fn get_or_insert(&self, address: Address, initial: DeviceUpdate) -> Insertion {
        if let Some(device) = self.find_device(&address).await {
            return Insertion {
                device,
                created: false,
            };
        }

        let mut devices = self.devices.write().await;
        // Another task may have inserted between the read and write locks.
        if let Some(device) = devices.get(&address) {
            return Insertion {
                device: Arc::clone(device),
                created: false,
            };
        }

        let device = Arc::new(DeviceRecord::new(address.clone(), &initial));
        devices.insert(address.clone(), Arc::clone(&device));
        info!("Added device to registry: {}", address);
        Insertion {
            device,
            created: true,
        }
    }

    /// Remove a device unless it is bonded. Returns whether it was removed.
    pub async fn remove_device(&self, address: &Address) -> bool {
        self.take_removable(address).await.is_some()
    }

    /// Remove a device unless it is bonded, returning the removed record.
    pub async fn take_removable(&self, address: &Address) -> Option<DeviceHandle> {
        let mut devices = self.devices.write().await;
        match devices.get(address) {
            Some(device) if device.is_bonded() => {
                debug!("Keeping bonded device {} in registry", address);
                None
            }
            Some(_) => {
                let removed = devices.remove(address);
                info!("Removed device from registry: {}", address);
                removed
            }
            None => None,
        }
    }

    /// Merge fields into an existing record.
    ///
    /// Unknown addresses are a no-op: an update racing ahead of the event
    /// that creates the record is expected with asynchronous delivery.
    /// Returns whether anything changed.
    pub async fn update_attributes(&self, address: &Address, update: DeviceUpdate) -> bool {
        match self.find_device(address).await {
            Some(device) => device.apply(&update),
            None => {
                warn!("Update for unknown device {} ignored", address);
                false
            }
        }
    }

    /// Set one profile's connection state on an existing record.
    pub async fn set_profile_state(
        &self,
        address: &Address,
        profile: ProfileId,
        state: ConnectionState,
    ) -> bool {
        match self.find_device(address).await {
            Some(device) => device.set_profile_state(profile, state),
            None => {
                warn!("Profile state for unknown device {} ignored", address);
                false
            }
        }
    }

    /// All devices, in display order.
    pub async fn devices(&self) -> Vec<DeviceHandle> {
        let mut devices: Vec<DeviceHandle> = self.devices.read().await.values().cloned().collect();
        devices.sort_by(|a, b| a.display_cmp(b));
        devices
    }

    /// Bonded devices, in display order.
    pub async fn bonded_devices(&self) -> Vec<DeviceHandle> {
        let mut devices = self.devices().await;
        devices.retain(|d| d.is_bonded());
        devices
    }

    /// Number of known devices.
    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }
}
