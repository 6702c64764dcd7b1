//! Inbound events and outbound notifications.
//!
//! [`InboundEvent`] is the closed set of things the platform can tell us:
//! adapter and discovery broadcasts, per-device changes, and profile service
//! lifecycle callbacks. The [`crate::dispatcher::Dispatcher`] matches on it
//! exhaustively.
//!
//! [`Notification`] is what subscribers get back: one variant per semantic
//! change, each carrying the registry's own [`DeviceHandle`].
//!
//! Inbound events are serializable so they can be scripted, logged, and
//! replayed; notifications have a serializable [`NotificationSummary`] form.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bluesync_types::{
    AdapterState, Address, BondFailureReason, BondState, ConnectionState, DeviceClass, ProfileId,
};

use crate::registry::DeviceHandle;

/// Event delivered by the platform.
///
/// Address-scoped kinds carry an optional address: broadcasts can arrive
/// without one, and such events are dropped by the dispatcher with a
/// diagnostic rather than rejected at decode time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Discovery saw the device.
    DeviceFound {
        #[serde(default)]
        address: Option<Address>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        rssi: Option<i16>,
        #[serde(default)]
        class: Option<DeviceClass>,
    },
    /// Discovery lost the device.
    DeviceDisappeared {
        #[serde(default)]
        address: Option<Address>,
    },
    NameChanged {
        #[serde(default)]
        address: Option<Address>,
        #[serde(default)]
        name: Option<String>,
    },
    /// Bonding moved to a new state. `reason` is the platform's unbond
    /// reason code, present on failures and removals.
    BondStateChanged {
        #[serde(default)]
        address: Option<Address>,
        state: BondState,
        #[serde(default)]
        reason: Option<i32>,
    },
    ClassChanged {
        #[serde(default)]
        address: Option<Address>,
        class: DeviceClass,
    },
    UuidChanged {
        #[serde(default)]
        address: Option<Address>,
        #[serde(default)]
        uuids: Vec<Uuid>,
    },
    /// The user or the remote side aborted a pairing attempt.
    PairingCancel {
        #[serde(default)]
        address: Option<Address>,
    },
    AdapterStateChanged { state: AdapterState },
    ScanningStateChanged { discovering: bool },
    /// A docked device was removed from its dock.
    DockUndocked {
        #[serde(default)]
        address: Option<Address>,
    },
    ProfileConnectionStateChanged {
        #[serde(default)]
        address: Option<Address>,
        profile: ProfileId,
        state: ConnectionState,
    },
    /// The profile's service proxy became available.
    ServiceConnected { profile: ProfileId },
    /// The profile's service proxy went away.
    ServiceDisconnected { profile: ProfileId },
}

impl InboundEvent {
    /// Stable name of the event kind, for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DeviceFound { .. } => "device_found",
            Self::DeviceDisappeared { .. } => "device_disappeared",
            Self::NameChanged { .. } => "name_changed",
            Self::BondStateChanged { .. } => "bond_state_changed",
            Self::ClassChanged { .. } => "class_changed",
            Self::UuidChanged { .. } => "uuid_changed",
            Self::PairingCancel { .. } => "pairing_cancel",
            Self::AdapterStateChanged { .. } => "adapter_state_changed",
            Self::ScanningStateChanged { .. } => "scanning_state_changed",
            Self::DockUndocked { .. } => "dock_undocked",
            Self::ProfileConnectionStateChanged { .. } => "profile_connection_state_changed",
            Self::ServiceConnected { .. } => "service_connected",
            Self::ServiceDisconnected { .. } => "service_disconnected",
        }
    }

    /// Target address, for address-scoped kinds that carry one.
    pub fn address(&self) -> Option<&Address> {
        match self {
            Self::DeviceFound { address, .. }
            | Self::DeviceDisappeared { address }
            | Self::NameChanged { address, .. }
            | Self::BondStateChanged { address, .. }
            | Self::ClassChanged { address, .. }
            | Self::UuidChanged { address, .. }
            | Self::PairingCancel { address }
            | Self::DockUndocked { address }
            | Self::ProfileConnectionStateChanged { address, .. } => address.as_ref(),
            Self::AdapterStateChanged { .. }
            | Self::ScanningStateChanged { .. }
            | Self::ServiceConnected { .. }
            | Self::ServiceDisconnected { .. } => None,
        }
    }

    /// Whether the kind targets a single device.
    pub fn is_device_scoped(&self) -> bool {
        !matches!(
            self,
            Self::AdapterStateChanged { .. }
                | Self::ScanningStateChanged { .. }
                | Self::ServiceConnected { .. }
                | Self::ServiceDisconnected { .. }
        )
    }

    /// Shorthand for a discovery sighting.
    pub fn found(address: Address) -> Self {
        Self::DeviceFound {
            address: Some(address),
            name: None,
            rssi: None,
            class: None,
        }
    }

    /// Shorthand for a bond state change without a reason code.
    pub fn bond(address: Address, state: BondState) -> Self {
        Self::BondStateChanged {
            address: Some(address),
            state,
            reason: None,
        }
    }

    /// Shorthand for a profile connection state change.
    pub fn profile_state(address: Address, profile: ProfileId, state: ConnectionState) -> Self {
        Self::ProfileConnectionStateChanged {
            address: Some(address),
            profile,
            state,
        }
    }
}

/// Change published to subscribers.
#[derive(Debug, Clone)]
pub enum Notification {
    AdapterStateChanged(AdapterState),
    /// `true` when discovery started.
    ScanningStateChanged(bool),
    DeviceAdded(DeviceHandle),
    DeviceDeleted(DeviceHandle),
    DeviceBondStateChanged(DeviceHandle, BondState),
    /// Name, class, UUIDs, or visibility changed.
    DeviceAttributesChanged(DeviceHandle),
    ProfileConnectionStateChanged {
        device: DeviceHandle,
        profile: ProfileId,
        state: ConnectionState,
    },
    ServiceConnected(ProfileId),
    ServiceDisconnected(ProfileId),
    /// Pairing failed or was canceled; a collaborator turns the reason into
    /// a user-facing message.
    PairingFailed {
        device: DeviceHandle,
        reason: BondFailureReason,
    },
}

impl Notification {
    /// The device the notification is about, if any.
    pub fn device(&self) -> Option<&DeviceHandle> {
        match self {
            Self::DeviceAdded(d)
            | Self::DeviceDeleted(d)
            | Self::DeviceBondStateChanged(d, _)
            | Self::DeviceAttributesChanged(d) => Some(d),
            Self::ProfileConnectionStateChanged { device, .. } | Self::PairingFailed { device, .. } => {
                Some(device)
            }
            Self::AdapterStateChanged(_)
            | Self::ScanningStateChanged(_)
            | Self::ServiceConnected(_)
            | Self::ServiceDisconnected(_) => None,
        }
    }

    /// Serializable form.
    pub fn summary(&self) -> NotificationSummary {
        match self {
            Self::AdapterStateChanged(state) => NotificationSummary::AdapterStateChanged { state: *state },
            Self::ScanningStateChanged(started) => {
                NotificationSummary::ScanningStateChanged { started: *started }
            }
            Self::DeviceAdded(d) => NotificationSummary::DeviceAdded {
                address: d.address().clone(),
                name: d.name(),
            },
            Self::DeviceDeleted(d) => NotificationSummary::DeviceDeleted {
                address: d.address().clone(),
            },
            Self::DeviceBondStateChanged(d, state) => NotificationSummary::DeviceBondStateChanged {
                address: d.address().clone(),
                state: *state,
            },
            Self::DeviceAttributesChanged(d) => NotificationSummary::DeviceAttributesChanged {
                address: d.address().clone(),
            },
            Self::ProfileConnectionStateChanged {
                device,
                profile,
                state,
            } => NotificationSummary::ProfileConnectionStateChanged {
                address: device.address().clone(),
                profile: *profile,
                state: *state,
            },
            Self::ServiceConnected(profile) => NotificationSummary::ServiceConnected { profile: *profile },
            Self::ServiceDisconnected(profile) => {
                NotificationSummary::ServiceDisconnected { profile: *profile }
            }
            Self::PairingFailed { device, reason } => NotificationSummary::PairingFailed {
                address: device.address().clone(),
                reason: *reason,
                message: reason.to_string(),
            },
        }
    }
}

/// Serializable view of a [`Notification`].
///
/// This is what the broadcast bridge and the CLI emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationSummary {
    AdapterStateChanged { state: AdapterState },
    ScanningStateChanged { started: bool },
    DeviceAdded { address: Address, name: Option<String> },
    DeviceDeleted { address: Address },
    DeviceBondStateChanged { address: Address, state: BondState },
    DeviceAttributesChanged { address: Address },
    ProfileConnectionStateChanged {
        address: Address,
        profile: ProfileId,
        state: ConnectionState,
    },
    ServiceConnected { profile: ProfileId },
    ServiceDisconnected { profile: ProfileId },
    PairingFailed {
        address: Address,
        reason: BondFailureReason,
        message: String,
    },
}
