//! Core value types for Bluetooth device and profile state.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Pairing relationship between the local adapter and a remote device.
///
/// Raw values match the platform broadcast encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[repr(i32)]
pub enum BondState {
    /// Not paired.
    #[default]
    None = 10,
    /// Pairing in progress.
    Bonding = 11,
    /// Paired.
    Bonded = 12,
}

impl BondState {
    /// Whether the device is paired.
    #[must_use]
    pub fn is_bonded(self) -> bool {
        self == BondState::Bonded
    }
}

impl TryFrom<i32> for BondState {
    type Error = ParseError;

    /// Convert a raw broadcast value to a `BondState`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bluesync_types::BondState;
    ///
    /// assert_eq!(BondState::try_from(12), Ok(BondState::Bonded));
    /// assert!(BondState::try_from(0).is_err());
    /// ```
    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            10 => Ok(BondState::None),
            11 => Ok(BondState::Bonding),
            12 => Ok(BondState::Bonded),
            _ => Err(ParseError::UnknownBondState(value)),
        }
    }
}

impl fmt::Display for BondState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BondState::None => write!(f, "none"),
            BondState::Bonding => write!(f, "bonding"),
            BondState::Bonded => write!(f, "bonded"),
        }
    }
}

/// Per-profile connection state of a remote device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[repr(i32)]
pub enum ConnectionState {
    #[default]
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Disconnecting = 3,
}

impl ConnectionState {
    /// Precedence used when summarizing a device over all of its profiles.
    ///
    /// `Connected` outranks `Connecting`, which outranks `Disconnecting`,
    /// which outranks `Disconnected`.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Disconnecting => 1,
            ConnectionState::Connecting => 2,
            ConnectionState::Connected => 3,
        }
    }

    /// Whether the state is `Connected`.
    #[must_use]
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }

    /// Whether a connection is being set up or torn down.
    #[must_use]
    pub fn is_transitional(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Disconnecting
        )
    }
}

impl TryFrom<i32> for ConnectionState {
    type Error = ParseError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ConnectionState::Disconnected),
            1 => Ok(ConnectionState::Connecting),
            2 => Ok(ConnectionState::Connected),
            3 => Ok(ConnectionState::Disconnecting),
            _ => Err(ParseError::UnknownConnectionState(value)),
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnecting => write!(f, "disconnecting"),
        }
    }
}

/// Power state of the local adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[repr(i32)]
pub enum AdapterState {
    #[default]
    Off = 10,
    TurningOn = 11,
    On = 12,
    TurningOff = 13,
}

impl AdapterState {
    /// Whether the adapter is powered on and usable.
    #[must_use]
    pub fn is_on(self) -> bool {
        self == AdapterState::On
    }

    /// Whether the adapter is off or shutting down.
    #[must_use]
    pub fn is_going_off(self) -> bool {
        matches!(self, AdapterState::Off | AdapterState::TurningOff)
    }
}

impl TryFrom<i32> for AdapterState {
    type Error = ParseError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            10 => Ok(AdapterState::Off),
            11 => Ok(AdapterState::TurningOn),
            12 => Ok(AdapterState::On),
            13 => Ok(AdapterState::TurningOff),
            _ => Err(ParseError::UnknownAdapterState(value)),
        }
    }
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterState::Off => write!(f, "off"),
            AdapterState::TurningOn => write!(f, "turning on"),
            AdapterState::On => write!(f, "on"),
            AdapterState::TurningOff => write!(f, "turning off"),
        }
    }
}

/// Major device categories encoded in bits 8..=12 of the class of device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[non_exhaustive]
pub enum MajorClass {
    Miscellaneous,
    Computer,
    Phone,
    Networking,
    AudioVideo,
    Peripheral,
    Imaging,
    Wearable,
    Toy,
    Health,
    Uncategorized,
}

/// Class of device bitmask.
///
/// # Examples
///
/// ```
/// use bluesync_types::{DeviceClass, MajorClass};
///
/// // Wearable headset: major class audio/video (0x04).
/// let class = DeviceClass::new(0x240404);
/// assert_eq!(class.major(), MajorClass::AudioVideo);
/// assert!(class.has_service(DeviceClass::SERVICE_AUDIO));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct DeviceClass(u32);

impl DeviceClass {
    /// Audio service bit.
    pub const SERVICE_AUDIO: u32 = 1 << 21;
    /// Object transfer service bit.
    pub const SERVICE_OBJECT_TRANSFER: u32 = 1 << 20;
    /// Telephony service bit.
    pub const SERVICE_TELEPHONY: u32 = 1 << 22;
    /// Networking service bit.
    pub const SERVICE_NETWORKING: u32 = 1 << 17;

    /// Wrap a raw class of device value.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw bitmask.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Whether a service bit is set.
    #[must_use]
    pub const fn has_service(self, service: u32) -> bool {
        self.0 & service != 0
    }

    /// Decode the major device class.
    #[must_use]
    pub fn major(self) -> MajorClass {
        match (self.0 >> 8) & 0x1F {
            0x00 => MajorClass::Miscellaneous,
            0x01 => MajorClass::Computer,
            0x02 => MajorClass::Phone,
            0x03 => MajorClass::Networking,
            0x04 => MajorClass::AudioVideo,
            0x05 => MajorClass::Peripheral,
            0x06 => MajorClass::Imaging,
            0x07 => MajorClass::Wearable,
            0x08 => MajorClass::Toy,
            0x09 => MajorClass::Health,
            _ => MajorClass::Uncategorized,
        }
    }
}

/// Bluetooth profiles tracked by the synchronization core.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new profiles
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[non_exhaustive]
pub enum ProfileId {
    /// Advanced audio distribution (media audio).
    A2dp,
    /// Headset / hands-free (phone audio).
    Headset,
    /// ASHA hearing aids.
    HearingAid,
    /// LE audio.
    LeAudio,
    /// Human interface devices.
    Hid,
    /// Personal area networking.
    Pan,
    /// Message access.
    Map,
    /// Phone book access.
    Pbap,
}

impl ProfileId {
    /// Every known profile, in display order.
    pub const ALL: [ProfileId; 8] = [
        ProfileId::Headset,
        ProfileId::A2dp,
        ProfileId::LeAudio,
        ProfileId::HearingAid,
        ProfileId::Hid,
        ProfileId::Pan,
        ProfileId::Pbap,
        ProfileId::Map,
    ];

    /// Human-readable profile name.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            ProfileId::A2dp => "Media audio",
            ProfileId::Headset => "Phone audio",
            ProfileId::HearingAid => "Hearing aids",
            ProfileId::LeAudio => "LE audio",
            ProfileId::Hid => "Input device",
            ProfileId::Pan => "Internet access",
            ProfileId::Map => "Message access",
            ProfileId::Pbap => "Contact sharing",
        }
    }

    /// Short stable key, used for settings keys and config files.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            ProfileId::A2dp => "a2dp",
            ProfileId::Headset => "headset",
            ProfileId::HearingAid => "hearing_aid",
            ProfileId::LeAudio => "le_audio",
            ProfileId::Hid => "hid",
            ProfileId::Pan => "pan",
            ProfileId::Map => "map",
            ProfileId::Pbap => "pbap",
        }
    }

    /// Display ordinal. Lower sorts first.
    #[must_use]
    pub fn ordinal(self) -> u8 {
        Self::ALL
            .iter()
            .position(|p| *p == self)
            .map(|i| i as u8)
            .unwrap_or(u8::MAX)
    }

    /// Whether the user may initiate a connection on this profile.
    #[must_use]
    pub fn is_connectable(self) -> bool {
        !matches!(self, ProfileId::Map | ProfileId::Pbap)
    }

    /// Whether the profile takes part in automatic reconnection.
    #[must_use]
    pub fn is_auto_connectable(self) -> bool {
        matches!(
            self,
            ProfileId::A2dp | ProfileId::Headset | ProfileId::HearingAid | ProfileId::LeAudio
        )
    }

    /// Whether the profile carries audio.
    #[must_use]
    pub fn is_audio(self) -> bool {
        self.is_auto_connectable()
    }

    /// The service class UUID that advertises support for this profile.
    #[must_use]
    pub fn service_uuid(self) -> uuid::Uuid {
        match self {
            ProfileId::A2dp => crate::uuid::AUDIO_SINK,
            ProfileId::Headset => crate::uuid::HANDSFREE,
            ProfileId::HearingAid => crate::uuid::HEARING_AID,
            ProfileId::LeAudio => crate::uuid::LE_AUDIO,
            ProfileId::Hid => crate::uuid::HID,
            ProfileId::Pan => crate::uuid::NAP,
            ProfileId::Map => crate::uuid::MAS,
            ProfileId::Pbap => crate::uuid::PBAP_PSE,
        }
    }

    /// Map a service UUID back to a profile, if it is one we track.
    #[must_use]
    pub fn from_service_uuid(uuid: &uuid::Uuid) -> Option<Self> {
        use crate::uuid as uuids;
        match *uuid {
            u if u == uuids::AUDIO_SINK || u == uuids::ADVANCED_AUDIO => Some(ProfileId::A2dp),
            u if u == uuids::HANDSFREE || u == uuids::HEADSET => Some(ProfileId::Headset),
            u if u == uuids::HEARING_AID => Some(ProfileId::HearingAid),
            u if u == uuids::LE_AUDIO => Some(ProfileId::LeAudio),
            u if u == uuids::HID || u == uuids::HOGP => Some(ProfileId::Hid),
            u if u == uuids::NAP || u == uuids::PANU => Some(ProfileId::Pan),
            u if u == uuids::MAS => Some(ProfileId::Map),
            u if u == uuids::PBAP_PSE => Some(ProfileId::Pbap),
            _ => None,
        }
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ProfileId {
    type Err = ParseError;

    /// Parse a profile from its [`ProfileId::key`] (case-insensitive).
    ///
    /// # Examples
    ///
    /// ```
    /// use bluesync_types::ProfileId;
    ///
    /// assert_eq!("A2DP".parse::<ProfileId>(), Ok(ProfileId::A2dp));
    /// assert!("fax".parse::<ProfileId>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        ProfileId::ALL
            .into_iter()
            .find(|p| p.key() == lower)
            .ok_or_else(|| ParseError::UnknownProfile(s.to_string()))
    }
}

/// Reason carried by a bond state change back to `None`.
///
/// Codes follow the platform's unbond reason encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[non_exhaustive]
pub enum BondFailureReason {
    AuthFailed,
    AuthRejected,
    AuthCanceled,
    RemoteDeviceDown,
    DiscoveryInProgress,
    AuthTimeout,
    RepeatedAttempts,
    RemoteAuthCanceled,
    /// The bond was removed on purpose (unpair). Not a failure.
    Removed,
    Unknown(i32),
}

impl BondFailureReason {
    /// Decode a raw reason code.
    ///
    /// # Examples
    ///
    /// ```
    /// use bluesync_types::BondFailureReason;
    ///
    /// assert_eq!(BondFailureReason::from_code(1), BondFailureReason::AuthFailed);
    /// assert_eq!(BondFailureReason::from_code(42), BondFailureReason::Unknown(42));
    /// ```
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::AuthFailed,
            2 => Self::AuthRejected,
            3 => Self::AuthCanceled,
            4 => Self::RemoteDeviceDown,
            5 => Self::DiscoveryInProgress,
            6 => Self::AuthTimeout,
            7 => Self::RepeatedAttempts,
            8 => Self::RemoteAuthCanceled,
            9 => Self::Removed,
            other => Self::Unknown(other),
        }
    }

    /// Raw reason code.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::AuthFailed => 1,
            Self::AuthRejected => 2,
            Self::AuthCanceled => 3,
            Self::RemoteDeviceDown => 4,
            Self::DiscoveryInProgress => 5,
            Self::AuthTimeout => 6,
            Self::RepeatedAttempts => 7,
            Self::RemoteAuthCanceled => 8,
            Self::Removed => 9,
            Self::Unknown(code) => code,
        }
    }

    /// Whether the reason should be shown to the user as a pairing error.
    #[must_use]
    pub fn is_user_visible(self) -> bool {
        !matches!(self, Self::Removed)
    }
}

impl fmt::Display for BondFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthFailed => write!(f, "incorrect PIN or passkey"),
            Self::AuthRejected => write!(f, "pairing rejected by device"),
            Self::AuthCanceled => write!(f, "pairing canceled"),
            Self::RemoteDeviceDown => write!(f, "device not reachable"),
            Self::DiscoveryInProgress => write!(f, "discovery in progress"),
            Self::AuthTimeout => write!(f, "pairing timed out"),
            Self::RepeatedAttempts => write!(f, "too many attempts"),
            Self::RemoteAuthCanceled => write!(f, "pairing canceled by device"),
            Self::Removed => write!(f, "bond removed"),
            Self::Unknown(code) => write!(f, "unknown reason ({})", code),
        }
    }
}
