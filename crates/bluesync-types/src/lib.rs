//! Platform-agnostic types for the bluesync Bluetooth synchronization core.
//!
//! This crate provides the value types shared by the core runtime
//! (bluesync-core) and any front end that renders device state.
//!
//! # Features
//!
//! - Case-insensitive hardware [`Address`]
//! - Bond, connection, and adapter state enums with their raw encodings
//! - Class of device decoding
//! - Profile identifiers, capability flags, and service UUIDs
//! - Reason codes for failed pairing
//!
//! # Example
//!
//! ```
//! use bluesync_types::{Address, BondState, ProfileId};
//!
//! let address: Address = "aa:bb:cc:dd:ee:ff".parse().unwrap();
//! assert_eq!(address.as_str(), "AA:BB:CC:DD:EE:FF");
//! assert!(BondState::Bonded.is_bonded());
//! assert!(ProfileId::A2dp.is_auto_connectable());
//! ```

pub mod address;
pub mod error;
pub mod types;
pub mod uuid;

pub use address::Address;
pub use error::{ParseError, ParseResult};
pub use types::{
    AdapterState, BondFailureReason, BondState, ConnectionState, DeviceClass, MajorClass,
    ProfileId,
};
pub use crate::uuid as uuids;

#[cfg(test)]
mod tests {
    use super::*;

    // --- BondState tests ---

    #[test]
    fn test_bond_state_from_raw() {
        assert_eq!(BondState::try_from(10), Ok(BondState::None));
        assert_eq!(BondState::try_from(11), Ok(BondState::Bonding));
        assert_eq!(BondState::try_from(12), Ok(BondState::Bonded));
        assert_eq!(BondState::try_from(13), Err(ParseError::UnknownBondState(13)));
    }

    #[test]
    fn test_bond_state_default_is_none() {
        assert_eq!(BondState::default(), BondState::None);
        assert!(!BondState::Bonding.is_bonded());
    }

    // --- ConnectionState tests ---

    #[test]
    fn test_connection_state_rank_order() {
        assert!(ConnectionState::Connected.rank() > ConnectionState::Connecting.rank());
        assert!(ConnectionState::Connecting.rank() > ConnectionState::Disconnecting.rank());
        assert!(ConnectionState::Disconnecting.rank() > ConnectionState::Disconnected.rank());
    }

    #[test]
    fn test_connection_state_from_raw() {
        assert_eq!(ConnectionState::try_from(2), Ok(ConnectionState::Connected));
        assert!(ConnectionState::try_from(-1).is_err());
        assert!(ConnectionState::Connecting.is_transitional());
        assert!(!ConnectionState::Connected.is_transitional());
    }

    // --- AdapterState tests ---

    #[test]
    fn test_adapter_state() {
        assert_eq!(AdapterState::try_from(12), Ok(AdapterState::On));
        assert!(AdapterState::On.is_on());
        assert!(AdapterState::TurningOff.is_going_off());
        assert!(!AdapterState::TurningOn.is_going_off());
        assert!(AdapterState::try_from(99).is_err());
    }

    // --- DeviceClass tests ---

    #[test]
    fn test_device_class_major() {
        assert_eq!(DeviceClass::new(0x5A020C).major(), MajorClass::Phone);
        assert_eq!(DeviceClass::new(0x000104).major(), MajorClass::Computer);
        assert_eq!(DeviceClass::new(0x002540).major(), MajorClass::Peripheral);
        assert_eq!(DeviceClass::new(0x001F00).major(), MajorClass::Uncategorized);
    }

    #[test]
    fn test_device_class_services() {
        let class = DeviceClass::new(0x5A020C);
        assert!(class.has_service(DeviceClass::SERVICE_TELEPHONY));
        assert!(class.has_service(DeviceClass::SERVICE_NETWORKING));
        assert!(!DeviceClass::default().has_service(DeviceClass::SERVICE_AUDIO));
    }

    // --- ProfileId tests ---

    #[test]
    fn test_profile_ordinals_are_unique() {
        let mut ordinals: Vec<u8> = ProfileId::ALL.iter().map(|p| p.ordinal()).collect();
        ordinals.sort_unstable();
        ordinals.dedup();
        assert_eq!(ordinals.len(), ProfileId::ALL.len());
        assert_eq!(ProfileId::Headset.ordinal(), 0);
    }

    #[test]
    fn test_profile_capabilities() {
        assert!(ProfileId::A2dp.is_connectable());
        assert!(ProfileId::A2dp.is_auto_connectable());
        assert!(ProfileId::Hid.is_connectable());
        assert!(!ProfileId::Hid.is_auto_connectable());
        assert!(!ProfileId::Map.is_connectable());
    }

    #[test]
    fn test_profile_service_uuid_roundtrip() {
        for profile in ProfileId::ALL {
            assert_eq!(
                ProfileId::from_service_uuid(&profile.service_uuid()),
                Some(profile)
            );
        }
        assert_eq!(
            ProfileId::from_service_uuid(&uuids::HEADSET),
            Some(ProfileId::Headset)
        );
        assert_eq!(ProfileId::from_service_uuid(&::uuid::Uuid::nil()), None);
    }

    #[test]
    fn test_profile_from_str() {
        assert_eq!("hearing_aid".parse::<ProfileId>(), Ok(ProfileId::HearingAid));
        assert_eq!(" Map ".parse::<ProfileId>(), Ok(ProfileId::Map));
        assert!(matches!(
            "fax".parse::<ProfileId>(),
            Err(ParseError::UnknownProfile(_))
        ));
    }

    // --- BondFailureReason tests ---

    #[test]
    fn test_bond_failure_reason_codes() {
        for code in 1..=9 {
            assert_eq!(BondFailureReason::from_code(code).code(), code);
        }
        assert_eq!(BondFailureReason::from_code(0), BondFailureReason::Unknown(0));
        assert!(!BondFailureReason::Removed.is_user_visible());
        assert!(BondFailureReason::AuthTimeout.is_user_visible());
    }

    #[test]
    fn test_bond_failure_reason_display() {
        assert_eq!(
            BondFailureReason::AuthFailed.to_string(),
            "incorrect PIN or passkey"
        );
        assert!(BondFailureReason::Unknown(77).to_string().contains("77"));
    }

    // --- Serialization tests ---

    #[test]
    fn test_state_serialization() {
        assert_eq!(
            serde_json::to_string(&BondState::Bonding).unwrap(),
            "\"bonding\""
        );
        assert_eq!(
            serde_json::to_string(&ConnectionState::Disconnecting).unwrap(),
            "\"disconnecting\""
        );
        assert_eq!(
            serde_json::to_string(&ProfileId::HearingAid).unwrap(),
            "\"hearing_aid\""
        );
        assert_eq!(serde_json::to_string(&DeviceClass::new(0x200)).unwrap(), "512");
    }

    #[test]
    fn test_profile_deserialization() {
        let profile: ProfileId = serde_json::from_str("\"le_audio\"").unwrap();
        assert_eq!(profile, ProfileId::LeAudio);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Parsing arbitrary strings as an address never panics.
        #[test]
        fn address_parse_never_panics(raw in ".*") {
            let _ = Address::new(&raw);
        }

        /// Addresses that differ only in case compare equal.
        #[test]
        fn address_equality_ignores_case(raw in "[0-9a-fA-F]{2}(:[0-9a-fA-F]{2}){5}") {
            let lower = Address::new(raw.to_ascii_lowercase()).unwrap();
            let upper = Address::new(raw.to_ascii_uppercase()).unwrap();
            prop_assert_eq!(lower, upper);
        }

        /// Unknown reason codes survive a decode/encode cycle.
        #[test]
        fn bond_failure_code_is_preserved(code in any::<i32>()) {
            prop_assert_eq!(BondFailureReason::from_code(code).code(), code);
        }
    }
}
