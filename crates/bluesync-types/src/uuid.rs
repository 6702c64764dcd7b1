//! Service class UUIDs for the profiles tracked by bluesync.
//!
//! All of these are 16-bit assigned numbers expanded onto the Bluetooth
//! base UUID `0000xxxx-0000-1000-8000-00805f9b34fb`.

use uuid::{Uuid, uuid};

// --- Audio ---

/// A2DP audio sink.
pub const AUDIO_SINK: Uuid = uuid!("0000110b-0000-1000-8000-00805f9b34fb");

/// Advanced audio distribution (generic).
pub const ADVANCED_AUDIO: Uuid = uuid!("0000110d-0000-1000-8000-00805f9b34fb");

/// Headset profile.
pub const HEADSET: Uuid = uuid!("00001108-0000-1000-8000-00805f9b34fb");

/// Hands-free profile.
pub const HANDSFREE: Uuid = uuid!("0000111e-0000-1000-8000-00805f9b34fb");

/// ASHA hearing aid service.
pub const HEARING_AID: Uuid = uuid!("0000fdf0-0000-1000-8000-00805f9b34fb");

/// LE audio stream control service.
pub const LE_AUDIO: Uuid = uuid!("0000184e-0000-1000-8000-00805f9b34fb");

// --- Input ---

/// Classic HID.
pub const HID: Uuid = uuid!("00001124-0000-1000-8000-00805f9b34fb");

/// HID over GATT.
pub const HOGP: Uuid = uuid!("00001812-0000-1000-8000-00805f9b34fb");

// --- Networking ---

/// PAN network access point.
pub const NAP: Uuid = uuid!("00001116-0000-1000-8000-00805f9b34fb");

/// PAN user.
pub const PANU: Uuid = uuid!("00001115-0000-1000-8000-00805f9b34fb");

// --- Object exchange ---

/// Message access server.
pub const MAS: Uuid = uuid!("00001132-0000-1000-8000-00805f9b34fb");

/// Phone book access server.
pub const PBAP_PSE: Uuid = uuid!("0000112f-0000-1000-8000-00805f9b34fb");
