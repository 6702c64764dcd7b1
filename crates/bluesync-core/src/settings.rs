//! Key-value settings store seam.
//!
//! The core persists very little: the time discovery last ran and the
//! per-device auto-connect opt-outs. Both go through [`SettingsStore`], which
//! the embedding application backs with whatever preference storage it has.
//! [`MemorySettings`] is the in-process default.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::warn;

use bluesync_types::{Address, ProfileId};

/// Well-known setting keys.
pub mod keys {
    use super::{Address, ProfileId};

    /// RFC 3339 timestamp of the last discovery start.
    pub const LAST_DISCOVERY_TIMESTAMP: &str = "last_discovery_timestamp";

    /// Prefix shared by every auto-connect opt-out key.
    pub const AUTO_CONNECT_OPTOUT_PREFIX: &str = "auto_connect_optout";

    /// Key recording that the user turned auto-connect off for a device on
    /// one profile.
    pub fn auto_connect_optout(profile: ProfileId, address: &Address) -> String {
        format!("{}.{}.{}", AUTO_CONNECT_OPTOUT_PREFIX, profile.key(), address)
    }
}

/// External key-value store for the few values the core persists.
pub trait SettingsStore: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value, replacing any previous one.
    fn put(&self, key: &str, value: &str);

    /// Delete a value. Returns whether it existed.
    fn remove(&self, key: &str) -> bool;
}

/// In-memory [`SettingsStore`].
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RwLock<HashMap<String, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.values.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn put(&self, key: &str, value: &str) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) -> bool {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }
}

/// Persist the time discovery started.
pub fn record_discovery_timestamp(store: &dyn SettingsStore, at: OffsetDateTime) {
    match at.format(&Rfc3339) {
        Ok(formatted) => store.put(keys::LAST_DISCOVERY_TIMESTAMP, &formatted),
        Err(e) => warn!("Failed to format discovery timestamp: {}", e),
    }
}

/// Read back the last discovery start, ignoring unparseable values.
pub fn last_discovery_timestamp(store: &dyn SettingsStore) -> Option<OffsetDateTime> {
    let raw = store.get(keys::LAST_DISCOVERY_TIMESTAMP)?;
    match OffsetDateTime::parse(&raw, &Rfc3339) {
        Ok(at) => Some(at),
        Err(e) => {
            warn!("Ignoring stored discovery timestamp {:?}: {}", raw, e);
            None
        }
    }
}

/// Whether the user opted a device out of auto-connect on a profile.
pub fn is_auto_connect_opted_out(
    store: &dyn SettingsStore,
    profile: ProfileId,
    address: &Address,
) -> bool {
    store
        .get(&keys::auto_connect_optout(profile, address))
        .is_some()
}
