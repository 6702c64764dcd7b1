//! Hardware address of a remote Bluetooth device.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Hardware address identifying a remote device.
///
/// The address is treated as an opaque unique key. On Linux and Windows it
/// is normally a MAC address (`AA:BB:CC:DD:EE:FF`); on macOS CoreBluetooth
/// hands out UUIDs instead. Comparison is case-insensitive: the value is
/// normalized to upper case on construction, so `aa:bb:cc:dd:ee:ff` and
/// `AA:BB:CC:DD:EE:FF` are the same key.
///
/// # Examples
///
/// ```
/// use bluesync_types::Address;
///
/// let a: Address = "aa:bb:cc:dd:ee:ff".parse().unwrap();
/// let b: Address = "AA:BB:CC:DD:EE:FF".parse().unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.as_str(), "AA:BB:CC:DD:EE:FF");
/// assert!("".parse::<Address>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct Address(String);

impl Address {
    /// Parse and normalize an address.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, ParseError> {
        let raw = raw.as_ref().trim();
        if raw.is_empty()
            || !raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '-' | '_'))
        {
            return Err(ParseError::InvalidAddress(raw.to_string()));
        }
        Ok(Self(raw.to_ascii_uppercase()))
    }

    /// The normalized (upper case) form of the address.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the address has the six-octet MAC layout.
    #[must_use]
    pub fn is_mac(&self) -> bool {
        let parts: Vec<&str> = self.0.split(':').collect();
        parts.len() == 6
            && parts
                .iter()
                .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Address {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Address {
    type Error = ParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
