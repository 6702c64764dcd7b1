//! Error types for value parsing in bluesync-types.

use thiserror::Error;

/// Errors that can occur when converting raw platform values into
/// bluesync types.
///
/// This error type is platform-agnostic and does not include any
/// runtime errors (those belong in bluesync-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The hardware address was empty or contained invalid characters.
    #[error("Invalid address: {0:?}")]
    InvalidAddress(String),

    /// Raw bond state value outside the known range.
    #[error("Unknown bond state: {0}")]
    UnknownBondState(i32),

    /// Raw connection state value outside the known range.
    #[error("Unknown connection state: {0}")]
    UnknownConnectionState(i32),

    /// Raw adapter state value outside the known range.
    #[error("Unknown adapter state: {0}")]
    UnknownAdapterState(i32),

    /// Profile name or identifier not recognized.
    #[error("Unknown profile: {0}")]
    UnknownProfile(String),
}

/// Result type alias using bluesync-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
