//! Error types for bluesync-core.
//!
//! The synchronization core has no fatal error path. Most of the conditions a
//! Bluetooth stack produces (an update racing ahead of the record it targets,
//! duplicate broadcasts, a bonded device "disappearing") are resolved by
//! idempotent upserts and never surface as errors at all. What remains is
//! listed here.
//!
//! # Error Classes
//!
//! | Error Type | Raised by | Caller action |
//! |------------|-----------|---------------|
//! | [`Error::ServiceUnavailable`] | profile operations while the proxy is unbound | Treat as disconnected; retry after `ServiceConnected` |
//! | [`Error::ProfileNotFound`] | lookups for a profile that was never registered | Fix configuration |
//! | [`Error::DeviceNotFound`] | operations that need an existing record | Wait for discovery |
//! | [`Error::Malformed`] | events missing their required identity | None; the event is dropped |
//! | [`Error::DispatcherClosed`] | sending after shutdown | Stop producing events |
//! | [`Error::Timeout`] | profile service calls with a deadline | Retry or give up |
//! | [`Error::Service`] | the profile service rejected a request | Report to user |
//! | [`Error::InvalidConfig`] | [`crate::ManagerConfig::validate`] | Fix configuration and restart |
//!
//! Query failures inside [`crate::query::QueryBatch`] are never returned as
//! errors: they collapse to `false` at the `get` boundary, with the cause
//! kept in [`crate::query::QueryOutcome`] for diagnostics.

use std::time::Duration;

use thiserror::Error;

use bluesync_types::{Address, ProfileId};

/// Errors that can occur in the synchronization core.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The profile's service proxy is not bound.
    #[error("Profile service unavailable: {0}")]
    ServiceUnavailable(ProfileId),

    /// The profile was never registered with the tracker.
    #[error("Profile not registered: {0}")]
    ProfileNotFound(ProfileId),

    /// No record exists for the address.
    #[error("Device not found: {0}")]
    DeviceNotFound(Address),

    /// Inbound event could not be acted on.
    #[error("Malformed event: {0}")]
    Malformed(String),

    /// The dispatcher loop has stopped and no longer accepts events.
    #[error("Event dispatcher is closed")]
    DispatcherClosed,

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// The profile service reported a failure.
    #[error("{profile} service error: {message}")]
    Service {
        /// Profile whose service failed.
        profile: ProfileId,
        /// Failure description from the service.
        message: String,
    },

    /// Raw value could not be converted.
    #[error(transparent)]
    Parse(#[from] bluesync_types::ParseError),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a service failure for a profile.
    pub fn service(profile: ProfileId, message: impl Into<String>) -> Self {
        Self::Service {
            profile,
            message: message.into(),
        }
    }

    /// Create a malformed event error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether the error means "the service is not there right now".
    ///
    /// Callers are expected to treat this like a disconnected profile.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::ServiceUnavailable(_) | Self::DispatcherClosed)
    }
}

/// Result type alias using bluesync-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
