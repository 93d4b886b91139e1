//! Error types for log operations.
//!
//! Storage operations run inside a guard that maps the two connection-failure
//! kinds (`ConnectionLoss`, `SessionExpired`) to the [`LogError::SubscriberClosed`]
//! sentinel. Every other coordination error propagates unchanged.

use skein_core::CoordError;
use thiserror::Error;

/// Result type alias for log operations.
pub type Result<T> = std::result::Result<T, LogError>;

/// Errors that can occur during log operations.
#[derive(Debug, Error)]
pub enum LogError {
    /// The connection to the coordination service was lost inside a guarded
    /// region. The caller is expected to recreate the component after
    /// reconnection; there is no in-core retry.
    #[error("subscriber closed: connection to the coordination service lost")]
    SubscriberClosed,

    /// A coordination error outside the two connection-failure kinds.
    #[error(transparent)]
    Coordination(CoordError),

    /// The stored log version is incompatible with this build.
    #[error("log version mismatch: ours {ours}, stored {stored}")]
    VersionMismatch {
        /// The version this build speaks.
        ours: String,
        /// The version found in the stored log parameters.
        stored: String,
    },

    /// The caller's output channel was dropped.
    #[error("output channel closed")]
    ChannelClosed,

    /// The configuration is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },
}

/// Maps a coordination result through the guarded-region policy.
pub(crate) fn guard<T>(result: skein_core::Result<T>) -> Result<T> {
    result.map_err(guard_err)
}

/// Maps one coordination error through the guarded-region policy.
pub(crate) fn guard_err(err: CoordError) -> LogError {
    if err.is_disconnect() {
        LogError::SubscriberClosed
    } else {
        LogError::Coordination(err)
    }
}
