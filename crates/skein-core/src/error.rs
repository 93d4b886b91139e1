//! Error kinds and result alias for coordination operations.
//!
//! The client adapter normalizes every backend failure to one of the kinds
//! below; callers match on kinds rather than on backend-specific codes.

use thiserror::Error;

/// The result type used throughout skein-core.
pub type Result<T> = std::result::Result<T, CoordError>;

/// Normalized errors raised by the coordination client adapter.
#[derive(Debug, Error)]
pub enum CoordError {
    /// No node exists at the given path.
    #[error("no node: {0}")]
    NoNode(String),

    /// A node already exists at the given path.
    #[error("node exists: {0}")]
    NodeExists(String),

    /// A versioned write lost a compare-and-swap race.
    #[error("bad version on {path}")]
    BadVersion {
        /// Path of the node whose version check failed.
        path: String,
    },

    /// The connection to the coordination service dropped mid-operation.
    #[error("connection to coordination service lost")]
    ConnectionLoss,

    /// The session with the coordination service expired.
    #[error("coordination session expired")]
    SessionExpired,

    /// Payload encoding or decoding failed.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the codec failure.
        message: String,
    },

    /// An identifier failed validation.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Description of what made the identifier invalid.
        message: String,
    },

    /// Any other backend failure.
    #[error("coordination error: {message}")]
    Other {
        /// Description of the failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl CoordError {
    /// Returns true for the two connection-failure kinds.
    ///
    /// Storage operations run inside a guard that maps these to the
    /// `SubscriberClosed` sentinel; every other kind propagates unchanged.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::ConnectionLoss | Self::SessionExpired)
    }

    /// Creates an [`CoordError::Other`] with the given message.
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an [`CoordError::Other`] with a source cause.
    #[must_use]
    pub fn other_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a codec error with the given message.
    #[must_use]
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnect_kinds() {
        assert!(CoordError::ConnectionLoss.is_disconnect());
        assert!(CoordError::SessionExpired.is_disconnect());
        assert!(!CoordError::NoNode("/a".into()).is_disconnect());
        assert!(!CoordError::other("boom").is_disconnect());
    }

    #[test]
    fn display_includes_path() {
        let err = CoordError::NoNode("/onyx/t1/log".into());
        assert!(err.to_string().contains("/onyx/t1/log"));
    }
}
