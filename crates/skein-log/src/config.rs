//! Backend configuration.
//!
//! Recognized keys (kebab-case in serialized form):
//!
//! | Key | Effect |
//! |---|---|
//! | `tenancy-id` | required; forms the namespace prefix |
//! | `address` | connect string for the coordination service |
//! | `server` | start the embedded in-process backend instead of dialing |
//! | `server-port` | listening port for the embedded server, kept for config parity (the in-process backend binds no socket) |
//! | `subscriber-buffer-size` | default capacity for subscriber output channels |
//! | `connect-timeout-ms` | session timeout handed to the backend client |

use std::time::Duration;

use serde::{Deserialize, Serialize};
use skein_core::Tenancy;

use crate::error::{LogError, Result};

fn default_address() -> String {
    "127.0.0.1:2181".to_string()
}

fn default_subscriber_buffer_size() -> usize {
    1000
}

fn default_connect_timeout_ms() -> u64 {
    15_000
}

/// Configuration for one backend instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LogConfig {
    /// Tenancy identifier; forms the namespace prefix.
    pub tenancy_id: String,

    /// Connect string for the coordination service.
    #[serde(default = "default_address")]
    pub address: String,

    /// Whether to run against the embedded in-process backend.
    #[serde(default)]
    pub server: bool,

    /// Listening port for the embedded server. Kept for config parity; the
    /// in-process backend binds no socket.
    #[serde(default)]
    pub server_port: Option<u16>,

    /// Default capacity for subscriber output channels.
    #[serde(default = "default_subscriber_buffer_size")]
    pub subscriber_buffer_size: usize,

    /// Session timeout handed to the backend client, in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl LogConfig {
    /// Creates a configuration with defaults for everything but the tenancy.
    #[must_use]
    pub fn new(tenancy_id: impl Into<String>) -> Self {
        Self {
            tenancy_id: tenancy_id.into(),
            address: default_address(),
            server: false,
            server_port: None,
            subscriber_buffer_size: default_subscriber_buffer_size(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }

    /// Selects the embedded in-process backend.
    #[must_use]
    pub fn with_embedded_server(mut self) -> Self {
        self.server = true;
        self
    }

    /// Sets the coordination service address.
    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Returns the validated tenancy.
    ///
    /// # Errors
    ///
    /// Returns an error if the tenancy id is invalid.
    pub fn tenancy(&self) -> Result<Tenancy> {
        Tenancy::new(&self.tenancy_id).map_err(|e| LogError::Config {
            message: e.to_string(),
        })
    }

    /// Returns the connect timeout as a duration.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
