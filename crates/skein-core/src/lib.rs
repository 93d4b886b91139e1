//! # skein-core
//!
//! Core abstractions for the skein coordination log backend.
//!
//! This crate defines the primitives the log layer is written against:
//!
//! - **Coordination adapter**: the [`Coordination`] trait over a hierarchical
//!   node store with ephemerals, sequentials, versioned CAS, and one-shot
//!   watches, plus the in-memory implementation backing tests and the
//!   embedded-server configuration
//! - **Codec boundary**: pluggable encode/decode over opaque payloads
//! - **Namespace layout**: derivation of every path from a tenancy prefix
//! - **Error kinds**: normalized coordination failures
//! - **Observability**: structured logging and monitoring-event plumbing
//!
//! The ZooKeeper-backed adapter is available behind the `zookeeper-backend`
//! feature.
//!
//! ## Example
//!
//! ```rust
//! use skein_core::prelude::*;
//!
//! let tenancy = Tenancy::new("cluster-1").unwrap();
//! let paths = NamespacePaths::new(&tenancy);
//! assert_eq!(paths.log_entry(0), "/onyx/cluster-1/log/entry-0000000000");
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod codec;
pub mod coordination;
pub mod error;
pub mod monitoring;
pub mod namespace;
pub mod observability;
#[cfg(feature = "zookeeper-backend")]
pub mod zk;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use skein_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::codec::{Codec, GzipCodec, JsonCodec};
    pub use crate::coordination::{
        ConnectionState, Coordination, CreateMode, MemoryCoordination, NodeStat, WatchEvent,
        WatchEventKind,
    };
    pub use crate::error::{CoordError, Result};
    pub use crate::monitoring::{ChannelSink, EventSink, MetricsSink, MonitoringEvent, NullSink};
    pub use crate::namespace::{
        ChunkKind, NamespacePaths, Tenancy, WriteStrategy, pad_sequential_id, parse_position,
    };
}

// Re-export key types at crate root for ergonomics
pub use codec::{Codec, GzipCodec, JsonCodec};
pub use coordination::{
    ConnectionState, Coordination, CreateMode, MemoryCoordination, NodeStat, WatchEvent,
    WatchEventKind,
};
pub use error::{CoordError, Result};
pub use monitoring::{ChannelSink, EventSink, MetricsSink, MonitoringEvent, NullSink};
pub use namespace::{
    ChunkKind, NamespacePaths, Tenancy, WriteStrategy, pad_sequential_id, parse_position,
};
pub use observability::{DEFAULT_DIRECTIVES, init_logging, storage_span};
#[cfg(feature = "zookeeper-backend")]
pub use zk::ZooKeeperCoordination;
