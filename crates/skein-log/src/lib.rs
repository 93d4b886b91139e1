//! # skein-log
//!
//! A durable, totally-ordered replicated log for a stream-processing
//! cluster, layered on a ZooKeeper-style coordination service.
//!
//! Peers append opaque entries through [`LogWriter`]; the service assigns
//! each entry a monotonically increasing position. Subscribers tail the log
//! with [`LogSubscriber`]: a per-peer cursor that seeks to the origin
//! snapshot, emits entries in ascending order, parks on watches at the head,
//! and re-seeks when garbage collection has removed the position it expected.
//! Around the log sit the auxiliary surfaces: typed chunk storage
//! ([`ChunkStore`]), the CAS'd origin snapshot ([`OriginManager`]), ephemeral
//! liveness pulses ([`PulseRegistry`]), and entry GC ([`LogGc`]).
//!
//! [`CoordinationLog`] assembles the pieces: it drives the connection
//! lifecycle, bootstraps the namespace skeleton, and hands out component
//! handles sharing one client.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use skein_core::{JsonCodec, NullSink};
//! use skein_log::{CoordinationLog, LogConfig, LogEvent};
//! use tokio::sync::mpsc;
//!
//! # async fn run() -> skein_log::Result<()> {
//! let config = LogConfig::new("cluster-1").with_embedded_server();
//! let log = CoordinationLog::connect(
//!     config,
//!     Arc::new(JsonCodec),
//!     Arc::new(NullSink),
//!     serde_json::json!({}),
//! )
//! .await?;
//!
//! log.writer().write_log_entry(&serde_json::json!({"op": "submit-job"})).await?;
//!
//! let (tx, mut rx) = mpsc::channel(1000);
//! let subscription = log.subscriber().subscribe(tx).await?;
//! while let Some(event) = rx.recv().await {
//!     match event {
//!         LogEvent::SetReplica { .. } => { /* replace local replica */ }
//!         LogEvent::Entry(_entry) => { /* apply entry */ }
//!         LogEvent::Closed(_) => break,
//!     }
//! }
//! subscription.shutdown().await;
//! log.shutdown().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod backend;
pub mod chunks;
pub mod config;
pub mod connection;
pub mod error;
pub mod gc;
pub mod origin;
pub mod pulse;
pub mod subscriber;
pub mod writer;

/// Version of the log layout and entry semantics this build speaks.
///
/// Subscribers fail fast when the stored `log-parameters` carry a different
/// version.
pub const LOG_VERSION: &str = "0.1.0";

pub use backend::{CoordinationLog, LogParameters};
pub use chunks::ChunkStore;
pub use config::LogConfig;
pub use connection::ConnectionManager;
pub use error::{LogError, Result};
pub use gc::LogGc;
pub use origin::{OriginManager, OriginSnapshot};
pub use pulse::PulseRegistry;
pub use subscriber::{InitialState, LogEntry, LogEvent, LogSubscriber, Subscription};
pub use writer::LogWriter;
