//! Shared helpers for the integration suite.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{Value, json};
use skein_core::{JsonCodec, MemoryCoordination, NullSink};
use skein_log::{CoordinationLog, LogConfig, LogEntry, LogEvent};
use tokio::sync::mpsc;

/// Connects a backend over a fresh in-memory store.
///
/// The backend gets its own session; the returned store handle stays usable
/// for direct manipulation after the backend shuts down.
pub async fn connect(tenancy: &str) -> (CoordinationLog, MemoryCoordination) {
    connect_with_base(tenancy, json!({})).await
}

/// Like [`connect`], with an explicit base replica for the bootstrap.
pub async fn connect_with_base(
    tenancy: &str,
    base_replica: Value,
) -> (CoordinationLog, MemoryCoordination) {
    let store = MemoryCoordination::new();
    let session = store.session_handle().expect("session");
    let log = CoordinationLog::with_client(
        LogConfig::new(tenancy),
        Arc::new(session),
        Arc::new(JsonCodec),
        Arc::new(NullSink),
        base_replica,
    )
    .await
    .expect("connect");
    (log, store)
}

/// Receives the next event, expecting a replica reset.
pub async fn expect_set_replica(rx: &mut mpsc::Receiver<LogEvent>) -> Value {
    match rx.recv().await.expect("expected an event") {
        LogEvent::SetReplica { replica } => replica,
        other => panic!("expected SetReplica, got {other:?}"),
    }
}

/// Receives the next event, expecting a log entry.
pub async fn expect_entry(rx: &mut mpsc::Receiver<LogEvent>) -> LogEntry {
    match rx.recv().await.expect("expected an event") {
        LogEvent::Entry(entry) => entry,
        other => panic!("expected Entry, got {other:?}"),
    }
}
