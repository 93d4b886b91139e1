//! GC tolerance: subscribers recover from collected entries by re-seeking
//! to the origin snapshot.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use common::{connect, expect_entry, expect_set_replica};
use serde_json::json;
use tokio::sync::{mpsc, oneshot, watch};

use skein_core::{
    ConnectionState, Coordination, CreateMode, JsonCodec, MemoryCoordination, NodeStat, NullSink,
    Result as CoordResult, WatchEvent,
};
use skein_log::{CoordinationLog, LogConfig};

/// A subscriber started after GC begins from the advanced origin snapshot
/// and never sees the collected prefix.
#[tokio::test]
async fn late_subscriber_after_gc_starts_from_origin() {
    let (log, _store) = connect("t1").await;
    for n in 0..10 {
        log.writer()
            .write_log_entry(&json!({"n": n}))
            .await
            .expect("write");
    }

    let replica_v = json!({"applied-through": 4});
    assert!(
        log.origin()
            .update_origin(&replica_v, 4)
            .await
            .expect("advance origin")
    );
    for position in 0..=4 {
        log.gc().gc_log_entry(position).await.expect("gc");
    }

    let (tx, mut rx) = mpsc::channel(32);
    let subscription = log.subscriber().subscribe(tx).await.expect("subscribe");

    assert_eq!(expect_set_replica(&mut rx).await, replica_v);
    for expected in 5..10 {
        let entry = expect_entry(&mut rx).await;
        assert_eq!(entry.message_id, expected);
        assert_eq!(entry.value, json!({"n": expected}));
    }

    subscription.shutdown().await;
    log.shutdown().await.expect("shutdown");
}

// ============================================================================
// CollectingClient - lands GC inside the subscriber's exists/read window
// ============================================================================

/// Client wrapper that, the moment the subscriber reads the target entry,
/// first advances the origin and deletes a range of entries — exactly the
/// interleaving where GC collects an entry between the cursor's existence
/// check and its read.
struct CollectingClient {
    inner: MemoryCoordination,
    target: String,
    armed: AtomicBool,
    origin_path: String,
    origin_bytes: Bytes,
    collect: Vec<String>,
}

#[async_trait]
impl Coordination for CollectingClient {
    async fn create(
        &self,
        path: &str,
        data: Option<Bytes>,
        mode: CreateMode,
    ) -> CoordResult<String> {
        self.inner.create(path, data, mode).await
    }

    async fn create_all(&self, path: &str, data: Option<Bytes>) -> CoordResult<String> {
        self.inner.create_all(path, data).await
    }

    async fn exists(&self, path: &str) -> CoordResult<Option<NodeStat>> {
        self.inner.exists(path).await
    }

    async fn exists_watch(
        &self,
        path: &str,
    ) -> CoordResult<(Option<NodeStat>, oneshot::Receiver<WatchEvent>)> {
        self.inner.exists_watch(path).await
    }

    async fn get(&self, path: &str) -> CoordResult<(Bytes, NodeStat)> {
        if path == self.target && self.armed.swap(false, Ordering::SeqCst) {
            let (_, stat) = self.inner.get(&self.origin_path).await?;
            self.inner
                .set(&self.origin_path, self.origin_bytes.clone(), stat.version)
                .await?;
            for entry in &self.collect {
                self.inner.delete(entry).await?;
            }
        }
        self.inner.get(path).await
    }

    async fn set(&self, path: &str, data: Bytes, expected_version: i64) -> CoordResult<NodeStat> {
        self.inner.set(path, data, expected_version).await
    }

    async fn children(&self, path: &str) -> CoordResult<Vec<String>> {
        self.inner.children(path).await
    }

    async fn children_watch(
        &self,
        path: &str,
    ) -> CoordResult<(Vec<String>, oneshot::Receiver<WatchEvent>)> {
        self.inner.children_watch(path).await
    }

    async fn delete(&self, path: &str) -> CoordResult<()> {
        self.inner.delete(path).await
    }

    fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_changes()
    }

    async fn block_until_connected(&self, timeout: Duration) -> bool {
        self.inner.block_until_connected(timeout).await
    }

    fn is_started(&self) -> bool {
        self.inner.is_started()
    }

    async fn close(&self) -> CoordResult<()> {
        self.inner.close().await
    }
}

/// Deleting the entry at the cursor's own position forces a re-seek: the
/// subscriber emits a fresh replica reset and resumes from the snapshot's
/// message id plus one.
#[tokio::test]
async fn collection_at_the_cursor_position_triggers_a_reseek() {
    let store = MemoryCoordination::new();
    let replica_v = json!({"applied-through": 4});
    let origin_bytes = Bytes::from(
        serde_json::to_vec(&json!({"message-id": 4, "replica": replica_v})).expect("encode"),
    );

    // Armed from the start: the only `get` of the target entry is the
    // subscriber's read, so nothing earlier can trip the hook.
    let client = CollectingClient {
        inner: store.session_handle().expect("session"),
        target: "/onyx/t1/log/entry-0000000002".to_string(),
        armed: AtomicBool::new(true),
        origin_path: "/onyx/t1/origin/origin".to_string(),
        origin_bytes,
        collect: (2..=4)
            .map(|n| format!("/onyx/t1/log/entry-{n:010}"))
            .collect(),
    };

    let log = CoordinationLog::with_client(
        LogConfig::new("t1"),
        Arc::new(client),
        Arc::new(JsonCodec),
        Arc::new(NullSink),
        json!({}),
    )
    .await
    .expect("connect");

    for n in 0..6 {
        log.writer()
            .write_log_entry(&json!({"n": n}))
            .await
            .expect("write");
    }

    let (tx, mut rx) = mpsc::channel(32);
    let subscription = log.subscriber().subscribe(tx).await.expect("subscribe");

    assert_eq!(expect_set_replica(&mut rx).await, json!({}));
    assert_eq!(expect_entry(&mut rx).await.message_id, 0);
    assert_eq!(expect_entry(&mut rx).await.message_id, 1);

    // The wrapper fires while reading entry 2: origin jumps to 4, entries
    // 2..=4 vanish, and the read comes back NoNode.
    assert_eq!(expect_set_replica(&mut rx).await, replica_v);
    let resumed = expect_entry(&mut rx).await;
    assert_eq!(resumed.message_id, 5);
    assert_eq!(resumed.value, json!({"n": 5}));

    subscription.shutdown().await;
    log.shutdown().await.expect("shutdown");
}
