//! Pulse and membership scenarios: ephemeral liveness and deletion watches.

mod common;

use std::sync::Arc;

use common::connect;
use serde_json::json;
use skein_core::{Coordination, JsonCodec, NullSink};
use skein_log::{CoordinationLog, LogConfig};
use tokio::sync::mpsc;
use ulid::Ulid;

#[tokio::test]
async fn pulse_presence_tracks_registration() {
    let (log, _store) = connect("t1").await;
    let pulses = log.pulse();
    let peer_id = Ulid::new().to_string();

    assert!(!pulses.group_exists(&peer_id).await.expect("absent"));
    pulses.register_pulse(&peer_id).await.expect("register");
    assert!(pulses.group_exists(&peer_id).await.expect("present"));

    log.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn explicit_delete_fires_the_watch_exactly_once() {
    let (log, store) = connect("t1").await;
    let pulses = log.pulse();

    pulses.register_pulse("peer-a").await.expect("register");

    let (tx, mut rx) = mpsc::channel(4);
    pulses.on_delete("peer-a", tx).await;

    store
        .delete("/onyx/t1/pulse/peer-a")
        .await
        .expect("delete");

    assert_eq!(rx.recv().await, Some(true));
    assert_eq!(rx.recv().await, None, "exactly one notification");

    log.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn absent_peer_fires_immediately() {
    let (log, _store) = connect("t1").await;

    let (tx, mut rx) = mpsc::channel(4);
    log.pulse().on_delete("never-registered", tx).await;
    assert_eq!(rx.recv().await, Some(true));

    log.shutdown().await.expect("shutdown");
}

/// A peer's session ending removes its pulse automatically, and watchers on
/// other sessions are notified.
#[tokio::test]
async fn session_expiry_removes_the_pulse_and_notifies() {
    let (log, store) = connect("t1").await;

    // The departing peer registers through its own session.
    let peer_session = store.session_handle().expect("session");
    let peer_log = CoordinationLog::with_client(
        LogConfig::new("t1"),
        Arc::new(peer_session.clone()),
        Arc::new(JsonCodec),
        Arc::new(NullSink),
        json!({}),
    )
    .await
    .expect("peer connect");
    peer_log.pulse().register_pulse("peer-b").await.expect("register");

    let (tx, mut rx) = mpsc::channel(4);
    log.pulse().on_delete("peer-b", tx).await;

    peer_session.expire_session();

    assert_eq!(rx.recv().await, Some(true));
    assert!(!log.pulse().group_exists("peer-b").await.expect("gone"));

    log.shutdown().await.expect("shutdown");
}
