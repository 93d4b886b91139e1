//! Origin snapshot CAS scenarios: monotonic advance, regression rejection.

mod common;

use common::{connect, connect_with_base, expect_entry, expect_set_replica};
use serde_json::json;
use skein_core::ChunkKind;
use tokio::sync::mpsc;

#[tokio::test]
async fn successive_updates_advance_the_snapshot() {
    let (log, _store) = connect("t1").await;
    let origin = log.origin();

    assert!(origin.update_origin(&json!({"v": 1}), 0).await.expect("first"));
    assert!(origin.update_origin(&json!({"v": 2}), 5).await.expect("second"));
    assert!(origin.update_origin(&json!({"v": 3}), 6).await.expect("third"));

    let snapshot = origin.read_origin().await.expect("read");
    assert_eq!(snapshot.message_id, 6);
    assert_eq!(snapshot.replica, json!({"v": 3}));

    log.shutdown().await.expect("shutdown");
}

/// A stale update with a lower message id is dropped, and the stored
/// snapshot is observable through the chunk interface.
#[tokio::test]
async fn regression_is_rejected() {
    let (log, _store) = connect("t1").await;
    let origin = log.origin();

    let r1 = json!({"peers": ["a", "b"]});
    let r0 = json!({"peers": []});
    assert!(origin.update_origin(&r1, 7).await.expect("advance"));
    assert!(!origin.update_origin(&r0, 3).await.expect("regress"));

    let stored = log
        .chunks()
        .read_chunk(ChunkKind::Origin, "")
        .await
        .expect("read");
    assert_eq!(stored["message-id"], json!(7));
    assert_eq!(stored["replica"], r1);

    log.shutdown().await.expect("shutdown");
}

/// Updates arriving out of order leave the snapshot at the maximum; every
/// observed message id along the way is non-decreasing.
#[tokio::test]
async fn out_of_order_updates_never_regress() {
    let (log, _store) = connect("t1").await;
    let origin = log.origin();

    let mut observed = Vec::new();
    for message_id in [5_i64, 3, 9, 1, 20, 7, 12] {
        origin
            .update_origin(&json!({"m": message_id}), message_id)
            .await
            .expect("update");
        observed.push(origin.read_origin().await.expect("read").message_id);
    }

    assert!(
        observed.windows(2).all(|pair| pair[0] <= pair[1]),
        "message id regressed: {observed:?}"
    );
    assert_eq!(*observed.last().expect("non-empty"), 20);

    log.shutdown().await.expect("shutdown");
}

/// A new subscriber starting after an origin advance begins from the
/// advanced snapshot, not the base replica.
#[tokio::test]
async fn subscribers_seek_to_the_latest_origin() {
    let (log, _store) = connect_with_base("t1", json!({"base": true})).await;
    for n in 0..4 {
        log.writer()
            .write_log_entry(&json!({"n": n}))
            .await
            .expect("write");
    }

    let advanced = json!({"applied-through": 1});
    assert!(
        log.origin()
            .update_origin(&advanced, 1)
            .await
            .expect("advance")
    );

    let (tx, mut rx) = mpsc::channel(16);
    let subscription = log.subscriber().subscribe(tx).await.expect("subscribe");

    assert_eq!(expect_set_replica(&mut rx).await, advanced);
    assert_eq!(expect_entry(&mut rx).await.message_id, 2);
    assert_eq!(expect_entry(&mut rx).await.message_id, 3);

    subscription.shutdown().await;
    log.shutdown().await.expect("shutdown");
}
