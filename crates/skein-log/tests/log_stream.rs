//! End-to-end write/subscribe scenarios over the shared log.

mod common;

use common::{connect, expect_entry, expect_set_replica};
use serde_json::json;
use tokio::sync::mpsc;

#[tokio::test]
async fn late_subscriber_sees_base_replica_then_entries() {
    let (log, _store) = connect("t1").await;
    log.writer()
        .write_log_entry(&json!({"x": 1}))
        .await
        .expect("write");

    let (tx, mut rx) = mpsc::channel(16);
    let subscription = log.subscriber().subscribe(tx).await.expect("subscribe");

    assert_eq!(expect_set_replica(&mut rx).await, json!({}));
    let entry = expect_entry(&mut rx).await;
    assert_eq!(entry.message_id, 0);
    assert_eq!(entry.value, json!({"x": 1}));

    subscription.shutdown().await;
    log.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn subscriber_tails_entries_written_while_parked() {
    let (log, _store) = connect("t1").await;

    let (tx, mut rx) = mpsc::channel(16);
    let subscription = log.subscriber().subscribe(tx).await.expect("subscribe");
    expect_set_replica(&mut rx).await;

    for n in 0..5 {
        log.writer()
            .write_log_entry(&json!({"n": n}))
            .await
            .expect("write");
        let entry = expect_entry(&mut rx).await;
        assert_eq!(entry.message_id, n);
        assert_eq!(entry.value, json!({"n": n}));
    }

    subscription.shutdown().await;
    log.shutdown().await.expect("shutdown");
}

/// Writers A and B each append 100 entries concurrently. The global order
/// covers 0..200 densely, and each writer's values appear in its own program
/// order.
#[tokio::test]
async fn concurrent_writers_interleave_without_loss() {
    const PER_WRITER: i64 = 100;

    let (log, _store) = connect("t1").await;

    let writer_a = log.writer();
    let writer_b = log.writer();
    let task_a = tokio::spawn(async move {
        for n in 0..PER_WRITER {
            writer_a
                .write_log_entry(&json!({"writer": "a", "n": n}))
                .await
                .expect("write a");
        }
    });
    let task_b = tokio::spawn(async move {
        for n in 0..PER_WRITER {
            writer_b
                .write_log_entry(&json!({"writer": "b", "n": n}))
                .await
                .expect("write b");
        }
    });
    task_a.await.expect("join a");
    task_b.await.expect("join b");

    let (tx, mut rx) = mpsc::channel(512);
    let subscription = log.subscriber().subscribe(tx).await.expect("subscribe");
    expect_set_replica(&mut rx).await;

    let mut seen_a = Vec::new();
    let mut seen_b = Vec::new();
    for expected_id in 0..2 * PER_WRITER {
        let entry = expect_entry(&mut rx).await;
        assert_eq!(entry.message_id, expected_id, "dense global order");
        let n = entry.value["n"].as_i64().expect("n");
        match entry.value["writer"].as_str() {
            Some("a") => seen_a.push(n),
            Some("b") => seen_b.push(n),
            other => panic!("unexpected writer tag: {other:?}"),
        }
    }

    let program_order: Vec<i64> = (0..PER_WRITER).collect();
    assert_eq!(seen_a, program_order, "writer A's program order");
    assert_eq!(seen_b, program_order, "writer B's program order");

    subscription.shutdown().await;
    log.shutdown().await.expect("shutdown");
}

/// Two subscribers over the same log observe the identical sequence.
#[tokio::test]
async fn subscribers_agree_on_the_global_order() {
    let (log, _store) = connect("t1").await;
    for n in 0..10 {
        log.writer()
            .write_log_entry(&json!({"n": n}))
            .await
            .expect("write");
    }

    let mut sequences = Vec::new();
    for _ in 0..2 {
        let (subscription, mut rx) = log.subscribe().await.expect("subscribe");
        expect_set_replica(&mut rx).await;

        let mut ids = Vec::new();
        for _ in 0..10 {
            ids.push(expect_entry(&mut rx).await.message_id);
        }
        sequences.push(ids);
        subscription.shutdown().await;
    }

    assert_eq!(sequences[0], sequences[1]);
    assert_eq!(sequences[0], (0..10).collect::<Vec<i64>>());

    log.shutdown().await.expect("shutdown");
}
