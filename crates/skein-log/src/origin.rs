//! Origin snapshot management.
//!
//! The origin node holds the replica state at some message id and is the
//! seek target for new and re-seeking subscribers. Updates are CAS'd and
//! only land when the new message id is strictly greater than the stored
//! one, so the snapshot's message id never regresses. A lost CAS is a no-op
//! rather than a retry: the concurrent winner carried a snapshot at least as
//! fresh, and a later update with a higher message id will succeed.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use skein_core::{ChunkKind, CoordError, MonitoringEvent};

use crate::backend::LogContext;
use crate::error::{Result, guard, guard_err};

/// The canonical starting state for subscribers: the replica as of
/// `message_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OriginSnapshot {
    /// Highest message id folded into `replica`. `-1` at bootstrap.
    pub message_id: i64,
    /// Serialized replica state.
    pub replica: Value,
}

/// CAS updates of the origin snapshot.
pub struct OriginManager {
    ctx: LogContext,
}

impl OriginManager {
    pub(crate) fn new(ctx: LogContext) -> Self {
        Self { ctx }
    }

    /// Reads the current origin snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is unreadable or the payload does not
    /// decode.
    pub async fn read_origin(&self) -> Result<OriginSnapshot> {
        let start = Instant::now();
        let path = self.ctx.paths.origin();
        let (bytes, _stat) = guard(self.ctx.client.get(&path).await)?;
        let snapshot = self.ctx.decode(&bytes)?;
        self.ctx.sink.emit(MonitoringEvent::new(
            ChunkKind::Origin.read_event(),
            start.elapsed(),
        ));
        Ok(snapshot)
    }

    /// Conditionally replaces the origin snapshot.
    ///
    /// The write lands only when `message_id` is strictly greater than the
    /// stored one; otherwise, or when a concurrent writer wins the CAS, this
    /// is a no-op. Returns whether the snapshot was replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is missing or unreadable. `BadVersion`
    /// is not an error here.
    pub async fn update_origin(&self, replica: &Value, message_id: i64) -> Result<bool> {
        let start = Instant::now();
        let path = self.ctx.paths.origin();

        let stat = guard(self.ctx.client.exists(&path).await)?
            .ok_or_else(|| guard_err(CoordError::NoNode(path.clone())))?;
        let (bytes, _) = guard(self.ctx.client.get(&path).await)?;
        let current: OriginSnapshot = self.ctx.decode(&bytes)?;

        let mut replaced = false;
        if current.message_id < message_id {
            let encoded = self.ctx.encode(&OriginSnapshot {
                message_id,
                replica: replica.clone(),
            })?;
            match self.ctx.client.set(&path, encoded, stat.version).await {
                Ok(_) => replaced = true,
                Err(CoordError::BadVersion { .. }) => {
                    tracing::debug!(message_id, "origin CAS lost to a concurrent writer");
                }
                Err(e) => return Err(guard_err(e)),
            }
        }

        self.ctx.sink.emit(
            MonitoringEvent::new(ChunkKind::Origin.write_event(), start.elapsed())
                .with_position(message_id),
        );
        Ok(replaced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::memory_context;
    use serde_json::json;

    #[tokio::test]
    async fn bootstrap_origin_reads_back() {
        let (ctx, _store) = memory_context("t1").await;
        let origin = OriginManager::new(ctx).read_origin().await.expect("read");
        assert_eq!(origin.message_id, -1);
    }

    #[tokio::test]
    async fn update_advances_monotonically() {
        let (ctx, _store) = memory_context("t1").await;
        let manager = OriginManager::new(ctx);

        assert!(manager.update_origin(&json!({"v": 1}), 3).await.expect("first"));
        assert!(manager.update_origin(&json!({"v": 2}), 7).await.expect("second"));

        let origin = manager.read_origin().await.expect("read");
        assert_eq!(origin.message_id, 7);
        assert_eq!(origin.replica, json!({"v": 2}));
    }

    #[tokio::test]
    async fn regression_is_rejected() {
        let (ctx, _store) = memory_context("t1").await;
        let manager = OriginManager::new(ctx);

        assert!(manager.update_origin(&json!({"v": 1}), 7).await.expect("first"));
        assert!(!manager.update_origin(&json!({"v": 0}), 3).await.expect("second"));

        let origin = manager.read_origin().await.expect("read");
        assert_eq!(origin.message_id, 7);
        assert_eq!(origin.replica, json!({"v": 1}));
    }

    #[tokio::test]
    async fn equal_message_id_is_a_noop() {
        let (ctx, _store) = memory_context("t1").await;
        let manager = OriginManager::new(ctx);

        assert!(manager.update_origin(&json!({"v": 1}), 5).await.expect("first"));
        assert!(!manager.update_origin(&json!({"v": 2}), 5).await.expect("second"));

        let origin = manager.read_origin().await.expect("read");
        assert_eq!(origin.replica, json!({"v": 1}));
    }
}
