//! Liveness pulses and membership watches.
//!
//! A pulse is an ephemeral node whose presence equals liveness: the
//! coordination service removes it when the owning session ends. Membership
//! tracking watches for the deletion.

use skein_core::{CreateMode, WatchEventKind};
use tokio::sync::mpsc;

use crate::backend::LogContext;
use crate::error::{Result, guard};

/// Registers and watches peer liveness markers.
pub struct PulseRegistry {
    ctx: LogContext,
}

impl PulseRegistry {
    pub(crate) fn new(ctx: LogContext) -> Self {
        Self { ctx }
    }

    /// Creates the ephemeral pulse node for a peer.
    ///
    /// # Errors
    ///
    /// Returns [`skein_core::CoordError::NodeExists`] if the peer already has
    /// a live pulse.
    pub async fn register_pulse(&self, peer_id: &str) -> Result<()> {
        guard(
            self.ctx
                .client
                .create(&self.ctx.paths.pulse(peer_id), None, CreateMode::Ephemeral)
                .await,
        )?;
        tracing::debug!(peer_id, "pulse registered");
        Ok(())
    }

    /// Arranges for exactly one `true` on `tx` when the peer's pulse node is
    /// deleted. If the node does not exist at call time — including when the
    /// existence check itself fails — the `true` is sent immediately.
    pub async fn on_delete(&self, peer_id: &str, tx: mpsc::Sender<bool>) {
        let path = self.ctx.paths.pulse(peer_id);
        match self.ctx.client.exists_watch(&path).await {
            Ok((Some(_), watch_rx)) => {
                tokio::spawn(async move {
                    if let Ok(event) = watch_rx.await {
                        if event.kind == WatchEventKind::NodeDeleted {
                            let _ = tx.send(true).await;
                        }
                    }
                });
            }
            Ok((None, _)) | Err(_) => {
                let _ = tx.send(true).await;
            }
        }
    }

    /// Whether the peer currently has a live pulse.
    ///
    /// # Errors
    ///
    /// Returns an error if the existence check fails.
    pub async fn group_exists(&self, peer_id: &str) -> Result<bool> {
        Ok(guard(self.ctx.client.exists(&self.ctx.paths.pulse(peer_id)).await)?.is_some())
    }
}
