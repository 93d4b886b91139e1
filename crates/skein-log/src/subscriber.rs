//! Resumable log subscription.
//!
//! A subscription owns a cursor over the append-only log. Setup seeks to the
//! origin snapshot and emits a synthetic `SetReplica` event before any real
//! entry; the tail loop then reads entries in ascending position order,
//! parking on a children watch when it reaches the head.
//!
//! Two races shape the loop:
//!
//! - **Registration vs. create**: an entry can land between the first
//!   existence check and the watch registration, so the loop re-checks
//!   existence after registering and before waiting.
//! - **Watch on delete**: the children watch also fires when GC deletes an
//!   entry, so a fired watch is re-checked too; if the awaited entry still
//!   is not there, the loop goes around and waits again.
//!
//! An entry missing where it was expected to be (`NoNode` — or `NodeExists`,
//! handled identically — during a read) means GC collected it; the cursor
//! re-seeks to the origin snapshot, emits a fresh `SetReplica`, and resumes
//! from the snapshot's message id plus one.
//!
//! Connection failures are not retried here: they surface as a
//! [`LogEvent::Closed`] on the output channel and the task exits. The caller
//! recreates the subscription after reconnection.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::Value;
use skein_core::{ChunkKind, CoordError, MonitoringEvent};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::LOG_VERSION;
use crate::backend::{LogContext, LogParameters};
use crate::error::{LogError, Result, guard};
use crate::origin::OriginManager;

/// Backoff between attempts of the bootstrap parameters read. Unbounded by
/// design: peers cannot make progress without the parameters.
const PARAMETERS_RETRY: Duration = Duration::from_millis(500);

/// One log entry as delivered to a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Position in the global order.
    pub message_id: i64,
    /// Node creation time, per the coordination service.
    pub created_at: DateTime<Utc>,
    /// Decoded payload.
    pub value: Value,
}

/// Events produced onto a subscription's output channel.
#[derive(Debug)]
pub enum LogEvent {
    /// Replace the local replica with this snapshot. Emitted once at startup
    /// and again after every re-seek, always before any entry that follows.
    SetReplica {
        /// Serialized replica state from the origin snapshot.
        replica: Value,
    },
    /// The next entry in ascending message-id order.
    Entry(LogEntry),
    /// The subscription terminated; no further events follow.
    Closed(LogError),
}

/// Aggregate state returned once a subscription is ready: the origin replica
/// merged with the stored log parameters.
#[derive(Debug, Clone)]
pub struct InitialState {
    /// Replica state from the origin snapshot.
    pub replica: Value,
    /// Cluster-wide parameters.
    pub parameters: LogParameters,
}

/// A running subscription.
#[derive(Debug)]
pub struct Subscription {
    initial: InitialState,
    kill_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl Subscription {
    /// Returns the initial aggregate state.
    #[must_use]
    pub fn initial(&self) -> &InitialState {
        &self.initial
    }

    /// Signals the tail task to stop and waits for it to finish.
    pub async fn shutdown(mut self) {
        if let Some(kill) = self.kill_tx.take() {
            let _ = kill.send(());
        }
        let _ = self.handle.await;
    }
}

/// Creates subscriptions over the log.
pub struct LogSubscriber {
    ctx: LogContext,
}

impl LogSubscriber {
    pub(crate) fn new(ctx: LogContext) -> Self {
        Self { ctx }
    }

    /// Starts a subscription producing onto `tx`.
    ///
    /// The first event on the channel is a [`LogEvent::SetReplica`] carrying
    /// the origin replica; entries follow from the snapshot's message id plus
    /// one. The channel's capacity is the caller's backpressure knob: sends
    /// block, so a slow consumer stalls the cursor, not the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored log version is incompatible, the origin
    /// is unreadable, or `tx` is already closed.
    pub async fn subscribe(&self, tx: mpsc::Sender<LogEvent>) -> Result<Subscription> {
        let parameters = self.read_parameters_with_retry().await;
        if parameters.log_version != LOG_VERSION {
            return Err(LogError::VersionMismatch {
                ours: LOG_VERSION.to_string(),
                stored: parameters.log_version,
            });
        }

        let origin = OriginManager::new(self.ctx.clone()).read_origin().await?;
        let position = origin.message_id + 1;
        tx.send(LogEvent::SetReplica {
            replica: origin.replica.clone(),
        })
        .await
        .map_err(|_| LogError::ChannelClosed)?;

        let initial = InitialState {
            replica: origin.replica,
            parameters,
        };

        let (kill_tx, kill_rx) = oneshot::channel();
        let ctx = self.ctx.clone();
        let handle = tokio::spawn(tail(ctx, position, tx, kill_rx));

        Ok(Subscription {
            initial,
            kill_tx: Some(kill_tx),
            handle,
        })
    }

    async fn read_parameters_with_retry(&self) -> LogParameters {
        loop {
            match read_log_parameters(&self.ctx).await {
                Ok(parameters) => return parameters,
                Err(e) => {
                    tracing::warn!(error = %e, "log parameters unavailable; retrying");
                    tokio::time::sleep(PARAMETERS_RETRY).await;
                }
            }
        }
    }
}

async fn read_log_parameters(ctx: &LogContext) -> Result<LogParameters> {
    let start = Instant::now();
    let (bytes, _) = guard(ctx.client.get(&ctx.paths.log_parameters()).await)?;
    let parameters = ctx.decode(&bytes)?;
    ctx.sink.emit(MonitoringEvent::new(
        ChunkKind::LogParameters.read_event(),
        start.elapsed(),
    ));
    Ok(parameters)
}

async fn tail(
    ctx: LogContext,
    position: i64,
    tx: mpsc::Sender<LogEvent>,
    mut kill_rx: oneshot::Receiver<()>,
) {
    match run_tail(&ctx, position, &tx, &mut kill_rx).await {
        Ok(()) => {}
        // The consumer went away; there is nobody left to notify.
        Err(LogError::ChannelClosed) => {}
        Err(err) => {
            let _ = tx.send(LogEvent::Closed(err)).await;
        }
    }
}

async fn run_tail(
    ctx: &LogContext,
    mut position: i64,
    tx: &mpsc::Sender<LogEvent>,
    kill_rx: &mut oneshot::Receiver<()>,
) -> Result<()> {
    loop {
        let path = ctx.paths.log_entry(position);
        if guard(ctx.client.exists(&path).await)?.is_some() {
            position = emit_or_reseek(ctx, position, tx).await?;
            continue;
        }

        let (_children, watch_rx) = guard(ctx.client.children_watch(&ctx.paths.log_root()).await)?;

        // The entry may have landed between the existence check above and
        // the watch registration.
        if guard(ctx.client.exists(&path).await)?.is_some() {
            position = emit_or_reseek(ctx, position, tx).await?;
            continue;
        }

        tokio::select! {
            _ = &mut *kill_rx => return Ok(()),
            fired = watch_rx => {
                if fired.is_err() {
                    // The adapter shut down while we were parked.
                    return Err(LogError::SubscriberClosed);
                }
                if guard(ctx.client.exists(&path).await)?.is_some() {
                    position = emit_or_reseek(ctx, position, tx).await?;
                }
                // Otherwise the watch fired on a GC delete; go around and
                // park again.
            }
        }
    }
}

/// Reads and emits the entry at `position`, returning the next cursor
/// position. An entry missing at its expected position re-seeks to origin.
async fn emit_or_reseek(
    ctx: &LogContext,
    position: i64,
    tx: &mpsc::Sender<LogEvent>,
) -> Result<i64> {
    match read_entry(ctx, position).await {
        Ok(entry) => {
            tx.send(LogEvent::Entry(entry))
                .await
                .map_err(|_| LogError::ChannelClosed)?;
            Ok(position + 1)
        }
        Err(LogError::Coordination(CoordError::NoNode(_) | CoordError::NodeExists(_))) => {
            reseek(ctx, tx).await
        }
        Err(e) => Err(e),
    }
}

async fn read_entry(ctx: &LogContext, position: i64) -> Result<LogEntry> {
    let start = Instant::now();
    let (bytes, stat) = guard(ctx.client.get(&ctx.paths.log_entry(position)).await)?;
    let value = ctx.decode_value(&bytes)?;
    ctx.sink.emit(
        MonitoringEvent::new("read_log_entry", start.elapsed()).with_position(position),
    );
    Ok(LogEntry {
        message_id: position,
        created_at: stat.ctime,
        value,
    })
}

async fn reseek(ctx: &LogContext, tx: &mpsc::Sender<LogEvent>) -> Result<i64> {
    let origin = OriginManager::new(ctx.clone()).read_origin().await?;
    tracing::debug!(
        message_id = origin.message_id,
        "entry collected; re-seeking to origin"
    );
    tx.send(LogEvent::SetReplica {
        replica: origin.replica,
    })
    .await
    .map_err(|_| LogError::ChannelClosed)?;
    Ok(origin.message_id + 1)
}
