//! Connection lifecycle management.
//!
//! The manager owns the connect loop, the connection-state listener, and the
//! reconnect driver. Loss events enqueue a signal on a single-slot restart
//! channel; the background task consumes at most one signal at a time and
//! blocks until reconnected. Shutdown removes the listener first, then stops
//! the task, then closes the client — listener removal must precede close so
//! no callback fires into a torn-down handle.

use std::sync::Arc;
use std::time::Duration;

use skein_core::{ConnectionState, Coordination};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Result, guard};

/// Length of one `block_until_connected` attempt.
const CONNECT_ATTEMPT: Duration = Duration::from_secs(5);

enum RestartSignal {
    Reconnect,
    Shutdown,
}

/// Drives the connection to the coordination service.
pub struct ConnectionManager {
    client: Arc<dyn Coordination>,
    restart_tx: mpsc::Sender<RestartSignal>,
    listener: JoinHandle<()>,
    reconnect: JoinHandle<()>,
}

impl ConnectionManager {
    /// Connects and starts the reconnect driver.
    ///
    /// Blocks in 5-second attempts until the initial connection succeeds.
    pub async fn start(client: Arc<dyn Coordination>) -> Self {
        while !client.block_until_connected(CONNECT_ATTEMPT).await {
            tracing::warn!("coordination service unavailable; retrying connect");
        }
        tracing::info!("connected to coordination service");

        let (restart_tx, mut restart_rx) = mpsc::channel(1);

        let mut state_rx = client.state_changes();
        let signal_tx = restart_tx.clone();
        let listener = tokio::spawn(async move {
            while state_rx.changed().await.is_ok() {
                if *state_rx.borrow() == ConnectionState::Lost {
                    // Single-slot channel: a pending signal already covers
                    // this loss.
                    let _ = signal_tx.try_send(RestartSignal::Reconnect);
                }
            }
        });

        let reconnect_client = Arc::clone(&client);
        let reconnect = tokio::spawn(async move {
            while let Some(signal) = restart_rx.recv().await {
                match signal {
                    RestartSignal::Shutdown => break,
                    RestartSignal::Reconnect => {
                        tracing::warn!("connection lost; reconnecting");
                        while !reconnect_client.block_until_connected(CONNECT_ATTEMPT).await {
                            tracing::warn!("coordination service unavailable; retrying connect");
                        }
                        tracing::info!("reconnected to coordination service");
                    }
                }
            }
        });

        Self {
            client,
            restart_tx,
            listener,
            reconnect,
        }
    }

    /// Returns the managed client handle.
    #[must_use]
    pub fn client(&self) -> Arc<dyn Coordination> {
        Arc::clone(&self.client)
    }

    /// Stops the listener and reconnect task, then closes the client if it
    /// is still started.
    ///
    /// # Errors
    ///
    /// Returns an error if closing the client fails.
    pub async fn shutdown(self) -> Result<()> {
        self.listener.abort();
        let _ = self.restart_tx.try_send(RestartSignal::Shutdown);
        self.reconnect.abort();
        let _ = self.reconnect.await;
        if self.client.is_started() {
            guard(self.client.close().await)?;
        }
        Ok(())
    }
}
