//! ZooKeeper-backed implementation of the [`Coordination`] trait.
//!
//! A thin façade over the `zookeeper` crate: error codes are normalized onto
//! [`CoordError`] kinds, the crate's state listener is bridged onto a `watch`
//! channel, and its callback watchers are bridged onto `oneshot` channels.
//! The client is synchronous, so every call runs on the blocking pool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use tokio::sync::{oneshot, watch};
use zookeeper::{
    Acl, CreateMode as ZkCreateMode, Stat, Subscription, WatchedEvent, WatchedEventType, ZkError,
    ZkState, ZooKeeper, ZooKeeperExt,
};

use crate::coordination::{
    ConnectionState, Coordination, CreateMode, NodeStat, WatchEvent, WatchEventKind,
};
use crate::error::{CoordError, Result};

/// Coordination backend connected to a ZooKeeper ensemble.
pub struct ZooKeeperCoordination {
    client: Arc<ZooKeeper>,
    state_tx: watch::Sender<ConnectionState>,
    started: AtomicBool,
    listener: Mutex<Option<Subscription>>,
}

impl ZooKeeperCoordination {
    /// Connects to the ensemble at `address`.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be established within
    /// `session_timeout`.
    pub async fn connect(address: &str, session_timeout: Duration) -> Result<Self> {
        let address = address.to_string();
        let client = run_blocking(move || {
            ZooKeeper::connect(&address, session_timeout, |_event: WatchedEvent| {})
        })
        .await?
        .map_err(|e| CoordError::other(format!("zookeeper connect: {e:?}")))?;
        let client = Arc::new(client);

        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        let tx = state_tx.clone();
        let listener = client.add_listener(move |state: ZkState| {
            let mapped = match state {
                ZkState::Connected | ZkState::ConnectedReadOnly => ConnectionState::Connected,
                ZkState::Connecting => ConnectionState::Connecting,
                _ => ConnectionState::Lost,
            };
            let _ = tx.send(mapped);
        });

        Ok(Self {
            client,
            state_tx,
            started: AtomicBool::new(true),
            listener: Mutex::new(Some(listener)),
        })
    }

    fn client(&self) -> Arc<ZooKeeper> {
        Arc::clone(&self.client)
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CoordError::other(format!("blocking task failed: {e}")))
}

fn convert_error(err: ZkError, path: &str) -> CoordError {
    match err {
        ZkError::NoNode => CoordError::NoNode(path.to_string()),
        ZkError::NodeExists => CoordError::NodeExists(path.to_string()),
        ZkError::BadVersion => CoordError::BadVersion {
            path: path.to_string(),
        },
        ZkError::ConnectionLoss | ZkError::OperationTimeout => CoordError::ConnectionLoss,
        ZkError::SessionExpired => CoordError::SessionExpired,
        other => CoordError::other(format!("zookeeper error on {path}: {other:?}")),
    }
}

fn convert_stat(stat: &Stat) -> NodeStat {
    NodeStat {
        version: i64::from(stat.version),
        ctime: Utc
            .timestamp_millis_opt(stat.ctime)
            .single()
            .unwrap_or_else(Utc::now),
    }
}

fn convert_event(event: WatchedEvent) -> Option<WatchEvent> {
    let kind = match event.event_type {
        WatchedEventType::NodeCreated => WatchEventKind::NodeCreated,
        WatchedEventType::NodeDeleted => WatchEventKind::NodeDeleted,
        WatchedEventType::NodeDataChanged => WatchEventKind::NodeDataChanged,
        WatchedEventType::NodeChildrenChanged => WatchEventKind::NodeChildrenChanged,
        _ => return None,
    };
    Some(WatchEvent {
        path: event.path.unwrap_or_default(),
        kind,
    })
}

/// Adapts a `oneshot` sender into the crate's `Fn`-shaped watcher callback.
fn one_shot_watcher(tx: oneshot::Sender<WatchEvent>) -> impl Fn(WatchedEvent) + Send {
    let slot = Mutex::new(Some(tx));
    move |event: WatchedEvent| {
        if let Some(converted) = convert_event(event) {
            if let Ok(mut guard) = slot.lock() {
                if let Some(tx) = guard.take() {
                    let _ = tx.send(converted);
                }
            }
        }
    }
}

fn parent_of(path: &str) -> Option<&str> {
    match path.rfind('/') {
        Some(0) | None => None,
        Some(idx) => Some(&path[..idx]),
    }
}

#[async_trait]
impl Coordination for ZooKeeperCoordination {
    async fn create(&self, path: &str, data: Option<Bytes>, mode: CreateMode) -> Result<String> {
        let client = self.client();
        let owned = path.to_string();
        let data = data.map(|b| b.to_vec()).unwrap_or_default();
        let zk_mode = match mode {
            CreateMode::Persistent => ZkCreateMode::Persistent,
            CreateMode::PersistentSequential => ZkCreateMode::PersistentSequential,
            CreateMode::Ephemeral => ZkCreateMode::Ephemeral,
        };
        let target = owned.clone();
        run_blocking(move || client.create(&target, data, Acl::open_unsafe().clone(), zk_mode))
            .await?
            .map_err(|e| convert_error(e, &owned))
    }

    async fn create_all(&self, path: &str, data: Option<Bytes>) -> Result<String> {
        let client = self.client();
        let owned = path.to_string();
        let data = data.map(|b| b.to_vec()).unwrap_or_default();
        let target = owned.clone();
        run_blocking(move || {
            if let Some(parent) = parent_of(&target) {
                client.ensure_path(parent)?;
            }
            client.create(
                &target,
                data,
                Acl::open_unsafe().clone(),
                ZkCreateMode::Persistent,
            )
        })
        .await?
        .map_err(|e| convert_error(e, &owned))
    }

    async fn exists(&self, path: &str) -> Result<Option<NodeStat>> {
        let client = self.client();
        let owned = path.to_string();
        let target = owned.clone();
        let stat = run_blocking(move || client.exists(&target, false))
            .await?
            .map_err(|e| convert_error(e, &owned))?;
        Ok(stat.as_ref().map(convert_stat))
    }

    async fn exists_watch(
        &self,
        path: &str,
    ) -> Result<(Option<NodeStat>, oneshot::Receiver<WatchEvent>)> {
        let client = self.client();
        let owned = path.to_string();
        let target = owned.clone();
        let (tx, rx) = oneshot::channel();
        let stat = run_blocking(move || client.exists_w(&target, one_shot_watcher(tx)))
            .await?
            .map_err(|e| convert_error(e, &owned))?;
        Ok((stat.as_ref().map(convert_stat), rx))
    }

    async fn get(&self, path: &str) -> Result<(Bytes, NodeStat)> {
        let client = self.client();
        let owned = path.to_string();
        let target = owned.clone();
        let (data, stat) = run_blocking(move || client.get_data(&target, false))
            .await?
            .map_err(|e| convert_error(e, &owned))?;
        Ok((Bytes::from(data), convert_stat(&stat)))
    }

    async fn set(&self, path: &str, data: Bytes, expected_version: i64) -> Result<NodeStat> {
        let client = self.client();
        let owned = path.to_string();
        let target = owned.clone();
        let version = i32::try_from(expected_version)
            .map_err(|_| CoordError::other(format!("version out of range: {expected_version}")))?;
        let stat = run_blocking(move || client.set_data(&target, data.to_vec(), Some(version)))
            .await?
            .map_err(|e| convert_error(e, &owned))?;
        Ok(convert_stat(&stat))
    }

    async fn children(&self, path: &str) -> Result<Vec<String>> {
        let client = self.client();
        let owned = path.to_string();
        let target = owned.clone();
        run_blocking(move || client.get_children(&target, false))
            .await?
            .map_err(|e| convert_error(e, &owned))
    }

    async fn children_watch(
        &self,
        path: &str,
    ) -> Result<(Vec<String>, oneshot::Receiver<WatchEvent>)> {
        let client = self.client();
        let owned = path.to_string();
        let target = owned.clone();
        let (tx, rx) = oneshot::channel();
        let names = run_blocking(move || client.get_children_w(&target, one_shot_watcher(tx)))
            .await?
            .map_err(|e| convert_error(e, &owned))?;
        Ok((names, rx))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let client = self.client();
        let owned = path.to_string();
        let target = owned.clone();
        run_blocking(move || client.delete(&target, None))
            .await?
            .map_err(|e| convert_error(e, &owned))
    }

    fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    async fn block_until_connected(&self, timeout: Duration) -> bool {
        let mut rx = self.state_tx.subscribe();
        if *rx.borrow() == ConnectionState::Connected {
            return true;
        }
        tokio::time::timeout(timeout, async {
            while rx.changed().await.is_ok() {
                if *rx.borrow() == ConnectionState::Connected {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap_or(false)
    }

    fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        self.started.store(false, Ordering::SeqCst);
        if let Ok(mut guard) = self.listener.lock() {
            if let Some(subscription) = guard.take() {
                self.client.remove_listener(subscription);
            }
        }
        let client = self.client();
        run_blocking(move || client.close())
            .await?
            .map_err(|e| CoordError::other(format!("zookeeper close: {e:?}")))
    }
}
