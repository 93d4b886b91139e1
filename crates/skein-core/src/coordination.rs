//! Coordination service client adapter.
//!
//! This module defines the backend contract the rest of skein is written
//! against: a hierarchical node store with persistent, ephemeral, and
//! sequential creation modes, version counters supporting CAS writes, and
//! one-shot watches on existence and children.
//!
//! Watches are modeled as `oneshot` channels: each `*_watch` call registers a
//! fresh single-use sender with the backend and hands the receiver to the
//! caller. The registration happens under the same lock (or server round-trip)
//! that snapshots the current state, so a change between registration and the
//! caller's first poll is never lost.
//!
//! [`MemoryCoordination`] is a complete in-process implementation. It backs
//! the test suite and the embedded-server configuration; it is not a wire
//! server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::{oneshot, watch};

use crate::error::{CoordError, Result};
use crate::namespace::pad_sequential_id;

/// Node creation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    /// Node persists until explicitly deleted.
    Persistent,
    /// Persistent node whose name gets a monotonically increasing,
    /// 10-digit zero-padded suffix assigned by the service.
    PersistentSequential,
    /// Node is deleted automatically when the creating session ends.
    Ephemeral,
}

/// Metadata about a stored node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeStat {
    /// Version counter for CAS writes. Starts at 0, incremented on each set.
    pub version: i64,
    /// Node creation time.
    pub ctime: DateTime<Utc>,
}

/// The kind of change a watch fired on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    /// The watched node was created.
    NodeCreated,
    /// The watched node was deleted.
    NodeDeleted,
    /// The watched node's data changed.
    NodeDataChanged,
    /// A child was created or deleted under the watched node.
    NodeChildrenChanged,
}

/// A one-shot watch notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// Path the watch was registered on.
    pub path: String,
    /// What changed.
    pub kind: WatchEventKind,
}

/// Connection state as observed by the client handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Session establishment in progress.
    Connecting,
    /// Session established; operations may proceed.
    Connected,
    /// Session lost or expired; a reconnect is required.
    Lost,
}

/// Coordination service client contract.
///
/// All backends (the in-memory store, the ZooKeeper façade) implement this
/// trait. The underlying client is expected to be safe for concurrent use by
/// multiple writers and subscribers.
#[async_trait]
pub trait Coordination: Send + Sync {
    /// Creates a single node. Parents must already exist.
    ///
    /// Returns the created path; for [`CreateMode::PersistentSequential`] the
    /// returned path carries the assigned suffix.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::NoNode`] if the parent is missing and
    /// [`CoordError::NodeExists`] if the node already exists.
    async fn create(&self, path: &str, data: Option<Bytes>, mode: CreateMode) -> Result<String>;

    /// Creates a persistent node, creating missing intermediate parents.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::NodeExists`] if the leaf node already exists.
    async fn create_all(&self, path: &str, data: Option<Bytes>) -> Result<String>;

    /// Returns the node's stat, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend call fails.
    async fn exists(&self, path: &str) -> Result<Option<NodeStat>>;

    /// Like [`Coordination::exists`], additionally registering a one-shot
    /// watch that fires on the next change at the path.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend call fails.
    async fn exists_watch(
        &self,
        path: &str,
    ) -> Result<(Option<NodeStat>, oneshot::Receiver<WatchEvent>)>;

    /// Reads a node's data and stat.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::NoNode`] if the node does not exist.
    async fn get(&self, path: &str) -> Result<(Bytes, NodeStat)>;

    /// Versioned write: replaces the node's data only if its current version
    /// matches `expected_version`.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::BadVersion`] on mismatch and
    /// [`CoordError::NoNode`] if the node does not exist.
    async fn set(&self, path: &str, data: Bytes, expected_version: i64) -> Result<NodeStat>;

    /// Lists the names of the node's direct children.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::NoNode`] if the node does not exist.
    async fn children(&self, path: &str) -> Result<Vec<String>>;

    /// Like [`Coordination::children`], additionally registering a one-shot
    /// watch that fires on the next child creation or deletion — including
    /// deletions, so a fired watch does not imply the awaited child exists.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::NoNode`] if the node does not exist.
    async fn children_watch(
        &self,
        path: &str,
    ) -> Result<(Vec<String>, oneshot::Receiver<WatchEvent>)>;

    /// Deletes a node.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::NoNode`] if the node does not exist.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Returns a receiver tracking this handle's connection state.
    fn state_changes(&self) -> watch::Receiver<ConnectionState>;

    /// Blocks until the session is connected, up to `timeout`.
    ///
    /// Returns whether the session is connected.
    async fn block_until_connected(&self, timeout: Duration) -> bool;

    /// Whether the handle has been started and not yet closed.
    fn is_started(&self) -> bool;

    /// Closes the handle: ephemeral nodes owned by the session are removed
    /// and pending watches registered through it are cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend teardown fails.
    async fn close(&self) -> Result<()>;
}

// ============================================================================
// In-memory backend
// ============================================================================

struct Node {
    data: Bytes,
    version: i64,
    ctime: DateTime<Utc>,
    ephemeral_owner: Option<u64>,
}

struct WatchRegistration {
    session: u64,
    tx: oneshot::Sender<WatchEvent>,
}

#[derive(Default)]
struct Tree {
    nodes: std::collections::BTreeMap<String, Node>,
    exists_watches: HashMap<String, Vec<WatchRegistration>>,
    child_watches: HashMap<String, Vec<WatchRegistration>>,
    /// Per-parent counters for sequential creates. Advance only on creates so
    /// assigned positions stay dense across deletes.
    sequence: HashMap<String, i64>,
    next_session: u64,
}

impl Tree {
    fn fire_exists(&mut self, path: &str, kind: WatchEventKind) {
        if let Some(regs) = self.exists_watches.remove(path) {
            for reg in regs {
                let _ = reg.tx.send(WatchEvent {
                    path: path.to_string(),
                    kind,
                });
            }
        }
    }

    fn fire_children(&mut self, parent: &str) {
        if let Some(regs) = self.child_watches.remove(parent) {
            for reg in regs {
                let _ = reg.tx.send(WatchEvent {
                    path: parent.to_string(),
                    kind: WatchEventKind::NodeChildrenChanged,
                });
            }
        }
    }

    fn insert_node(&mut self, path: String, data: Bytes, ephemeral_owner: Option<u64>) {
        let parent = parent_of(&path).to_string();
        self.nodes.insert(
            path.clone(),
            Node {
                data,
                version: 0,
                ctime: Utc::now(),
                ephemeral_owner,
            },
        );
        self.fire_exists(&path, WatchEventKind::NodeCreated);
        self.fire_children(&parent);
    }

    fn remove_node(&mut self, path: &str) {
        self.nodes.remove(path);
        self.fire_exists(path, WatchEventKind::NodeDeleted);
        self.fire_children(parent_of(path));
    }

    fn has_children(&self, path: &str) -> bool {
        let prefix = format!("{path}/");
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .next()
            .is_some()
    }

    fn direct_children(&self, path: &str) -> Vec<String> {
        let prefix = format!("{path}/");
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, _)| {
                let rest = &k[prefix.len()..];
                if rest.contains('/') {
                    None
                } else {
                    Some(rest.to_string())
                }
            })
            .collect()
    }

    fn end_session(&mut self, session: u64) {
        let ephemerals: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.ephemeral_owner == Some(session))
            .map(|(p, _)| p.clone())
            .collect();
        for path in ephemerals {
            self.remove_node(&path);
        }
        // Dropping the senders wakes pending receivers with a recv error,
        // which callers treat as adapter shutdown.
        for regs in self.exists_watches.values_mut() {
            regs.retain(|r| r.session != session);
        }
        for regs in self.child_watches.values_mut() {
            regs.retain(|r| r.session != session);
        }
    }
}

struct SessionState {
    id: u64,
    started: AtomicBool,
    state_tx: watch::Sender<ConnectionState>,
}

/// In-memory coordination backend.
///
/// A complete hierarchical node store with versions, sequential suffixes,
/// ephemeral ownership, and one-shot watches. Multiple session handles can
/// share one tree via [`MemoryCoordination::session_handle`]; closing or
/// expiring a handle removes its ephemeral nodes and cancels its watches,
/// which is how the test suite drives session-loss scenarios.
#[derive(Clone)]
pub struct MemoryCoordination {
    tree: Arc<Mutex<Tree>>,
    session: Arc<SessionState>,
}

impl Default for MemoryCoordination {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCoordination {
    /// Creates a new empty store with one connected session.
    #[must_use]
    pub fn new() -> Self {
        let tree = Tree {
            next_session: 1,
            ..Tree::default()
        };
        let (state_tx, _) = watch::channel(ConnectionState::Connected);
        Self {
            tree: Arc::new(Mutex::new(tree)),
            session: Arc::new(SessionState {
                id: 0,
                started: AtomicBool::new(true),
                state_tx,
            }),
        }
    }

    /// Mints a new connected session sharing this store's tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree lock is poisoned.
    pub fn session_handle(&self) -> Result<Self> {
        let mut tree = self.lock()?;
        let id = tree.next_session;
        tree.next_session += 1;
        drop(tree);
        let (state_tx, _) = watch::channel(ConnectionState::Connected);
        Ok(Self {
            tree: Arc::clone(&self.tree),
            session: Arc::new(SessionState {
                id,
                started: AtomicBool::new(true),
                state_tx,
            }),
        })
    }

    /// Test hook: expires this handle's session.
    ///
    /// Ephemeral nodes owned by the session are removed, its pending watches
    /// are cancelled, and the connection state transitions to
    /// [`ConnectionState::Lost`].
    pub fn expire_session(&self) {
        let _ = self.session.state_tx.send(ConnectionState::Lost);
        if let Ok(mut tree) = self.tree.lock() {
            tree.end_session(self.session.id);
        }
    }

    /// Test hook: transitions the connection state to
    /// [`ConnectionState::Lost`] without ending the session.
    pub fn simulate_connection_loss(&self) {
        let _ = self.session.state_tx.send(ConnectionState::Lost);
    }

    /// Test hook: transitions the connection state back to
    /// [`ConnectionState::Connected`].
    pub fn restore_connection(&self) {
        let _ = self.session.state_tx.send(ConnectionState::Connected);
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Tree>> {
        self.tree
            .lock()
            .map_err(|_| CoordError::other("lock poisoned"))
    }

    /// Operations through a closed handle raise `SessionExpired`; through a
    /// disconnected one, `ConnectionLoss`.
    fn check_session(&self) -> Result<()> {
        if !self.session.started.load(Ordering::SeqCst) {
            return Err(CoordError::SessionExpired);
        }
        if *self.session.state_tx.borrow() == ConnectionState::Lost {
            return Err(CoordError::ConnectionLoss);
        }
        Ok(())
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => "/",
    }
}

fn validate_path(path: &str) -> Result<()> {
    if !path.starts_with('/') || path.len() < 2 {
        return Err(CoordError::other(format!("invalid path: {path}")));
    }
    if path[1..].split('/').any(str::is_empty) {
        return Err(CoordError::other(format!(
            "empty path segment in: {path}"
        )));
    }
    Ok(())
}

fn stat_of(node: &Node) -> NodeStat {
    NodeStat {
        version: node.version,
        ctime: node.ctime,
    }
}

#[async_trait]
impl Coordination for MemoryCoordination {
    async fn create(&self, path: &str, data: Option<Bytes>, mode: CreateMode) -> Result<String> {
        self.check_session()?;
        validate_path(path)?;
        let mut tree = self.lock()?;

        let parent = parent_of(path).to_string();
        if parent != "/" && !tree.nodes.contains_key(&parent) {
            return Err(CoordError::NoNode(parent));
        }

        let actual = if mode == CreateMode::PersistentSequential {
            let counter = tree.sequence.entry(parent).or_insert(0);
            let suffix = pad_sequential_id(u64::try_from(*counter).unwrap_or_default());
            *counter += 1;
            format!("{path}{suffix}")
        } else {
            path.to_string()
        };

        if tree.nodes.contains_key(&actual) {
            return Err(CoordError::NodeExists(actual));
        }

        let owner = (mode == CreateMode::Ephemeral).then_some(self.session.id);
        tree.insert_node(actual.clone(), data.unwrap_or_default(), owner);
        Ok(actual)
    }

    async fn create_all(&self, path: &str, data: Option<Bytes>) -> Result<String> {
        self.check_session()?;
        validate_path(path)?;
        let mut tree = self.lock()?;

        let segments: Vec<&str> = path[1..].split('/').collect();
        let mut current = String::new();
        for (i, segment) in segments.iter().enumerate() {
            current.push('/');
            current.push_str(segment);
            let leaf = i == segments.len() - 1;
            if tree.nodes.contains_key(&current) {
                if leaf {
                    return Err(CoordError::NodeExists(current));
                }
                continue;
            }
            let node_data = if leaf {
                data.clone().unwrap_or_default()
            } else {
                Bytes::new()
            };
            tree.insert_node(current.clone(), node_data, None);
        }
        Ok(path.to_string())
    }

    async fn exists(&self, path: &str) -> Result<Option<NodeStat>> {
        self.check_session()?;
        let tree = self.lock()?;
        Ok(tree.nodes.get(path).map(stat_of))
    }

    async fn exists_watch(
        &self,
        path: &str,
    ) -> Result<(Option<NodeStat>, oneshot::Receiver<WatchEvent>)> {
        self.check_session()?;
        let mut tree = self.lock()?;
        let stat = tree.nodes.get(path).map(stat_of);
        let (tx, rx) = oneshot::channel();
        tree.exists_watches
            .entry(path.to_string())
            .or_default()
            .push(WatchRegistration {
                session: self.session.id,
                tx,
            });
        Ok((stat, rx))
    }

    async fn get(&self, path: &str) -> Result<(Bytes, NodeStat)> {
        self.check_session()?;
        let tree = self.lock()?;
        tree.nodes
            .get(path)
            .map(|n| (n.data.clone(), stat_of(n)))
            .ok_or_else(|| CoordError::NoNode(path.to_string()))
    }

    async fn set(&self, path: &str, data: Bytes, expected_version: i64) -> Result<NodeStat> {
        self.check_session()?;
        let mut tree = self.lock()?;
        let node = tree
            .nodes
            .get_mut(path)
            .ok_or_else(|| CoordError::NoNode(path.to_string()))?;
        if node.version != expected_version {
            return Err(CoordError::BadVersion {
                path: path.to_string(),
            });
        }
        node.version += 1;
        node.data = data;
        let stat = stat_of(node);
        tree.fire_exists(path, WatchEventKind::NodeDataChanged);
        Ok(stat)
    }

    async fn children(&self, path: &str) -> Result<Vec<String>> {
        self.check_session()?;
        let tree = self.lock()?;
        if path != "/" && !tree.nodes.contains_key(path) {
            return Err(CoordError::NoNode(path.to_string()));
        }
        Ok(tree.direct_children(path))
    }

    async fn children_watch(
        &self,
        path: &str,
    ) -> Result<(Vec<String>, oneshot::Receiver<WatchEvent>)> {
        self.check_session()?;
        let mut tree = self.lock()?;
        if path != "/" && !tree.nodes.contains_key(path) {
            return Err(CoordError::NoNode(path.to_string()));
        }
        let names = tree.direct_children(path);
        let (tx, rx) = oneshot::channel();
        tree.child_watches
            .entry(path.to_string())
            .or_default()
            .push(WatchRegistration {
                session: self.session.id,
                tx,
            });
        Ok((names, rx))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.check_session()?;
        let mut tree = self.lock()?;
        if !tree.nodes.contains_key(path) {
            return Err(CoordError::NoNode(path.to_string()));
        }
        if tree.has_children(path) {
            return Err(CoordError::other(format!("node has children: {path}")));
        }
        tree.remove_node(path);
        Ok(())
    }

    fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.session.state_tx.subscribe()
    }

    async fn block_until_connected(&self, timeout: Duration) -> bool {
        let mut rx = self.session.state_tx.subscribe();
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
        self.session.started.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        self.session.started.store(false, Ordering::SeqCst);
        let _ = self.session.state_tx.send(ConnectionState::Lost);
        let mut tree = self.lock()?;
        tree.end_session(self.session.id);
        Ok(())
    }
}
