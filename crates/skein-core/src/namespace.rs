//! Namespace layout for the coordination log.
//!
//! This module is the single source of truth for every path the backend
//! touches. All paths derive from the tenancy prefix `/onyx/<tenancy-id>`;
//! no hardcoded path strings should exist outside this module.
//!
//! # Layout
//!
//! ```text
//! /onyx/<tenancy-id>/
//! ├── log/entry-<N>                 # append-only log, sequential suffixes
//! ├── pulse/<peer-id>               # ephemeral liveness markers
//! ├── origin/origin                 # CAS'd replica snapshot
//! ├── log-parameters/log-parameters # cluster-wide parameters
//! ├── job-hash/<id> … exception/<id># single-payload artifacts
//! ├── task/<job-id>/<task-id>       # per-job task descriptors
//! └── chunk/<id>/chunk              # CAS-able chunks
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoordError, Result};

/// Root of every tenancy subtree.
pub const NAMESPACE_ROOT: &str = "/onyx";

/// Name prefix for sequential log entry nodes.
pub const ENTRY_PREFIX: &str = "entry-";

/// A validated tenancy identifier.
///
/// Forms the namespace prefix isolating one cluster instance; isolation is
/// path prefixing only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tenancy(String);

impl Tenancy {
    /// Creates a tenancy id after validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is empty or contains path separators or
    /// control characters.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(CoordError::InvalidId {
                message: "tenancy id cannot be empty".to_string(),
            });
        }
        if id.contains('/') || id.contains('\\') {
            return Err(CoordError::InvalidId {
                message: format!("tenancy id '{id}' cannot contain path separators"),
            });
        }
        if id.chars().any(char::is_control) {
            return Err(CoordError::InvalidId {
                message: "tenancy id cannot contain control characters".to_string(),
            });
        }
        Ok(Self(id))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tenancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a chunk kind's nodes are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStrategy {
    /// Single create; the parent root exists after bootstrap.
    Create,
    /// Create with intermediate parents, for two-level paths.
    CreateAll,
    /// Create-all for plain writes, plus version-matched CAS force-writes.
    ForceCas,
}

/// Typed artifact kinds stored under per-kind subtrees.
///
/// `Origin` and `LogParameters` are read-side kinds: their writes go through
/// the origin manager and bootstrap rather than the chunk store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkKind {
    /// Job content hashes.
    JobHash,
    /// Job catalogs.
    Catalog,
    /// Workflow definitions.
    Workflow,
    /// Flow conditions.
    Flow,
    /// Lifecycle definitions.
    Lifecycles,
    /// Window definitions.
    Windows,
    /// Trigger definitions.
    Triggers,
    /// Job metadata.
    JobMetadata,
    /// Recorded exceptions.
    Exception,
    /// Per-job task descriptors (two-level paths).
    Task,
    /// CAS-able chunks.
    Chunk,
    /// The replica origin snapshot (read-side).
    Origin,
    /// Cluster-wide log parameters (read-side).
    LogParameters,
}

impl ChunkKind {
    /// Returns the subtree name for this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::JobHash => "job-hash",
            Self::Catalog => "catalog",
            Self::Workflow => "workflow",
            Self::Flow => "flow",
            Self::Lifecycles => "lifecycles",
            Self::Windows => "windows",
            Self::Triggers => "triggers",
            Self::JobMetadata => "job-metadata",
            Self::Exception => "exception",
            Self::Task => "task",
            Self::Chunk => "chunk",
            Self::Origin => "origin",
            Self::LogParameters => "log-parameters",
        }
    }

    /// Returns the write strategy for this kind.
    #[must_use]
    pub const fn write_strategy(&self) -> WriteStrategy {
        match self {
            Self::Task => WriteStrategy::CreateAll,
            Self::Chunk => WriteStrategy::ForceCas,
            _ => WriteStrategy::Create,
        }
    }

    /// Returns the monitoring event name for writes of this kind.
    #[must_use]
    pub const fn write_event(&self) -> &'static str {
        match self {
            Self::JobHash => "write_job_hash",
            Self::Catalog => "write_catalog",
            Self::Workflow => "write_workflow",
            Self::Flow => "write_flow",
            Self::Lifecycles => "write_lifecycles",
            Self::Windows => "write_windows",
            Self::Triggers => "write_triggers",
            Self::JobMetadata => "write_job_metadata",
            Self::Exception => "write_exception",
            Self::Task => "write_task",
            Self::Chunk => "write_chunk",
            Self::Origin => "write_origin",
            Self::LogParameters => "write_log_parameters",
        }
    }

    /// Returns the monitoring event name for reads of this kind.
    #[must_use]
    pub const fn read_event(&self) -> &'static str {
        match self {
            Self::JobHash => "read_job_hash",
            Self::Catalog => "read_catalog",
            Self::Workflow => "read_workflow",
            Self::Flow => "read_flow",
            Self::Lifecycles => "read_lifecycles",
            Self::Windows => "read_windows",
            Self::Triggers => "read_triggers",
            Self::JobMetadata => "read_job_metadata",
            Self::Exception => "read_exception",
            Self::Task => "read_task",
            Self::Chunk => "read_chunk",
            Self::Origin => "read_origin",
            Self::LogParameters => "read_log_parameters",
        }
    }

    /// Returns all kinds.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::JobHash,
            Self::Catalog,
            Self::Workflow,
            Self::Flow,
            Self::Lifecycles,
            Self::Windows,
            Self::Triggers,
            Self::JobMetadata,
            Self::Exception,
            Self::Task,
            Self::Chunk,
            Self::Origin,
            Self::LogParameters,
        ]
    }

    /// Builds the node path for an artifact of this kind.
    ///
    /// `sub_id` applies to [`ChunkKind::Task`] only (the task id under a job).
    /// `Origin` and `LogParameters` have fixed paths and ignore `id`.
    #[must_use]
    pub fn path(&self, paths: &NamespacePaths, id: &str, sub_id: Option<&str>) -> String {
        match self {
            Self::Task => match sub_id {
                Some(task) => paths.task(id, task),
                None => paths.task_job(id),
            },
            Self::Chunk => paths.chunk(id),
            Self::Origin => paths.origin(),
            Self::LogParameters => paths.log_parameters(),
            _ => format!("{}/{id}", paths.kind_root(*self)),
        }
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical path generator for one tenancy's subtree.
#[derive(Debug, Clone)]
pub struct NamespacePaths {
    prefix: String,
}

impl NamespacePaths {
    /// Creates the path generator for a tenancy.
    #[must_use]
    pub fn new(tenancy: &Tenancy) -> Self {
        Self {
            prefix: format!("{NAMESPACE_ROOT}/{tenancy}"),
        }
    }

    /// Returns the tenancy prefix, `/onyx/<tenancy-id>`.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the log root.
    #[must_use]
    pub fn log_root(&self) -> String {
        format!("{}/log", self.prefix)
    }

    /// Returns the creation path for a new log entry: the log root plus the
    /// `entry-` name prefix the service appends a sequential suffix to.
    #[must_use]
    pub fn log_entry_prefix(&self) -> String {
        format!("{}/{ENTRY_PREFIX}", self.log_root())
    }

    /// Returns the path of the log entry at `position`.
    ///
    /// Positions are non-negative everywhere the log hands them out; the
    /// cursor type is signed only because the origin starts at `-1`.
    #[must_use]
    pub fn log_entry(&self, position: i64) -> String {
        let id = pad_sequential_id(u64::try_from(position).unwrap_or_default());
        format!("{}/{ENTRY_PREFIX}{id}", self.log_root())
    }

    /// Returns the pulse root.
    #[must_use]
    pub fn pulse_root(&self) -> String {
        format!("{}/pulse", self.prefix)
    }

    /// Returns the pulse node path for a peer.
    #[must_use]
    pub fn pulse(&self, peer_id: &str) -> String {
        format!("{}/{peer_id}", self.pulse_root())
    }

    /// Returns the origin subtree root.
    #[must_use]
    pub fn origin_root(&self) -> String {
        format!("{}/origin", self.prefix)
    }

    /// Returns the origin snapshot node path.
    #[must_use]
    pub fn origin(&self) -> String {
        format!("{}/origin", self.origin_root())
    }

    /// Returns the log-parameters subtree root.
    #[must_use]
    pub fn log_parameters_root(&self) -> String {
        format!("{}/log-parameters", self.prefix)
    }

    /// Returns the log-parameters node path.
    #[must_use]
    pub fn log_parameters(&self) -> String {
        format!("{}/log-parameters", self.log_parameters_root())
    }

    /// Returns the subtree root for a chunk kind.
    #[must_use]
    pub fn kind_root(&self, kind: ChunkKind) -> String {
        format!("{}/{}", self.prefix, kind.as_str())
    }

    /// Returns the job-level directory for task descriptors.
    #[must_use]
    pub fn task_job(&self, job_id: &str) -> String {
        format!("{}/task/{job_id}", self.prefix)
    }

    /// Returns the path of one task descriptor.
    #[must_use]
    pub fn task(&self, job_id: &str, task_id: &str) -> String {
        format!("{}/{task_id}", self.task_job(job_id))
    }

    /// Returns the path of a CAS-able chunk.
    #[must_use]
    pub fn chunk(&self, id: &str) -> String {
        format!("{}/chunk/{id}/chunk", self.prefix)
    }

    /// Returns every subtree root the bootstrap must create.
    #[must_use]
    pub fn bootstrap_roots(&self) -> Vec<String> {
        let mut roots = vec![self.log_root(), self.pulse_root()];
        for kind in ChunkKind::all() {
            roots.push(self.kind_root(*kind));
        }
        roots
    }
}

/// Formats a non-negative position as a 10-digit zero-padded sequential id.
///
/// Positions at or above 10^10 render unpadded at their natural width; below
/// that bound the padding keeps lexicographic order equal to numeric order.
#[must_use]
pub fn pad_sequential_id(position: u64) -> String {
    format!("{position:010}")
}

/// Parses the position out of a log entry child name (`entry-<digits>`).
#[must_use]
pub fn parse_position(name: &str) -> Option<i64> {
    name.strip_prefix(ENTRY_PREFIX)?.parse().ok()
}
