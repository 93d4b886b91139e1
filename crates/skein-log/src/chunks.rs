//! Typed chunk storage.
//!
//! Chunks are immutable single-payload artifacts addressed by
//! `(kind, id)` — except task descriptors, which are two-level
//! `(job, task)`, and `ChunkKind::Chunk`, which additionally supports a
//! version-matched CAS force-write. Write and read dispatch over the kind
//! table in `skein_core::namespace`; every operation emits a kind-derived
//! monitoring event.

use std::time::Instant;

use serde_json::Value;
use skein_core::{ChunkKind, CoordError, CreateMode, MonitoringEvent, WriteStrategy};

use crate::backend::LogContext;
use crate::error::{Result, guard, guard_err};

/// Writes and reads typed artifacts under per-kind subtrees.
pub struct ChunkStore {
    ctx: LogContext,
}

impl ChunkStore {
    pub(crate) fn new(ctx: LogContext) -> Self {
        Self { ctx }
    }

    /// Writes an artifact of the given kind.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::NodeExists`] if the artifact already exists,
    /// and an error for [`ChunkKind::Task`] (use
    /// [`ChunkStore::write_task_chunk`]) or the read-side kinds, whose
    /// writes go through the origin manager and bootstrap.
    pub async fn write_chunk(&self, kind: ChunkKind, id: &str, value: &Value) -> Result<()> {
        match kind {
            ChunkKind::Task => {
                return Err(guard_err(CoordError::other(
                    "task chunks take a job and task id; use write_task_chunk",
                )));
            }
            ChunkKind::Origin | ChunkKind::LogParameters => {
                return Err(guard_err(CoordError::other(format!(
                    "{kind} is not writable through the chunk store"
                ))));
            }
            _ => {}
        }

        let start = Instant::now();
        let bytes = self.ctx.encode_value(value)?;
        let len = bytes.len();
        let path = kind.path(&self.ctx.paths, id, None);

        match kind.write_strategy() {
            WriteStrategy::Create => {
                guard(
                    self.ctx
                        .client
                        .create(&path, Some(bytes), CreateMode::Persistent)
                        .await,
                )?;
            }
            WriteStrategy::CreateAll | WriteStrategy::ForceCas => {
                guard(self.ctx.client.create_all(&path, Some(bytes)).await)?;
            }
        }

        self.ctx.sink.emit(
            MonitoringEvent::new(kind.write_event(), start.elapsed())
                .with_bytes(len)
                .with_id(id),
        );
        Ok(())
    }

    /// Writes a task descriptor under its job.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::NodeExists`] if the descriptor already exists.
    pub async fn write_task_chunk(&self, job_id: &str, task_id: &str, value: &Value) -> Result<()> {
        let start = Instant::now();
        let bytes = self.ctx.encode_value(value)?;
        let len = bytes.len();
        let path = self.ctx.paths.task(job_id, task_id);

        guard(self.ctx.client.create_all(&path, Some(bytes)).await)?;

        self.ctx.sink.emit(
            MonitoringEvent::new(ChunkKind::Task.write_event(), start.elapsed())
                .with_bytes(len)
                .with_id(format!("{job_id}/{task_id}")),
        );
        Ok(())
    }

    /// Reads an artifact of the given kind.
    ///
    /// For the read-side kinds (`Origin`, `LogParameters`) the id is ignored
    /// and may be empty.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::NoNode`] if the artifact does not exist, and an
    /// error for [`ChunkKind::Task`] (use [`ChunkStore::read_task_chunk`]).
    pub async fn read_chunk(&self, kind: ChunkKind, id: &str) -> Result<Value> {
        if kind == ChunkKind::Task {
            return Err(guard_err(CoordError::other(
                "task chunks take a job and task id; use read_task_chunk",
            )));
        }

        let start = Instant::now();
        let path = kind.path(&self.ctx.paths, id, None);
        let (bytes, _) = guard(self.ctx.client.get(&path).await)?;
        let value = self.ctx.decode_value(&bytes)?;

        self.ctx.sink.emit(
            MonitoringEvent::new(kind.read_event(), start.elapsed()).with_id(id),
        );
        Ok(value)
    }

    /// Reads a task descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::NoNode`] if the descriptor does not exist.
    pub async fn read_task_chunk(&self, job_id: &str, task_id: &str) -> Result<Value> {
        let start = Instant::now();
        let path = self.ctx.paths.task(job_id, task_id);
        let (bytes, _) = guard(self.ctx.client.get(&path).await)?;
        let value = self.ctx.decode_value(&bytes)?;

        self.ctx.sink.emit(
            MonitoringEvent::new(ChunkKind::Task.read_event(), start.elapsed())
                .with_id(format!("{job_id}/{task_id}")),
        );
        Ok(value)
    }

    /// Force-writes a `ChunkKind::Chunk` artifact: creates it if absent,
    /// otherwise replaces it with a version-matched set.
    ///
    /// `BadVersion` from a concurrent force-write is propagated; retrying is
    /// the caller's responsibility.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::BadVersion`] if a concurrent writer raced this
    /// one, or any other storage failure.
    pub async fn force_write_chunk(&self, id: &str, value: &Value) -> Result<()> {
        let start = Instant::now();
        let bytes = self.ctx.encode_value(value)?;
        let len = bytes.len();
        let path = self.ctx.paths.chunk(id);

        match guard(self.ctx.client.exists(&path).await)? {
            None => {
                guard(self.ctx.client.create_all(&path, Some(bytes)).await)?;
            }
            Some(stat) => {
                guard(self.ctx.client.set(&path, bytes, stat.version).await)?;
            }
        }

        self.ctx.sink.emit(
            MonitoringEvent::new("force_write_chunk", start.elapsed())
                .with_bytes(len)
                .with_id(id),
        );
        Ok(())
    }
}
