//! Log entry writer.
//!
//! Appending is a single sequential create under the log root: ordering is
//! entirely delegated to the coordination service's sequential-node
//! semantics, so there is no in-process coordination between writers.

use std::time::Instant;

use serde_json::Value;
use skein_core::{CoordError, CreateMode, MonitoringEvent, parse_position};

use crate::backend::LogContext;
use crate::error::{Result, guard, guard_err};

/// Appends opaque entries to the log.
pub struct LogWriter {
    ctx: LogContext,
}

impl LogWriter {
    pub(crate) fn new(ctx: LogContext) -> Self {
        Self { ctx }
    }

    /// Appends an entry and returns its assigned position.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the create is rejected.
    pub async fn write_log_entry(&self, value: &Value) -> Result<i64> {
        let start = Instant::now();
        let bytes = self.ctx.encode_value(value)?;
        let len = bytes.len();

        let created = guard(
            self.ctx
                .client
                .create(
                    &self.ctx.paths.log_entry_prefix(),
                    Some(bytes),
                    CreateMode::PersistentSequential,
                )
                .await,
        )?;

        let name = created.rsplit('/').next().unwrap_or(&created);
        let position = parse_position(name).ok_or_else(|| {
            guard_err(CoordError::other(format!(
                "unparseable entry path: {created}"
            )))
        })?;

        self.ctx.sink.emit(
            MonitoringEvent::new("write_log_entry", start.elapsed())
                .with_bytes(len)
                .with_position(position),
        );
        Ok(position)
    }
}
