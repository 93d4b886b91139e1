//! Log entry garbage collection.
//!
//! Deletion is by position. Callers must advance the origin snapshot past
//! the position first; subscribers parked at a collected position recover
//! through the re-seek protocol.

use std::time::Instant;

use skein_core::MonitoringEvent;

use crate::backend::LogContext;
use crate::error::{Result, guard};

/// Deletes log entries that have been folded into the origin snapshot.
pub struct LogGc {
    ctx: LogContext,
}

impl LogGc {
    pub(crate) fn new(ctx: LogContext) -> Self {
        Self { ctx }
    }

    /// Deletes the entry at `position`.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry does not exist or the delete fails.
    pub async fn gc_log_entry(&self, position: i64) -> Result<()> {
        let start = Instant::now();
        guard(self.ctx.client.delete(&self.ctx.paths.log_entry(position)).await)?;
        self.ctx.sink.emit(
            MonitoringEvent::new("gc_log_entry", start.elapsed()).with_position(position),
        );
        Ok(())
    }
}
