//! Monitoring events for storage operations.
//!
//! Every storage operation emits one [`MonitoringEvent`] describing what ran
//! and how long it took. Consumers of the stream are outside the core: the
//! backend only calls [`EventSink::emit`]. The shipped [`MetricsSink`]
//! forwards to the `metrics` crate; [`ChannelSink`] captures events for
//! assertions in tests.

use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use tokio::sync::mpsc;

/// One storage operation, as reported to the monitoring stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoringEvent {
    /// Symbolic operation name, e.g. `write_log_entry`.
    pub event: &'static str,
    /// Wall-clock duration of the operation.
    pub latency: Duration,
    /// Payload size, for operations that carry one.
    pub bytes: Option<usize>,
    /// Artifact id, for chunk operations.
    pub id: Option<String>,
    /// Log position, for entry and origin operations.
    pub position: Option<i64>,
}

impl MonitoringEvent {
    /// Creates an event with the given name and latency.
    #[must_use]
    pub fn new(event: &'static str, latency: Duration) -> Self {
        Self {
            event,
            latency,
            bytes: None,
            id: None,
            position: None,
        }
    }

    /// Attaches a payload size.
    #[must_use]
    pub fn with_bytes(mut self, bytes: usize) -> Self {
        self.bytes = Some(bytes);
        self
    }

    /// Attaches an artifact id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Attaches a log position.
    #[must_use]
    pub fn with_position(mut self, position: i64) -> Self {
        self.position = Some(position);
        self
    }
}

/// Receives monitoring events from storage operations.
pub trait EventSink: Send + Sync {
    /// Consumes one event. Must not block.
    fn emit(&self, event: MonitoringEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: MonitoringEvent) {}
}

/// Storage operations counter.
pub const STORAGE_OPERATIONS: &str = "skein_storage_operations_total";

/// Storage operation latency histogram.
pub const STORAGE_LATENCY: &str = "skein_storage_operation_duration_seconds";

/// Storage payload bytes counter.
pub const STORAGE_BYTES: &str = "skein_storage_bytes_total";

/// Registers metric descriptions.
///
/// Call once at application startup after installing the metrics recorder.
pub fn register_metrics() {
    describe_counter!(STORAGE_OPERATIONS, "Total storage operations by event");
    describe_histogram!(
        STORAGE_LATENCY,
        "Duration of storage operations in seconds"
    );
    describe_counter!(STORAGE_BYTES, "Total payload bytes written by event");
}

/// Forwards events to the `metrics` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSink;

impl EventSink for MetricsSink {
    fn emit(&self, event: MonitoringEvent) {
        counter!(STORAGE_OPERATIONS, "event" => event.event).increment(1);
        histogram!(STORAGE_LATENCY, "event" => event.event)
            .record(event.latency.as_secs_f64());
        if let Some(bytes) = event.bytes {
            counter!(STORAGE_BYTES, "event" => event.event).increment(bytes as u64);
        }
        tracing::trace!(
            event = event.event,
            latency_us = event.latency.as_micros() as u64,
            bytes = event.bytes.map(|b| b as u64),
            id = event.id.as_deref(),
            position = event.position,
            "storage operation"
        );
    }
}

/// Sends events onto an unbounded channel, for test assertions.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<MonitoringEvent>,
}

impl ChannelSink {
    /// Creates a sink and the receiver draining it.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MonitoringEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: MonitoringEvent) {
        let _ = self.tx.send(event);
    }
}
