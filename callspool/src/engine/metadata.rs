use std::time::Duration;

use serde::Serialize;
use serde_with::{DurationSecondsWithFrac, serde_as};

/// Read-only snapshot of an engine's configuration and state.
///
/// Returned by [`Engine::metadata`](crate::Engine::metadata).
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineMetadata {
    /// Process-unique engine number, also attached to every diagnostic event as `engine`.
    pub id: u64,
    /// Maximum number of buffered records.
    pub max_queue_size: usize,
    /// Time between periodic flushes.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub flush_interval: Duration,
    /// Whether dropping the engine flushes.
    pub flush_on_exit: bool,
    /// Number of registered sinks.
    pub sink_count: usize,
    /// Records currently buffered.
    pub queue_depth: usize,
    /// Whether the periodic flush task is still running.
    pub flusher_alive: bool,
    /// Whether shutdown has begun.
    pub shut_down: bool,
    /// Records accepted into the queue so far.
    pub records_enqueued: u64,
    /// Records dropped because the queue stayed full.
    pub records_dropped: u64,
    /// Records refused because the engine was shut down.
    pub records_rejected: u64,
    /// Non-empty batches dispatched.
    pub batches_flushed: u64,
    /// Failed or panicked sink exports.
    pub sink_failures: u64,
}
