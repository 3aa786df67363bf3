//! The buffer engine: a bounded record queue with periodic, backpressure and shutdown flushes.
//!
//! Records arrive from any number of threads through [`Engine::enqueue`] (usually via a
//! [`Tracer`]). They stay in a bounded FIFO queue until one of four triggers drains it:
//!
//! - the periodic task, every `flush_interval`
//! - an explicit [`Engine::flush`]
//! - an enqueue that finds the queue full (backpressure)
//! - [`Engine::shutdown`], or dropping the engine with `flush_on_exit` set
//!
//! Only one flush runs at a time. A drained batch goes to every sink in registration order; a
//! failing sink is logged and skipped, the batch is never re-queued.

mod flusher;
mod metadata;
mod shared;

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::level_filters::LevelFilter;

pub use self::metadata::EngineMetadata;
pub(crate) use self::shared::Shared;

use self::flusher::Flusher;
use crate::config::{ConfigError, EngineConfig};
use crate::instrument::Tracer;
use crate::log::diag;
use crate::sink::Sink;
use crate::Record;

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

/// Error returned by engine construction and sink registration.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The configuration did not validate.
    #[error("invalid engine configuration")]
    Config(#[from] ConfigError),

    /// The periodic flush thread could not be started.
    #[error("failed to start the periodic flush task")]
    SpawnFlusher(#[source] io::Error),

    /// The same sink instance was registered twice.
    #[error("sink {0} is already registered")]
    DuplicateSink(String),

    /// The engine no longer accepts sinks.
    #[error("the engine has been shut down")]
    ShutDown,
}

/// What caused a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlushTrigger {
    /// [`Engine::flush`] was called.
    Manual,
    /// The periodic task woke up.
    Periodic,
    /// An enqueue found the queue full.
    Backpressure,
    /// The engine is shutting down.
    Shutdown,
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Manual => "manual",
            Self::Periodic => "periodic",
            Self::Backpressure => "backpressure",
            Self::Shutdown => "shutdown",
        })
    }
}

/// Summary of one flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    /// What started the flush.
    pub trigger: FlushTrigger,
    /// Records drained into the batch.
    pub records: usize,
    /// Sinks that accepted the batch.
    pub sinks_succeeded: usize,
    /// Sinks that failed or panicked.
    pub sinks_failed: usize,
}

impl FlushReport {
    fn empty(trigger: FlushTrigger) -> Self {
        Self {
            trigger,
            records: 0,
            sinks_succeeded: 0,
            sinks_failed: 0,
        }
    }

    /// Whether the queue was empty, in which case no sink was called.
    pub fn is_empty(&self) -> bool {
        self.records == 0
    }
}

/// The buffer engine.
///
/// Created with [`Engine::builder`]. The periodic flush task starts immediately. Share the engine
/// between threads behind an `Arc`, or hand out [`Tracer`]s which only need `&self`.
///
/// Dropping the engine shuts it down: with `flush_on_exit` set (the default) this performs a
/// final flush first, otherwise buffered records are discarded.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
///
/// use callspool::{Engine, call_site};
/// use callspool::sink::MemorySink;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let (sink, received) = MemorySink::new();
/// let engine = Engine::builder()
///     .max_queue_size(100)
///     .flush_interval(Duration::from_secs(1))
///     .sink(sink)
///     .build()?;
///
/// let tracer = engine.tracer("alice");
/// let sum = tracer.call(call_site!("sum"), || 1 + 2);
/// assert_eq!(sum, 3);
///
/// engine.shutdown();
/// assert_eq!(received.records().len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Engine {
    shared: Arc<Shared>,
    flusher: Mutex<Option<Flusher>>,
}

impl Engine {
    /// Returns a builder with default configuration and no sinks.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Starts an engine from `config` delivering to `sinks`.
    pub fn new(
        config: EngineConfig,
        sinks: impl IntoIterator<Item = Arc<dyn Sink>>,
    ) -> Result<Self, EngineError> {
        Self::start(config, sinks.into_iter().collect())
    }

    fn start(config: EngineConfig, sinks: Vec<Arc<dyn Sink>>) -> Result<Self, EngineError> {
        config.validate()?;
        if let Some(sink) = first_duplicate(&sinks) {
            return Err(EngineError::DuplicateSink(format!("{sink:?}")));
        }

        let id = NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed);
        let level = config.log_level;
        let shared = Arc::new(Shared::new(id, config, sinks));
        let flusher = Flusher::spawn(shared.clone()).map_err(EngineError::SpawnFlusher)?;

        diag!(
            level,
            DEBUG,
            engine = id,
            max_queue_size = shared.config.max_queue_size,
            flush_interval = ?shared.config.flush_interval,
            sinks = shared.sink_count(),
            "engine started"
        );

        Ok(Self {
            shared,
            flusher: Mutex::new(Some(flusher)),
        })
    }

    /// Returns a tracer that records calls on behalf of `actor_id`.
    pub fn tracer(&self, actor_id: impl Into<Arc<str>>) -> Tracer {
        Tracer::new(actor_id.into(), self.shared.clone())
    }

    /// Buffers a record built elsewhere.
    ///
    /// Never blocks on sink I/O unless the queue is full, in which case it flushes synchronously
    /// once and drops the record if there is still no room.
    pub fn enqueue(&self, record: Record) {
        self.shared.enqueue(record);
    }

    /// Drains the queue and dispatches the batch to every sink.
    ///
    /// Waits for a flush already in progress instead of running alongside it.
    pub fn flush(&self) -> FlushReport {
        self.shared.flush(FlushTrigger::Manual)
    }

    /// Registers another sink; it receives every batch flushed from now on.
    ///
    /// Registering the same `Arc` twice, or registering after shutdown, is an error.
    pub fn add_sink(&self, sink: Arc<dyn Sink>) -> Result<(), EngineError> {
        self.shared.add_sink(sink)
    }

    /// Returns a snapshot of the engine's configuration and state.
    pub fn metadata(&self) -> EngineMetadata {
        let shared = &self.shared;
        let counters = &shared.counters;
        let flusher_alive = self
            .flusher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(Flusher::is_alive);

        EngineMetadata {
            id: shared.id,
            max_queue_size: shared.config.max_queue_size,
            flush_interval: shared.config.flush_interval,
            flush_on_exit: shared.config.flush_on_exit,
            sink_count: shared.sink_count(),
            queue_depth: shared.queue_depth(),
            flusher_alive,
            shut_down: shared.is_shut_down(),
            records_enqueued: counters.enqueued.load(Ordering::Relaxed),
            records_dropped: counters.dropped.load(Ordering::Relaxed),
            records_rejected: counters.rejected.load(Ordering::Relaxed),
            batches_flushed: counters.batches.load(Ordering::Relaxed),
            sink_failures: counters.sink_failures.load(Ordering::Relaxed),
        }
    }

    /// Flushes one last time, then stops the periodic task and waits for it to exit.
    ///
    /// Only the first call does anything. Records enqueued afterwards are rejected.
    pub fn shutdown(&self) {
        if !self.shared.begin_shutdown() {
            return;
        }

        let level = self.shared.config.log_level;
        diag!(
            level,
            INFO,
            engine = self.shared.id,
            "shutting down, flushing the queue for one last time"
        );
        self.shared.close();
        self.shared.flush(FlushTrigger::Shutdown);
        self.stop_flusher();
        diag!(
            level,
            DEBUG,
            engine = self.shared.id,
            "periodic flush task has been stopped"
        );
    }

    fn stop_flusher(&self) {
        let flusher = self
            .flusher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(flusher) = flusher {
            flusher.stop(self.shared.config.log_level);
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.shared.config.flush_on_exit {
            self.shutdown();
            return;
        }

        if self.shared.begin_shutdown() {
            self.stop_flusher();
            let pending = self.shared.queue_depth();
            if pending > 0 {
                diag!(
                    self.shared.config.log_level,
                    WARN,
                    engine = self.shared.id,
                    pending,
                    "engine dropped without flush_on_exit, discarding buffered records"
                );
            }
        }
    }
}

fn first_duplicate(sinks: &[Arc<dyn Sink>]) -> Option<&Arc<dyn Sink>> {
    sinks.iter().enumerate().find_map(|(index, sink)| {
        sinks[..index]
            .iter()
            .any(|earlier| Arc::ptr_eq(earlier, sink))
            .then_some(sink)
    })
}

/// Builder for an [`Engine`].
///
/// Starts from [`EngineConfig::default`]; every parameter is validated by
/// [`build`](EngineBuilder::build).
#[derive(Debug, Default)]
#[must_use]
pub struct EngineBuilder {
    config: EngineConfig,
    sinks: Vec<Arc<dyn Sink>>,
}

impl EngineBuilder {
    /// Starts from an existing configuration, e.g. one loaded with [`EngineConfig::load`].
    pub fn from_config(config: EngineConfig) -> Self {
        Self {
            config,
            sinks: Vec::new(),
        }
    }

    /// Sets the maximum number of buffered records.
    pub fn max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.config.max_queue_size = max_queue_size;
        self
    }

    /// Sets the time between periodic flushes.
    pub fn flush_interval(mut self, flush_interval: Duration) -> Self {
        self.config.flush_interval = flush_interval;
        self
    }

    /// Sets whether dropping the engine performs a final flush.
    pub fn flush_on_exit(mut self, flush_on_exit: bool) -> Self {
        self.config.flush_on_exit = flush_on_exit;
        self
    }

    /// Caps the verbosity of the engine's own diagnostics.
    pub fn log_level(mut self, log_level: LevelFilter) -> Self {
        self.config.log_level = log_level;
        self
    }

    /// Sets how many characters of a result summary are kept, 0 disables summaries.
    pub fn summary_limit(mut self, summary_limit: usize) -> Self {
        self.config.summary_limit = summary_limit;
        self
    }

    /// Adds a sink.
    pub fn sink(self, sink: impl Sink + 'static) -> Self {
        self.shared_sink(Arc::new(sink))
    }

    /// Adds a sink that is also referenced elsewhere.
    pub fn shared_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Validates the configuration and starts the engine.
    pub fn build(self) -> Result<Engine, EngineError> {
        Engine::start(self.config, self.sinks)
    }
}
