//! State shared between the engine handle, its tracers and the periodic flusher.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, ThreadId};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::{EngineError, FlushReport, FlushTrigger};
use crate::config::EngineConfig;
use crate::instrument::panic_message;
use crate::log::diag;
use crate::sink::{ExportError, Sink};
use crate::Record;

#[derive(Debug, Default)]
pub(super) struct Counters {
    pub(super) enqueued: AtomicU64,
    pub(super) dropped: AtomicU64,
    pub(super) rejected: AtomicU64,
    pub(super) batches: AtomicU64,
    pub(super) sink_failures: AtomicU64,
}

/// The queue, the sink list and the counters of one engine.
///
/// The receiver mutex doubles as the flush lock: whoever holds it drains and dispatches, every
/// other flush waits. `flushing` names the thread holding it, so a sink that enqueues or flushes
/// from inside `export` never tries to take it a second time.
pub(crate) struct Shared {
    pub(crate) id: u64,
    pub(crate) config: EngineConfig,
    pub(super) sender: mpsc::Sender<Record>,
    receiver: Mutex<mpsc::Receiver<Record>>,
    flushing: Mutex<Option<ThreadId>>,
    sinks: RwLock<Vec<Arc<dyn Sink>>>,
    shutdown: AtomicBool,
    pub(super) counters: Counters,
}

// Sinks may hold tracers pointing back here, so the sink list is never formatted.
impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("id", &self.id)
            .field("max_queue_size", &self.config.max_queue_size)
            .field("sink_count", &self.sinks.try_read().map(|sinks| sinks.len()).ok())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

impl Shared {
    pub(super) fn new(id: u64, config: EngineConfig, sinks: Vec<Arc<dyn Sink>>) -> Self {
        let (sender, receiver) = mpsc::channel(config.max_queue_size);
        Self {
            id,
            config,
            sender,
            receiver: Mutex::new(receiver),
            flushing: Mutex::new(None),
            sinks: RwLock::new(sinks),
            shutdown: AtomicBool::new(false),
            counters: Counters::default(),
        }
    }

    /// Buffers `record`, flushing synchronously once if the queue is full.
    ///
    /// Never fails: a record that still does not fit after the flush is dropped and logged.
    pub(crate) fn enqueue(&self, record: Record) {
        let level = self.config.log_level;

        if self.is_shut_down() {
            self.reject(&record);
            return;
        }

        let record = match self.sender.try_send(record) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                diag!(level, TRACE, engine = self.id, "record added to queue");
                return;
            }
            Err(TrySendError::Full(record)) => record,
            Err(TrySendError::Closed(record)) => {
                self.reject(&record);
                return;
            }
        };

        // A sink refilling the queue from inside `export` already holds the flush lock.
        if self.is_flushing_thread() {
            self.drop_record(&record);
            return;
        }

        diag!(
            level,
            WARN,
            engine = self.id,
            capacity = self.config.max_queue_size,
            "queue is full, flushing synchronously"
        );
        self.flush(FlushTrigger::Backpressure);

        match self.sender.try_send(record) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(record)) => self.drop_record(&record),
            Err(TrySendError::Closed(record)) => self.reject(&record),
        }
    }

    fn reject(&self, record: &Record) {
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        diag!(
            self.config.log_level,
            WARN,
            engine = self.id,
            unit = record.unit_name(),
            "engine is shut down, rejecting record"
        );
    }

    fn drop_record(&self, record: &Record) {
        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        diag!(
            self.config.log_level,
            ERROR,
            engine = self.id,
            actor = record.actor_id(),
            unit = record.unit_name(),
            "queue is still full after flushing, dropping record"
        );
    }

    /// Drains the records present right now and hands them to every sink.
    ///
    /// Called from inside a sink's `export` this returns an empty report, the batch being
    /// dispatched already owns the queue.
    pub(crate) fn flush(&self, trigger: FlushTrigger) -> FlushReport {
        let level = self.config.log_level;
        if self.is_flushing_thread() {
            diag!(
                level,
                DEBUG,
                engine = self.id,
                %trigger,
                "flush requested while dispatching, skipping"
            );
            return FlushReport::empty(trigger);
        }

        let mut receiver = self.receiver.lock().unwrap_or_else(PoisonError::into_inner);
        diag!(level, DEBUG, engine = self.id, %trigger, "flushing the queue");

        // Bounded by the length at drain start so producers cannot keep this loop alive.
        let pending = receiver.len();
        let mut batch = Vec::with_capacity(pending);
        while batch.len() < pending {
            match receiver.try_recv() {
                Ok(record) => batch.push(record),
                Err(_) => break,
            }
        }

        if batch.is_empty() {
            diag!(level, DEBUG, engine = self.id, "queue is empty, nothing to flush");
            return FlushReport::empty(trigger);
        }

        diag!(
            level,
            DEBUG,
            engine = self.id,
            records = batch.len(),
            "collected records from the queue"
        );
        self.set_flushing(Some(thread::current().id()));
        let report = self.dispatch(trigger, &batch);
        self.set_flushing(None);
        drop(receiver);
        report
    }

    fn set_flushing(&self, owner: Option<ThreadId>) {
        *self.flushing.lock().unwrap_or_else(PoisonError::into_inner) = owner;
    }

    fn is_flushing_thread(&self) -> bool {
        *self.flushing.lock().unwrap_or_else(PoisonError::into_inner)
            == Some(thread::current().id())
    }

    /// Stops the queue from accepting records; those already buffered can still be drained.
    ///
    /// Taken under the flush lock so a producer that passed the shutdown check just before is
    /// either drained by the next flush or sees the closed channel.
    pub(super) fn close(&self) {
        if self.is_flushing_thread() {
            return;
        }
        self.receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .close();
    }

    fn dispatch(&self, trigger: FlushTrigger, batch: &[Record]) -> FlushReport {
        let level = self.config.log_level;
        let sinks = self
            .sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut report = FlushReport {
            trigger,
            records: batch.len(),
            sinks_succeeded: 0,
            sinks_failed: 0,
        };

        for sink in &sinks {
            let result = panic::catch_unwind(AssertUnwindSafe(|| sink.export(batch)))
                .unwrap_or_else(|payload| Err(ExportError::Panicked(panic_message(&*payload))));

            match result {
                Ok(()) => {
                    report.sinks_succeeded += 1;
                    diag!(
                        level,
                        INFO,
                        engine = self.id,
                        ?sink,
                        records = batch.len(),
                        "records exported"
                    );
                }
                Err(error) => {
                    report.sinks_failed += 1;
                    self.counters.sink_failures.fetch_add(1, Ordering::Relaxed);
                    diag!(
                        level,
                        ERROR,
                        engine = self.id,
                        ?sink,
                        records = batch.len(),
                        %trigger,
                        %error,
                        "failed to export records"
                    );
                }
            }
        }

        self.counters.batches.fetch_add(1, Ordering::Relaxed);
        report
    }

    pub(super) fn add_sink(&self, sink: Arc<dyn Sink>) -> Result<(), EngineError> {
        if self.is_shut_down() {
            return Err(EngineError::ShutDown);
        }

        let mut sinks = self.sinks.write().unwrap_or_else(PoisonError::into_inner);
        if sinks.iter().any(|existing| Arc::ptr_eq(existing, &sink)) {
            return Err(EngineError::DuplicateSink(format!("{sink:?}")));
        }
        diag!(self.config.log_level, INFO, engine = self.id, ?sink, "sink added");
        sinks.push(sink);
        Ok(())
    }

    pub(super) fn sink_count(&self) -> usize {
        self.sinks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub(super) fn queue_depth(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// Sets the shutdown flag, returning whether this call was the one that set it.
    pub(super) fn begin_shutdown(&self) -> bool {
        !self.shutdown.swap(true, Ordering::AcqRel)
    }

    pub(super) fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}
