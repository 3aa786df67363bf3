//! The background task that flushes on a fixed interval.

use std::io;
use std::sync::Arc;
use std::thread;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;

use super::FlushTrigger;
use super::shared::Shared;
use crate::log::diag;

/// Handle to the periodic flush task.
///
/// The task runs on its own thread with a current-thread runtime, independent of any runtime the
/// host application uses.
#[derive(Debug)]
pub(super) struct Flusher {
    cancel: CancellationToken,
    thread: thread::JoinHandle<()>,
}

impl Flusher {
    pub(super) fn spawn(shared: Arc<Shared>) -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let thread = thread::Builder::new()
            .name(format!("callspool-flush-{}", shared.id))
            .spawn(move || runtime.block_on(run(shared, token)))?;

        Ok(Self { cancel, thread })
    }

    pub(super) fn is_alive(&self) -> bool {
        !self.thread.is_finished()
    }

    /// Requests cancellation and waits until the thread has exited.
    pub(super) fn stop(self, level: LevelFilter) {
        self.cancel.cancel();

        // Joining ourselves would never return; cancellation alone ends the loop.
        if self.thread.thread().id() == thread::current().id() {
            return;
        }

        if self.thread.join().is_err() {
            diag!(level, ERROR, "periodic flush thread panicked");
        }
    }
}

async fn run(shared: Arc<Shared>, cancel: CancellationToken) {
    let level = shared.config.log_level;
    let period = shared.config.flush_interval;
    diag!(level, DEBUG, engine = shared.id, ?period, "periodic flush task started");

    // An interval too large to schedule never ticks, only cancellation ends the task.
    if let Some(start) = Instant::now().checked_add(period) {
        let mut ticker = tokio::time::interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if cancel.is_cancelled() {
                        break;
                    }
                    shared.flush(FlushTrigger::Periodic);
                }
            }
        }
    } else {
        cancel.cancelled().await;
    }

    diag!(level, DEBUG, engine = shared.id, "periodic flush task stopped");
}
