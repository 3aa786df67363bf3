use std::sync::{Arc, Mutex, PoisonError};

use super::{ExportError, Sink};
use crate::Record;

/// A sink for testing that stores every exported batch in memory.
///
/// This sink is useful for unit tests and integration tests where you need to verify which
/// records reached the sinks and how they were batched.
#[derive(Debug)]
pub struct MemorySink {
    batches: Arc<Mutex<Vec<Vec<Record>>>>,
}

impl MemorySink {
    /// Creates a new memory sink and returns both the sink and a handle to its storage.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use callspool::sink::MemorySink;
    ///
    /// let (sink, handle) = MemorySink::new();
    /// // Register `sink` with an engine, inspect `handle` afterwards.
    /// assert!(handle.batches().is_empty());
    /// ```
    pub fn new() -> (Self, MemoryHandle) {
        let batches = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                batches: batches.clone(),
            },
            MemoryHandle { batches },
        )
    }
}

impl Sink for MemorySink {
    fn export(&self, records: &[Record]) -> Result<(), ExportError> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(records.to_vec());
        Ok(())
    }
}

/// Read access to what a [`MemorySink`] received.
#[derive(Debug, Clone)]
pub struct MemoryHandle {
    batches: Arc<Mutex<Vec<Vec<Record>>>>,
}

impl MemoryHandle {
    /// Every batch in export order.
    pub fn batches(&self) -> Vec<Vec<Record>> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every record across all batches, in export order.
    pub fn records(&self) -> Vec<Record> {
        self.batches().into_iter().flatten().collect()
    }

    /// Removes and returns everything received so far.
    pub fn take(&self) -> Vec<Vec<Record>> {
        std::mem::take(&mut *self.batches.lock().unwrap_or_else(PoisonError::into_inner))
    }
}
