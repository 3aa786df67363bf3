//! Export destinations for batches of records.
//!
//! The [`Sink`] trait is the only contract the engine relies on: accept an ordered batch of
//! records and report success or failure. Any type implementing it can be registered with
//! [`EngineBuilder::sink`](crate::EngineBuilder::sink) or [`Engine::add_sink`](crate::Engine::add_sink).
//!
//! # Built-in sinks
//!
//! - [`CsvSink`] - Appends records as delimited rows to a file
//! - [`JsonLinesSink`] - Writes records as JSON lines to any writer, e.g. stdout
//! - [`MemorySink`] - Collects batches in memory for testing purposes

mod csv_sink;
mod json_sink;
mod memory_sink;

use std::fmt::Debug;
use std::io;

pub use csv_sink::CsvSink;
pub use json_sink::JsonLinesSink;
pub use memory_sink::{MemoryHandle, MemorySink};

use crate::Record;

/// Error reported by a [`Sink`] that could not export a batch.
///
/// The engine logs these and carries on; they never reach instrumented callers.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// Writing to the destination failed.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// A record could not be encoded.
    #[error("failed to serialize record")]
    Serialize(#[from] serde_json::Error),

    /// The sink refused the batch for its own reasons.
    #[error("{0}")]
    Rejected(String),

    /// The sink panicked while exporting.
    #[error("sink panicked: {0}")]
    Panicked(String),
}

impl ExportError {
    /// Creates an error for custom sinks that have no more specific variant.
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }
}

/// Trait for exporting batches of records to external systems.
///
/// Implementations must accept empty batches. A batch is handed to every sink exactly once; a
/// failing sink does not get it again.
///
/// # Examples
///
/// ```rust
/// use callspool::Record;
/// use callspool::sink::{ExportError, Sink};
///
/// #[derive(Debug)]
/// struct CountingSink;
///
/// impl Sink for CountingSink {
///     fn export(&self, records: &[Record]) -> Result<(), ExportError> {
///         println!("exporting {} records", records.len());
///         Ok(())
///     }
/// }
/// ```
pub trait Sink: Debug + Send + Sync {
    /// Exports an ordered batch of records.
    fn export(&self, records: &[Record]) -> Result<(), ExportError>;
}
