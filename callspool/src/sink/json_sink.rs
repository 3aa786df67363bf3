use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use super::{ExportError, Sink};
use crate::Record;

/// A sink that writes every record as one JSON object per line.
///
/// # Examples
///
/// ```rust
/// use callspool::Engine;
/// use callspool::sink::JsonLinesSink;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let engine = Engine::builder().sink(JsonLinesSink::stdout()).build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    output: Mutex<W>,
}

impl JsonLinesSink<io::Stdout> {
    /// Creates a sink printing to stdout.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W> JsonLinesSink<W>
where
    W: Write,
{
    /// Creates a sink writing to `output`.
    pub fn new(output: W) -> Self {
        Self {
            output: Mutex::new(output),
        }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.output
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W> Sink for JsonLinesSink<W>
where
    W: Write + Send + std::fmt::Debug,
{
    fn export(&self, records: &[Record]) -> Result<(), ExportError> {
        let mut output = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        for record in records {
            serde_json::to_writer(&mut *output, record)?;
            output.write_all(b"\n")?;
        }
        output.flush()?;
        Ok(())
    }
}
