use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use super::{ExportError, Sink};
use crate::Record;

/// A sink that appends records as delimited rows to a file.
///
/// The header row is written only when the file did not exist before the first export. The file
/// is opened once in append mode and kept open, so existing content is never overwritten.
///
/// # Examples
///
/// ```rust,no_run
/// use callspool::Engine;
/// use callspool::sink::CsvSink;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let engine = Engine::builder()
///     .sink(CsvSink::new("telemetry.csv")?)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CsvSink {
    path: PathBuf,
    delimiter: char,
    writer: Mutex<Option<BufWriter<fs_err::File>>>,
}

impl CsvSink {
    /// Creates a sink writing to `path`.
    ///
    /// Fails if the directory that should contain `path` does not exist.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, ExportError> {
        let path = path.into();
        let folder = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        if !folder.is_dir() {
            return Err(ExportError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!(
                    "the folder for the output file does not exist: {}",
                    path.display()
                ),
            )));
        }

        Ok(Self {
            path,
            delimiter: ',',
            writer: Mutex::new(None),
        })
    }

    /// Uses `delimiter` between cells instead of `,`.
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// The file this sink appends to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_row<'a>(
        &self,
        output: &mut impl Write,
        cells: impl IntoIterator<Item = &'a str>,
    ) -> io::Result<()> {
        let mut line = String::new();
        for (index, cell) in cells.into_iter().enumerate() {
            if index > 0 {
                line.push(self.delimiter);
            }
            push_cell(&mut line, cell, self.delimiter);
        }
        line.push_str("\r\n");
        output.write_all(line.as_bytes())
    }
}

/// Appends `cell`, quoting it when it contains the delimiter, a quote or a line break.
fn push_cell(line: &mut String, cell: &str, delimiter: char) {
    let needs_quotes = cell
        .chars()
        .any(|c| c == delimiter || c == '"' || c == '\n' || c == '\r');
    if !needs_quotes {
        line.push_str(cell);
        return;
    }

    line.push('"');
    for c in cell.chars() {
        if c == '"' {
            line.push('"');
        }
        line.push(c);
    }
    line.push('"');
}

impl Sink for CsvSink {
    fn export(&self, records: &[Record]) -> Result<(), ExportError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let writer = match &mut *writer {
            Some(writer) => writer,
            slot @ None => {
                let existed = self.path.exists();
                let file = fs_err::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)?;
                let mut file = BufWriter::new(file);
                if !existed {
                    self.write_row(&mut file, Record::FIELDS)?;
                }
                slot.insert(file)
            }
        };

        for record in records {
            let values = record.values();
            self.write_row(writer, values.iter().map(String::as_str))?;
        }
        writer.flush()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{Local, TimeZone};
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use super::CsvSink;
    use crate::sink::{ExportError, Sink};
    use crate::{CallSite, Outcome, Record};

    fn record(unit: &'static str, outcome: Outcome) -> Record {
        let timestamp = Local.with_ymd_and_hms(2025, 7, 23, 12, 0, 0).unwrap();
        Record::with_timestamp(
            timestamp,
            "alice",
            CallSite::new("report", unit),
            Duration::from_millis(500),
            outcome,
        )
    }

    #[test]
    fn missing_folder_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.csv");

        let error = CsvSink::new(&path).unwrap_err();
        assert!(matches!(error, ExportError::Io(ref io) if io.kind() == std::io::ErrorKind::NotFound));
    }

    #[test]
    fn header_written_once_across_exports() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let sink = CsvSink::new(&path).unwrap();

        sink.export(&[record("load", Outcome::success())]).unwrap();
        sink.export(&[record("save", Outcome::error(&"disk full, retry"))])
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap().replace("\r\n", "\n");
        assert_eq!(
            content,
            indoc! {r#"
                actor_id,unit_name,scope_name,timestamp,elapsed,status,error_detail,result_summary
                alice,load,report,2025-07-23 12:00:00,0.5,success,,
                alice,save,report,2025-07-23 12:00:00,0.5,error,"disk full, retry",
            "#}
        );
    }

    #[test]
    fn existing_file_is_appended_without_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::write(&path, "previous\r\n").unwrap();

        let sink = CsvSink::new(&path).unwrap().with_delimiter(';');
        sink.export(&[record("load", Outcome::summarized(&"a;b", 32))])
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "previous\r\nalice;load;report;2025-07-23 12:00:00;0.5;success;;\"\"\"a;b\"\"\"\r\n"
        );
    }

    #[test]
    fn empty_batch_does_not_create_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let sink = CsvSink::new(&path).unwrap();

        sink.export(&[]).unwrap();

        assert!(!path.exists());
    }
}
