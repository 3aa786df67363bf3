//! The immutable unit of telemetry produced for every instrumented call.

use std::fmt::{self, Debug, Display, Write};
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Format used for [`Record::timestamp`].
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Marker appended to a result summary that was cut short.
const TRUNCATION_MARKER: &str = "...";

/// Whether an instrumented call returned normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The call returned a value (or `Ok` for fallible calls).
    Success,
    /// The call returned `Err` or panicked.
    Error,
}

impl Status {
    /// Returns the lowercase name used when serializing.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Names the callable a [`Record`] describes.
///
/// `scope` is usually the module path and `unit` the function name, see
/// [`call_site!`](crate::call_site).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallSite {
    scope: &'static str,
    unit: &'static str,
}

impl CallSite {
    /// Creates a call site from an explicit scope and unit name.
    pub const fn new(scope: &'static str, unit: &'static str) -> Self {
        Self { scope, unit }
    }

    /// Splits a function path such as `my_crate::module::function` into scope and unit.
    ///
    /// Trailing `{{closure}}` segments are discarded so a path captured inside a closure still
    /// names the enclosing function. A path without `::` is used as the unit with an empty scope.
    pub fn from_function_path(path: &'static str) -> Self {
        let mut path = path;
        while let Some(stripped) = path.strip_suffix("::{{closure}}") {
            path = stripped;
        }

        match path.rsplit_once("::") {
            Some((scope, unit)) => Self { scope, unit },
            None => Self {
                scope: "",
                unit: path,
            },
        }
    }

    /// The module path (or other grouping) of the callable.
    pub fn scope(&self) -> &'static str {
        self.scope
    }

    /// The callable's own name.
    pub fn unit(&self) -> &'static str {
        self.unit
    }
}

impl Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scope.is_empty() {
            f.write_str(self.unit)
        } else {
            write!(f, "{}::{}", self.scope, self.unit)
        }
    }
}

/// Classification of a finished call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The call succeeded, optionally with a bounded rendering of its result.
    Success {
        /// See [`summarize`].
        summary: Option<String>,
    },
    /// The call failed.
    Error {
        /// The stringified error or panic message.
        detail: String,
    },
}

impl Outcome {
    /// A success without result summary.
    pub fn success() -> Self {
        Self::Success { summary: None }
    }

    /// A success carrying the `Debug` rendering of `value`, capped at `limit` characters.
    pub fn summarized(value: &impl Debug, limit: usize) -> Self {
        Self::Success {
            summary: summarize(value, limit),
        }
    }

    /// A failure described by `error`'s `Display` output.
    pub fn error(error: &impl Display) -> Self {
        Self::Error {
            detail: error.to_string(),
        }
    }

    /// Returns the status this outcome is recorded with.
    pub fn status(&self) -> Status {
        match self {
            Self::Success { .. } => Status::Success,
            Self::Error { .. } => Status::Error,
        }
    }
}

/// Renders `value` with `Debug` and caps the text at `limit` characters.
///
/// Returns `None` when `limit` is zero, which disables summaries entirely.
pub fn summarize(value: &impl Debug, limit: usize) -> Option<String> {
    if limit == 0 {
        return None;
    }

    let mut rendered = String::new();
    // Writing into a `String` only fails if the `Debug` impl itself errors.
    if write!(rendered, "{value:?}").is_err() {
        return Some(String::from("<unprintable>"));
    }

    match rendered.char_indices().nth(limit) {
        Some((cut, _)) => {
            rendered.truncate(cut);
            rendered.push_str(TRUNCATION_MARKER);
            Some(rendered)
        }
        None => Some(rendered),
    }
}

/// One structured telemetry entry describing a single instrumented call.
///
/// Records are built in one step and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    actor_id: String,
    unit_name: String,
    scope_name: String,
    timestamp: String,
    elapsed: f64,
    status: Status,
    error_detail: String,
    result_summary: Option<String>,
}

impl Record {
    /// Column names in the order [`Record::values`] yields them.
    pub const FIELDS: [&'static str; 8] = [
        "actor_id",
        "unit_name",
        "scope_name",
        "timestamp",
        "elapsed",
        "status",
        "error_detail",
        "result_summary",
    ];

    /// Builds a record stamped with the current local time.
    pub fn new(
        actor_id: impl Into<String>,
        site: CallSite,
        elapsed: Duration,
        outcome: Outcome,
    ) -> Self {
        Self::with_timestamp(Local::now(), actor_id, site, elapsed, outcome)
    }

    /// Builds a record with an explicit creation time.
    pub fn with_timestamp(
        timestamp: DateTime<Local>,
        actor_id: impl Into<String>,
        site: CallSite,
        elapsed: Duration,
        outcome: Outcome,
    ) -> Self {
        let status = outcome.status();
        let (error_detail, result_summary) = match outcome {
            Outcome::Success { summary } => (String::new(), summary),
            Outcome::Error { detail } => (detail, None),
        };

        Self {
            actor_id: actor_id.into(),
            unit_name: site.unit().to_owned(),
            scope_name: site.scope().to_owned(),
            timestamp: timestamp.format(TIMESTAMP_FORMAT).to_string(),
            elapsed: elapsed.as_secs_f64(),
            status,
            error_detail,
            result_summary,
        }
    }

    /// The caller context bound when the callable was wrapped.
    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    /// The callable's name.
    pub fn unit_name(&self) -> &str {
        &self.unit_name
    }

    /// The callable's module path.
    pub fn scope_name(&self) -> &str {
        &self.scope_name
    }

    /// Local creation time formatted with [`TIMESTAMP_FORMAT`].
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Call duration in seconds.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Whether the call succeeded.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Empty unless [`Record::status`] is [`Status::Error`].
    pub fn error_detail(&self) -> &str {
        &self.error_detail
    }

    /// Bounded rendering of the return value, only present on success.
    pub fn result_summary(&self) -> Option<&str> {
        self.result_summary.as_deref()
    }

    /// Returns the record as flat text cells, ordered like [`Record::FIELDS`].
    ///
    /// A missing summary is rendered as an empty cell.
    pub fn values(&self) -> [String; 8] {
        [
            self.actor_id.clone(),
            self.unit_name.clone(),
            self.scope_name.clone(),
            self.timestamp.clone(),
            self.elapsed.to_string(),
            self.status.as_str().to_owned(),
            self.error_detail.clone(),
            self.result_summary.clone().unwrap_or_default(),
        ]
    }
}
