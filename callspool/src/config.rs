//! Engine construction parameters.
//!
//! [`EngineConfig`] can be built in code or deserialized, e.g. from TOML:
//!
//! ```toml
//! max_queue_size = 500
//! flush_interval = 2.5
//! flush_on_exit = true
//! log_level = "debug"
//! summary_limit = 0
//! ```
//!
//! All values are checked by [`EngineConfig::validate`] before an engine starts.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, DurationSecondsWithFrac, serde_as};
use tracing::level_filters::LevelFilter;

/// Largest queue a tokio bounded channel supports.
const MAX_QUEUE_SIZE: usize = tokio::sync::Semaphore::MAX_PERMITS;

/// Error returned for invalid engine parameters.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `max_queue_size` was zero.
    #[error("max_queue_size must be positive")]
    ZeroQueueSize,

    /// `max_queue_size` exceeds what the queue can hold.
    #[error("max_queue_size {0} exceeds the supported maximum of {max}", max = MAX_QUEUE_SIZE)]
    QueueSizeTooLarge(usize),

    /// `flush_interval` was zero.
    #[error("flush_interval must be positive")]
    ZeroFlushInterval,

    /// The configuration file could not be read.
    #[error("failed to read engine configuration")]
    Read(#[source] std::io::Error),

    /// The configuration text is not valid.
    #[error("failed to parse engine configuration")]
    Parse(#[from] toml::de::Error),
}

/// Parameters for an [`Engine`](crate::Engine).
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Maximum number of buffered records.
    pub max_queue_size: usize,

    /// Time between automatic flushes, in (fractional) seconds when deserialized.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub flush_interval: Duration,

    /// Whether dropping the engine performs a final flush.
    pub flush_on_exit: bool,

    /// Most verbose level the engine emits its own diagnostics at.
    #[serde_as(as = "DisplayFromStr")]
    pub log_level: LevelFilter,

    /// Maximum characters kept of a result summary, 0 disables summaries.
    pub summary_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            flush_interval: Duration::from_secs(5),
            flush_on_exit: true,
            log_level: LevelFilter::INFO,
            summary_limit: 256,
        }
    }
}

impl EngineConfig {
    /// Parses a TOML document and validates it.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs_err::read_to_string(path.as_ref()).map_err(ConfigError::Read)?;
        Self::from_toml_str(&text)
    }

    /// Checks that every value is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_queue_size == 0 {
            return Err(ConfigError::ZeroQueueSize);
        }
        if self.max_queue_size > MAX_QUEUE_SIZE {
            return Err(ConfigError::QueueSizeTooLarge(self.max_queue_size));
        }
        if self.flush_interval.is_zero() {
            return Err(ConfigError::ZeroFlushInterval);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use test_case::test_case;
    use tracing::level_filters::LevelFilter;

    use super::{ConfigError, EngineConfig};

    #[test]
    fn partial_document_uses_defaults() {
        let config = EngineConfig::from_toml_str(indoc! {r#"
            max_queue_size = 10
            flush_interval = 0.25
            log_level = "debug"
        "#})
        .unwrap();

        assert_eq!(
            config,
            EngineConfig {
                max_queue_size: 10,
                flush_interval: Duration::from_millis(250),
                log_level: LevelFilter::DEBUG,
                ..EngineConfig::default()
            }
        );
    }

    #[test_case("max_queue_size = 0" ; "zero queue")]
    #[test_case("flush_interval = 0.0" ; "zero interval")]
    fn invalid_values_fail_fast(text: &str) {
        let error = EngineConfig::from_toml_str(text).unwrap_err();
        assert!(matches!(
            error,
            ConfigError::ZeroQueueSize | ConfigError::ZeroFlushInterval
        ));
    }

    #[test_case("flush_interval = -1.0" ; "negative interval")]
    #[test_case("log_level = \"loud\"" ; "unknown level")]
    #[test_case("queue = 3" ; "unknown field")]
    fn malformed_documents_are_parse_errors(text: &str) {
        let error = EngineConfig::from_toml_str(text).unwrap_err();
        assert!(matches!(error, ConfigError::Parse(_)), "{error:?}");
    }

    #[test]
    fn oversized_queue_is_rejected() {
        let config = EngineConfig {
            max_queue_size: usize::MAX,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::QueueSizeTooLarge(usize::MAX))
        ));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let error = EngineConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(error, ConfigError::Read(_)));
    }
}
