/// Structured logging for the temperature alert service
///
/// Provides context-rich logging with a component tag and, where relevant,
/// the chat id or location the message is about. Backed by `tracing`, with
/// console output and an optional append-only log file for daemon use.

use std::fmt;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt as tfmt};

use crate::model::SourceError;

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    #[serde(alias = "warn")]
    Warning,
    Error,
}

impl LogLevel {
    fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Telegram,
    Weather,
    Engine,
    Store,
    System,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Telegram => write!(f, "TG"),
            Component::Weather => write!(f, "WX"),
            Component::Engine => write!(f, "ENG"),
            Component::Store => write!(f, "DB"),
            Component::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - provider has nothing for this location right now
    Expected,
    /// Unexpected failure - indicates service degradation or configuration issue
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Initialization
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LogInitError {
    #[error("invalid log file path: {0}")]
    InvalidPath(String),
    #[error("logger already initialized: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}

/// Initialize the global subscriber.
///
/// `RUST_LOG` overrides `min_level` when set. The returned guard flushes the
/// file writer on drop and must be held for the life of the process.
pub fn init_logger(
    min_level: LogLevel,
    log_file: Option<&str>,
    console_timestamps: bool,
) -> Result<Option<WorkerGuard>, LogInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(min_level.as_directive()));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let console = tfmt::layer().with_target(false);
    if console_timestamps {
        layers.push(console.boxed());
    } else {
        layers.push(console.without_time().boxed());
    }

    let mut guard = None;
    if let Some(path) = log_file {
        let path = Path::new(path);
        let file_name = path
            .file_name()
            .ok_or_else(|| LogInitError::InvalidPath(path.display().to_string()))?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let (writer, file_guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
        layers.push(
            tfmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
                .boxed(),
        );
        guard = Some(file_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()?;

    Ok(guard)
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Log a general informational message
pub fn info(component: Component, subject: Option<&str>, message: &str) {
    tracing::info!(component = %component, subject = subject.unwrap_or("-"), "{}", message);
}

/// Log a warning message
pub fn warn(component: Component, subject: Option<&str>, message: &str) {
    tracing::warn!(component = %component, subject = subject.unwrap_or("-"), "{}", message);
}

/// Log an error message
pub fn error(component: Component, subject: Option<&str>, message: &str) {
    tracing::error!(component = %component, subject = subject.unwrap_or("-"), "{}", message);
}

/// Log a debug message
pub fn debug(component: Component, subject: Option<&str>, message: &str) {
    tracing::debug!(component = %component, subject = subject.unwrap_or("-"), "{}", message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify a temperature source failure.
pub fn classify_source_failure(err: &SourceError) -> FailureType {
    match err {
        // Stations go quiet between reports; a gap is routine.
        SourceError::NoDataAvailable(_) | SourceError::StaleData { .. } => FailureType::Expected,
        SourceError::NotSupported(_) => FailureType::Expected,
        // Server-side trouble or an API change
        SourceError::HttpError(code) if *code >= 500 => FailureType::Unknown,
        SourceError::HttpError(_) | SourceError::ParseError(_) => FailureType::Unexpected,
        SourceError::UnsupportedLocation(_) => FailureType::Unexpected,
        SourceError::Network(_) => FailureType::Unknown,
    }
}

/// Log a temperature source failure with automatic classification
pub fn log_source_failure(location: &str, operation: &str, err: &SourceError) {
    let failure_type = classify_source_failure(err);
    let message = format!("{} failed [{}]: {}", operation, failure_type, err);

    match failure_type {
        FailureType::Expected => debug(Component::Weather, Some(location), &message),
        FailureType::Unexpected => error(Component::Weather, Some(location), &message),
        FailureType::Unknown => warn(Component::Weather, Some(location), &message),
    }
}

// ---------------------------------------------------------------------------
// Restore Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of snapshot restoration at startup
pub fn log_restore_summary(total: usize, restored: usize, skipped: usize) {
    let message = format!(
        "Restored {}/{} chat snapshots, {} skipped",
        restored, total, skipped
    );

    if skipped == 0 {
        info(Component::Store, None, &message);
    } else if restored == 0 && total > 0 {
        error(Component::Store, None, &message);
    } else {
        warn(Component::Store, None, &message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warning);
        assert!(LogLevel::Warning < LogLevel::Error);
    }

    #[test]
    fn test_log_level_parses_from_config_strings() {
        #[derive(Deserialize)]
        struct Wrapper {
            level: LogLevel,
        }
        let w: Wrapper = toml::from_str("level = \"warn\"").unwrap();
        assert_eq!(w.level, LogLevel::Warning);
        let w: Wrapper = toml::from_str("level = \"debug\"").unwrap();
        assert_eq!(w.level, LogLevel::Debug);
    }

    #[test]
    fn test_failure_classification() {
        let stale = SourceError::StaleData {
            location: "PIA".to_string(),
            age_minutes: 200,
        };
        assert_eq!(classify_source_failure(&stale), FailureType::Expected);

        assert_eq!(
            classify_source_failure(&SourceError::HttpError(400)),
            FailureType::Unexpected
        );
        assert_eq!(
            classify_source_failure(&SourceError::HttpError(503)),
            FailureType::Unknown
        );
        assert_eq!(
            classify_source_failure(&SourceError::ParseError("bad".into())),
            FailureType::Unexpected
        );
        assert_eq!(
            classify_source_failure(&SourceError::Network("timeout".into())),
            FailureType::Unknown
        );
    }
}
