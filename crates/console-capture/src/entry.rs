//! Canonical log-entry model.
//!
//! Every raw event, whichever producer emitted it, ends up as a [`LogEntry`].
//! The entry keeps the severity captured at the source (`level`) next to the
//! refined label produced by the classifier (`category`), plus a fully
//! rendered `message` line ready for display or export.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Primary severity captured at the source.
///
/// Ingestion is case-insensitive. `warn` and `warning` both map to
/// [`Level::Warn`], the protocol's `verbose` maps to [`Level::Debug`] and any
/// other unknown label falls back to [`Level::Log`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    /// `console.log()`
    Log,
    /// `console.info()`
    Info,
    /// `console.warn()`
    Warn,
    /// `console.error()`, and every exception
    Error,
    /// `console.debug()`
    Debug,
}

impl Level {
    /// Parses a producer-supplied level label.
    #[must_use]
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "info" => Level::Info,
            "warn" | "warning" => Level::Warn,
            "error" => Level::Error,
            "debug" | "verbose" => Level::Debug,
            _ => Level::Log,
        }
    }

    /// Uppercase label used in rendered output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Log => "LOG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Debug => "DEBUG",
        }
    }
}

impl From<&str> for Level {
    fn from(label: &str) -> Self {
        Level::parse(label)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Refined label assigned by the classifier.
///
/// This is a closed set: a [`LogEntry`] never carries a free-text category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    Log,
    Info,
    Debug,
    Warning,
    Error,
    Exception,
    NetworkError,
    CorsError,
    DeprecationWarning,
    SecurityWarning,
}

impl Category {
    /// Every category, in display order.
    pub const ALL: [Category; 10] = [
        Category::Log,
        Category::Info,
        Category::Debug,
        Category::Warning,
        Category::Error,
        Category::Exception,
        Category::NetworkError,
        Category::CorsError,
        Category::DeprecationWarning,
        Category::SecurityWarning,
    ];

    /// Uppercase label, identical to the serialized form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Log => "LOG",
            Category::Info => "INFO",
            Category::Debug => "DEBUG",
            Category::Warning => "WARNING",
            Category::Error => "ERROR",
            Category::Exception => "EXCEPTION",
            Category::NetworkError => "NETWORKERROR",
            Category::CorsError => "CORSERROR",
            Category::DeprecationWarning => "DEPRECATIONWARNING",
            Category::SecurityWarning => "SECURITYWARNING",
        }
    }

    /// Parses an uppercase or lowercase category label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        let upper = label.trim().to_ascii_uppercase();
        Category::ALL.into_iter().find(|c| c.as_str() == upper)
    }

    /// Returns true for every error-family label.
    #[must_use]
    pub fn is_error_like(self) -> bool {
        matches!(
            self,
            Category::Error | Category::Exception | Category::NetworkError | Category::CorsError
        )
    }

    /// Returns true for every warning-family label.
    #[must_use]
    pub fn is_warning_like(self) -> bool {
        matches!(
            self,
            Category::Warning | Category::DeprecationWarning | Category::SecurityWarning
        )
    }
}

impl From<Level> for Category {
    fn from(level: Level) -> Self {
        match level {
            Level::Log => Category::Log,
            Level::Info => Category::Info,
            Level::Warn => Category::Warning,
            Level::Error => Category::Error,
            Level::Debug => Category::Debug,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A captured, classified console entry.
///
/// Entries are immutable once created; the buffer only ever appends or clears.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Capture time, millisecond precision.
    pub timestamp: DateTime<Utc>,

    /// Severity captured at the source.
    pub level: Level,

    /// Refined label after classification.
    pub category: Category,

    /// `[timestamp] [CATEGORY] text`
    pub message: String,
}

impl LogEntry {
    /// Builds an entry and renders its message line.
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>, level: Level, category: Category, text: &str) -> Self {
        let timestamp = truncate_to_millis(timestamp);
        let message = format!("[{}] [{}] {}", format_timestamp(&timestamp), category, text);
        Self {
            timestamp,
            level,
            category,
            message,
        }
    }
}

/// Renders a timestamp as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
#[must_use]
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Converts protocol unix seconds (fractional) into a UTC timestamp.
///
/// Returns `None` for non-finite or out-of-range input.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn from_unix_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let millis = (seconds * 1000.0).round();
    if millis < i64::MIN as f64 || millis > i64::MAX as f64 {
        return None;
    }
    Utc.timestamp_millis_opt(millis as i64).single()
}

fn truncate_to_millis(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(timestamp.timestamp_millis())
        .single()
        .unwrap_or(timestamp)
}
