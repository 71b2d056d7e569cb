//! CLI error type and its miette conversion.
//!
//! Library errors convert automatically via `#[from]`; [`cli_error_to_miette`]
//! turns the result into a report at `main`, attaching a hint where the fix
//! is usually on the user's side.

use console_capture::{CaptureError, ConfigError, HostError, StoreError};
use miette::Report;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Browser launch or protocol failure
    #[error("Browser error: {0}")]
    Browser(#[from] HostError),

    /// Capture could not be started on the page
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Log store could not be opened
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Export file could not be written
    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration could not be rendered back to TOML
    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),
}

/// Result type for CLI commands.
pub type Result<T> = std::result::Result<T, CliError>;

/// Convert a `CliError` into a miette report.
pub fn cli_error_to_miette(err: CliError) -> Report {
    match err {
        CliError::Browser(HostError::LaunchFailed { reason, .. }) => miette::miette!(
            "Failed to launch Chrome: {}\n\nHint: Install Chrome or Chromium, or pass --chrome <PATH>",
            reason
        ),
        CliError::Capture(CaptureError::RestrictedPage { url }) => miette::miette!(
            "Capture is not allowed on {}\n\nHint: Browser-internal pages (chrome://, about:, ...) cannot be captured",
            url
        ),
        CliError::Config(e) => miette::miette!(
            "Configuration error: {}\n\nHint: Check console-capture.toml and any CONSOLE_CAPTURE_* variables",
            e
        ),
        _ => miette::miette!("{}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restricted_page_report_has_hint() {
        let report = cli_error_to_miette(CliError::Capture(CaptureError::RestrictedPage {
            url: "chrome://settings".to_string(),
        }));
        let text = report.to_string();
        assert!(text.contains("chrome://settings"));
        assert!(text.contains("Hint"));
    }

    #[test]
    fn test_other_errors_keep_their_message() {
        let err = CliError::Io(std::io::Error::other("disk full"));
        assert_eq!(cli_error_to_miette(err).to_string(), "I/O error: disk full");
    }
}
