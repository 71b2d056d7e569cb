//! Error types for capture operations.
//!
//! This module provides a structured error hierarchy that separates the
//! failure modes of each layer: collaborator (host) failures, capture
//! transitions refused or aborted by the registry, persistence failures, and
//! malformed event payloads. Each variant carries the context needed to tell
//! the user what went wrong.

use crate::host::TabId;
use thiserror::Error;

/// Failures reported by the browser-side collaborators.
///
/// `NotAttached` is the benign detach failure: the session was already gone.
#[derive(Debug, Error)]
pub enum HostError {
    /// Detach (or a command) was issued for a tab with no debugging session.
    #[error("debugger is not attached to tab {0}")]
    NotAttached(TabId),

    /// A second session was requested for a tab.
    #[error("another debugger is already attached to tab {0}")]
    AlreadyAttached(TabId),

    /// The tab does not exist (closed, or never opened by this host).
    #[error("no tab with id {0}")]
    UnknownTab(TabId),

    /// The requested protocol version is not spoken by this host.
    #[error("unsupported protocol version '{0}'")]
    UnsupportedVersion(String),

    /// A protocol command failed.
    #[error("protocol command '{command}' failed: {reason}")]
    Protocol {
        /// The command that failed
        command: String,
        /// Reason reported by the browser
        reason: String,
    },

    /// The capture shim could not be placed in the page.
    #[error("script injection failed: {0}")]
    Injection(String),

    /// Failed to launch the browser process.
    #[error("failed to launch browser: {reason}")]
    LaunchFailed {
        /// Human-readable reason for the launch failure
        reason: String,
        /// Optional underlying error that caused the failure
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An operation was attempted on a closed browser instance.
    #[error("browser instance is already closed")]
    AlreadyClosed,

    /// Wraps errors from the chromiumoxide library.
    #[error("chromiumoxide error: {0}")]
    ChromiumOxide(#[from] chromiumoxide::error::CdpError),
}

impl HostError {
    /// Returns true for the "already not attached" detach failure.
    #[must_use]
    pub fn is_not_attached(&self) -> bool {
        matches!(self, HostError::NotAttached(_))
    }
}

/// Failures of the capture state machine transitions.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Capture is refused outright on browser-internal pages.
    #[error("cannot capture logs on restricted page '{url}'")]
    RestrictedPage {
        /// The refused URL
        url: String,
    },

    /// The tab's URL could not be resolved.
    #[error("failed to look up tab {tab}: {source}")]
    TabLookup {
        tab: TabId,
        #[source]
        source: HostError,
    },

    /// The debugging session could not be established.
    #[error("failed to attach debugger to tab {tab}: {source}")]
    AttachFailed {
        tab: TabId,
        #[source]
        source: HostError,
    },

    /// Detach failed for a reason other than "already not attached".
    ///
    /// The tab has already been forced back to idle when this is returned.
    #[error("failed to detach debugger from tab {tab}: {source}")]
    DetachFailed {
        tab: TabId,
        #[source]
        source: HostError,
    },
}

/// Failures of the log persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage backend rejected the operation.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A stored value could not be encoded or decoded.
    #[error("stored logs are not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic I/O errors (database file access).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A malformed event payload.
///
/// Raised while decoding or normalizing a single event; the router logs it
/// and drops the event.
#[derive(Debug, Error)]
pub enum EventError {
    /// The message did not carry the page-shim source marker.
    #[error("message is missing the page shim source marker")]
    MissingSourceMarker,

    /// The payload did not match the expected shape.
    #[error("malformed {context} payload: {reason}")]
    Payload {
        /// Which producer shape was being decoded
        context: String,
        /// Decoder message
        reason: String,
    },

    /// A protocol timestamp could not be represented.
    #[error("invalid protocol timestamp {0}")]
    InvalidTimestamp(f64),
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value could not be extracted into the expected type.
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::InvalidValue(err.to_string())
    }
}

/// A specialized Result type for host operations.
pub type Result<T> = std::result::Result<T, HostError>;
