//! Boundary dispatcher between producers, the UI and the registry.
//!
//! The router is the only caller of registry transitions. Failures while
//! processing one event are logged and the event is dropped; they never
//! escape into the producer that delivered it.

use crate::entry::LogEntry;
use crate::error::{CaptureError, EventError};
use crate::event::{RawEvent, ShimMessage};
use crate::host::{Inbound, TabEvent, TabId};
use crate::normalize::normalize;
use crate::registry::{CaptureRegistry, StartOutcome, StopOutcome};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

/// Query and action requests issued by a UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "action",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Request {
    ToggleCapture { tab_id: TabId },
    GetStatus { tab_id: TabId },
    GetLogs { tab_id: TabId },
    ClearLogs { tab_id: TabId },
}

impl Request {
    #[must_use]
    pub fn tab(&self) -> TabId {
        match *self {
            Request::ToggleCapture { tab_id }
            | Request::GetStatus { tab_id }
            | Request::GetLogs { tab_id }
            | Request::ClearLogs { tab_id } => tab_id,
        }
    }
}

/// Reply to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    /// `{"isCapturing": bool}`
    Status {
        #[serde(rename = "isCapturing")]
        is_capturing: bool,
    },
    /// `{"logs": [...]}`
    Logs { logs: Vec<LogEntry> },
    /// `{}`
    Cleared {},
}

/// Acknowledgement returned to the page shim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShimAck {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ShimAck {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Dispatches inbound traffic to the capture registry.
#[derive(Debug, Clone)]
pub struct Router {
    registry: Arc<CaptureRegistry>,
}

impl Router {
    #[must_use]
    pub fn new(registry: Arc<CaptureRegistry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<CaptureRegistry> {
        &self.registry
    }

    /// Answers a UI request. Toggle replies once its transition has finished.
    pub async fn handle_request(&self, request: Request) -> Response {
        let tab = request.tab();
        match request {
            Request::ToggleCapture { .. } => {
                let is_capturing = match self.registry.toggle(tab).await {
                    Ok(status) => status.is_capturing,
                    Err(e) => {
                        warn!(%tab, error = %e, "toggle capture failed");
                        self.registry.is_capturing(tab)
                    }
                };
                Response::Status { is_capturing }
            }
            Request::GetStatus { .. } => Response::Status {
                is_capturing: self.registry.is_capturing(tab),
            },
            Request::GetLogs { .. } => Response::Logs {
                logs: self.registry.logs(tab),
            },
            Request::ClearLogs { .. } => {
                self.registry.clear_logs(tab).await;
                Response::Cleared {}
            }
        }
    }

    /// Turns capture on for `tab` on behalf of an embedding host.
    ///
    /// Unlike a `toggleCapture` request, failures are returned rather than
    /// folded into a status reply.
    ///
    /// # Errors
    ///
    /// Propagates `start` errors (restricted page, tab lookup, attach).
    pub async fn start_capture(&self, tab: TabId) -> Result<StartOutcome, CaptureError> {
        self.registry.start(tab).await
    }

    /// Turns capture off for `tab` and discards its logs.
    ///
    /// # Errors
    ///
    /// Returns `DetachFailed` when the session could not be released.
    pub async fn stop_capture(&self, tab: TabId) -> Result<StopOutcome, CaptureError> {
        self.registry.stop(tab).await
    }

    /// Accepts a message posted by the page shim.
    pub async fn handle_shim(&self, sender: Option<TabId>, payload: &Value) -> ShimAck {
        let Some(tab) = sender else {
            warn!("page shim message without a sender tab");
            return ShimAck::failure("No tab ID");
        };

        match self.record_shim(tab, payload).await {
            Ok(()) => ShimAck::ok(),
            Err(e) => {
                warn!(%tab, error = %e, "dropping page shim message");
                ShimAck::failure(e.to_string())
            }
        }
    }

    async fn record_shim(&self, tab: TabId, payload: &Value) -> Result<(), EventError> {
        let message = ShimMessage::parse(payload)?;
        let entry = normalize(RawEvent::from(message), Utc::now())?;
        self.registry.append(tab, entry).await;
        Ok(())
    }

    /// Accepts a protocol event. Never fails.
    pub async fn handle_protocol(&self, tab: TabId, method: &str, params: &Value) {
        let event = match RawEvent::from_protocol(method, params) {
            Ok(Some(event)) => event,
            Ok(None) => {
                trace!(%tab, method, "ignoring protocol event");
                return;
            }
            Err(e) => {
                warn!(%tab, method, error = %e, "dropping malformed protocol event");
                return;
            }
        };

        match normalize(event, Utc::now()) {
            Ok(entry) => {
                self.registry.append(tab, entry).await;
            }
            Err(e) => warn!(%tab, method, error = %e, "dropping protocol event"),
        }
    }

    /// Maps a tab lifecycle notification to its registry transition.
    pub async fn handle_tab_event(&self, event: TabEvent) {
        let tab = event.tab();
        let result = match event {
            TabEvent::Removed { .. } => {
                self.registry.on_tab_closed(tab).await;
                Ok(())
            }
            TabEvent::Loading { .. } => self.registry.on_tab_loading(tab).await.map(drop),
            TabEvent::Complete { .. } => self.registry.on_tab_complete(tab).await.map(drop),
            TabEvent::Activated { .. } => self.registry.on_tab_activated(tab).await.map(drop),
            TabEvent::NavigationCompleted { .. } => {
                self.registry.on_navigation_complete(tab).await.map(drop)
            }
            TabEvent::DebuggerDetached { .. } => {
                self.registry.on_attach_lost(tab).await;
                Ok(())
            }
        };
        if let Err(e) = result {
            error!(%tab, ?event, error = %e, "tab lifecycle transition failed");
        }
    }

    /// Dispatches one inbound item.
    pub async fn dispatch(&self, inbound: Inbound) {
        match inbound {
            Inbound::Shim { sender, payload } => {
                let ack = self.handle_shim(sender, &payload).await;
                trace!(?ack, "page shim message handled");
            }
            Inbound::Protocol { tab, method, params } => {
                self.handle_protocol(tab, &method, &params).await;
            }
            Inbound::Tab(event) => self.handle_tab_event(event).await,
        }
    }

    /// Drains `rx` until every sender is dropped.
    pub async fn run(&self, mut rx: mpsc::Receiver<Inbound>) {
        debug!("event router running");
        while let Some(inbound) = rx.recv().await {
            self.dispatch(inbound).await;
        }
        debug!("event router stopped, inbound channel closed");
    }
}
