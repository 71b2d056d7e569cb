//! Browser-side collaborator abstractions.
//!
//! The capture core never talks to a browser directly. It drives these
//! traits, which the chromiumoxide host implements for a real Chrome and
//! which tests implement with scripted fakes.
//!
//! Hosts deliver inbound traffic (protocol events for subscribed tabs, shim
//! messages, tab lifecycle notifications) as [`Inbound`] values on a channel
//! the [`Router`](crate::router::Router) drains.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Opaque browser tab identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub u64);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TabId {
    fn from(id: u64) -> Self {
        TabId(id)
    }
}

/// Protocol domains enabled once a session is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Log,
    Console,
    Runtime,
    Network,
}

impl Domain {
    /// Protocol name of the domain's enable command.
    #[must_use]
    pub fn enable_command(self) -> &'static str {
        match self {
            Domain::Log => "Log.enable",
            Domain::Console => "Console.enable",
            Domain::Runtime => "Runtime.enable",
            Domain::Network => "Network.enable",
        }
    }
}

/// Debugging-protocol collaborator.
///
/// Implementations must be object-safe so the registry can hold them behind
/// `Arc<dyn Debugger>`.
#[async_trait]
pub trait Debugger: Send + Sync {
    /// Returns the tab's current URL.
    async fn tab_url(&self, tab: TabId) -> Result<String>;

    /// Establishes a debugging session for `version` of the protocol.
    async fn attach(&self, tab: TabId, version: &str) -> Result<()>;

    /// Tears the session down. Fails with `NotAttached` when there is none.
    async fn detach(&self, tab: TabId) -> Result<()>;

    /// Enables the given protocol domains on an attached session.
    async fn enable_domains(&self, tab: TabId, domains: &[Domain]) -> Result<()>;

    /// Starts forwarding the tab's protocol events as [`Inbound::Protocol`].
    async fn subscribe(&self, tab: TabId) -> Result<()>;

    /// Stops forwarding the tab's protocol events.
    async fn unsubscribe(&self, tab: TabId);
}

/// Page-injection collaborator.
#[async_trait]
pub trait PageInjector: Send + Sync {
    /// Runs the capture shim in the page's own execution context.
    async fn inject(&self, tab: TabId) -> Result<()>;
}

impl fmt::Debug for dyn Debugger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debugger").finish_non_exhaustive()
    }
}

impl fmt::Debug for dyn PageInjector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageInjector").finish_non_exhaustive()
    }
}

/// Tab lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum TabEvent {
    /// The tab was closed.
    Removed { tab: TabId },
    /// The tab started loading (reload or navigation).
    Loading { tab: TabId },
    /// The tab finished loading.
    Complete { tab: TabId },
    /// The tab became the active tab.
    Activated { tab: TabId },
    /// A main-frame navigation committed and completed.
    NavigationCompleted { tab: TabId },
    /// The debugging session dropped without a stop (crash, external detach).
    DebuggerDetached { tab: TabId },
}

impl TabEvent {
    /// The tab this notification is about.
    #[must_use]
    pub fn tab(&self) -> TabId {
        match *self {
            TabEvent::Removed { tab }
            | TabEvent::Loading { tab }
            | TabEvent::Complete { tab }
            | TabEvent::Activated { tab }
            | TabEvent::NavigationCompleted { tab }
            | TabEvent::DebuggerDetached { tab } => tab,
        }
    }
}

/// Everything a host pushes towards the router.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A page-shim message. `sender` is `None` when the host could not tell
    /// which tab posted it.
    Shim {
        sender: Option<TabId>,
        payload: Value,
    },

    /// A protocol event for a subscribed tab.
    Protocol {
        tab: TabId,
        method: String,
        params: Value,
    },

    /// A tab lifecycle notification.
    Tab(TabEvent),
}
