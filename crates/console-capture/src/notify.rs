//! User-visible notifications.
//!
//! A one-shot, non-blocking broadcast channel. Publishing never waits for a
//! reader and silently drops notifications when nobody is subscribed, so a
//! missing UI can never stall a capture transition.

use crate::host::TabId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

/// What kind of notification this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    Info,
    Warning,
    Error,
    /// The tab's log buffer was emptied; displays should refresh.
    LogsCleared,
}

/// A single user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub tab: TabId,
    pub kind: NotificationKind,
    pub message: String,
}

/// Publishing half of the notification channel.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    /// Creates a channel retaining at most `capacity` unread notifications
    /// per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribes to notifications published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Publishes a notification without blocking.
    pub fn publish(&self, tab: TabId, kind: NotificationKind, message: impl Into<String>) {
        let notification = Notification {
            tab,
            kind,
            message: message.into(),
        };
        if self.tx.send(notification).is_err() {
            trace!(%tab, "notification dropped, no subscribers");
        }
    }

    pub fn info(&self, tab: TabId, message: impl Into<String>) {
        self.publish(tab, NotificationKind::Info, message);
    }

    pub fn warning(&self, tab: TabId, message: impl Into<String>) {
        self.publish(tab, NotificationKind::Warning, message);
    }

    pub fn error(&self, tab: TabId, message: impl Into<String>) {
        self.publish(tab, NotificationKind::Error, message);
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publishing_without_subscribers_does_not_fail() {
        let notifier = Notifier::new(4);
        notifier.info(TabId(1), "nobody listening");
    }

    #[tokio::test]
    async fn subscribers_receive_in_order() {
        let notifier = Notifier::new(4);
        let mut rx = notifier.subscribe();

        notifier.warning(TabId(1), "first");
        notifier.publish(TabId(1), NotificationKind::LogsCleared, "");

        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind, NotificationKind::Warning);
        assert_eq!(first.message, "first");
        assert_eq!(rx.recv().await.unwrap().kind, NotificationKind::LogsCleared);
    }
}
