//! Per-tab capture state machine.
//!
//! [`CaptureRegistry`] owns one record per tracked tab and exposes only the
//! lifecycle transitions; the map itself never leaves this module.
//!
//! # Consistency
//!
//! `start` is a sequence of asynchronous stages (attach, enable domains,
//! subscribe, inject, seed from storage). The map lock is never held across an
//! await. Instead every stage re-fetches the record by tab id and applies its
//! mutation only if the record's generation is the one the stage started
//! with. `stop` and tab close move the generation on, which turns every
//! completion still in flight into a no-op.

use crate::config::CaptureConfig;
use crate::entry::LogEntry;
use crate::error::CaptureError;
use crate::host::{Debugger, PageInjector, TabId};
use crate::notify::{Notification, NotificationKind, Notifier};
use crate::store::LogStore;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

/// Coarse lifecycle phase of a tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CapturePhase {
    Idle,
    Attaching,
    Capturing,
}

/// Point-in-time view of a tab's capture flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureStatus {
    pub is_capturing: bool,
    pub attached: bool,
    pub attaching: bool,
}

impl CaptureStatus {
    #[must_use]
    pub fn phase(&self) -> CapturePhase {
        if self.is_capturing && self.attached {
            CapturePhase::Capturing
        } else if self.attaching {
            CapturePhase::Attaching
        } else {
            CapturePhase::Idle
        }
    }
}

/// How a `start` request was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Attached, subscribed, injected and seeded.
    Started,
    /// A session was already attached. `reinjected` is true when the shim had
    /// to be placed again because a navigation discarded it.
    AlreadyAttached { reinjected: bool },
    /// Another `start` is still waiting for its attach.
    AlreadyAttaching,
    /// The tab was stopped or closed while this start was in flight.
    Superseded,
}

/// How a `stop` request was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Detached and cleared.
    Stopped,
    /// Capture was requested but no session was attached; flags and buffer
    /// were cleared without a detach.
    CaptureFlagCleared,
    /// A start still in flight was abandoned and its session released.
    Abandoned,
    /// Nothing to stop.
    NotCapturing,
}

#[derive(Debug, Default)]
struct TabRecord {
    is_capturing: bool,
    attached: bool,
    attaching: bool,
    injected: bool,
    sink_registered: bool,
    seeded: bool,
    seeding: bool,
    restart_on_complete: bool,
    generation: u64,
    /// Bumped by every `clear_logs`.
    clears: u64,
    logs: Vec<LogEntry>,
}

impl TabRecord {
    fn status(&self) -> CaptureStatus {
        CaptureStatus {
            is_capturing: self.is_capturing,
            attached: self.attached,
            attaching: self.attaching,
        }
    }
}

#[derive(Debug, Default)]
struct Tabs {
    records: HashMap<TabId, TabRecord>,
    next_generation: u64,
}

impl Tabs {
    /// Returns the tab's record, creating it on first reference.
    fn record(&mut self, tab: TabId) -> &mut TabRecord {
        let next = &mut self.next_generation;
        self.records.entry(tab).or_insert_with(|| {
            *next += 1;
            TabRecord {
                generation: *next,
                ..TabRecord::default()
            }
        })
    }

    fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// The tab's record, only if it still belongs to `generation`.
    fn current(&mut self, tab: TabId, generation: u64) -> Option<&mut TabRecord> {
        self.records
            .get_mut(&tab)
            .filter(|record| record.generation == generation)
    }
}

/// Owner of all per-tab capture state.
///
/// Construct one per host process and share it behind an `Arc`.
pub struct CaptureRegistry {
    tabs: Mutex<Tabs>,
    debugger: Arc<dyn Debugger>,
    injector: Arc<dyn PageInjector>,
    store: Arc<dyn LogStore>,
    notifier: Notifier,
    config: CaptureConfig,
    persist_lock: tokio::sync::Mutex<()>,
}

impl fmt::Debug for CaptureRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureRegistry")
            .field("tabs", &self.tabs.lock().records.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CaptureRegistry {
    /// Creates an empty registry wired to its collaborators.
    #[must_use]
    pub fn new(
        config: CaptureConfig,
        debugger: Arc<dyn Debugger>,
        injector: Arc<dyn PageInjector>,
        store: Arc<dyn LogStore>,
    ) -> Self {
        Self {
            tabs: Mutex::new(Tabs::default()),
            debugger,
            injector,
            store,
            notifier: Notifier::new(config.notification_capacity),
            config,
            persist_lock: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Subscribes to user-visible notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    /// Begins capturing `tab`.
    ///
    /// # Errors
    ///
    /// - `TabLookup` if the tab's URL cannot be resolved
    /// - `RestrictedPage` for browser-internal URLs (no state is created)
    /// - `AttachFailed` if the debugging session cannot be established (the
    ///   tab stays idle)
    pub async fn start(&self, tab: TabId) -> Result<StartOutcome, CaptureError> {
        let url = match self.debugger.tab_url(tab).await {
            Ok(url) => url,
            Err(source) => {
                self.notifier
                    .error(tab, format!("Cannot start console capture: {source}"));
                return Err(CaptureError::TabLookup { tab, source });
            }
        };

        if self.config.is_restricted(&url) {
            warn!(%tab, %url, "refusing to capture a browser-internal page");
            self.notifier.warning(
                tab,
                "Console capture is not available on browser-internal pages",
            );
            return Err(CaptureError::RestrictedPage { url });
        }

        let (generation, already_attached) = {
            let mut tabs = self.tabs.lock();
            let record = tabs.record(tab);
            if record.attaching {
                debug!(%tab, "attach already in flight");
                return Ok(StartOutcome::AlreadyAttaching);
            }
            if !record.attached {
                record.attaching = true;
            }
            (record.generation, record.attached)
        };

        if already_attached {
            let reinjected = self.inject_stage(tab, generation, true).await;
            if !reinjected {
                warn!(%tab, "debugger already attached");
            }
            return Ok(StartOutcome::AlreadyAttached { reinjected });
        }

        debug!(%tab, version = %self.config.protocol_version, "attaching debugger");
        if let Err(source) = self
            .debugger
            .attach(tab, &self.config.protocol_version)
            .await
        {
            if let Some(record) = self.tabs.lock().current(tab, generation) {
                record.attaching = false;
            }
            error!(%tab, error = %source, "failed to attach debugger");
            self.notifier
                .error(tab, format!("Failed to attach debugger: {source}"));
            return Err(CaptureError::AttachFailed { tab, source });
        }

        let confirmed = self
            .tabs
            .lock()
            .current(tab, generation)
            .map(|record| {
                record.attaching = false;
                record.attached = true;
            })
            .is_some();
        if !confirmed {
            debug!(%tab, "tab stopped or closed during attach, releasing session");
            if let Err(e) = self.debugger.detach(tab).await {
                debug!(%tab, error = %e, "releasing superseded session failed");
            }
            return Ok(StartOutcome::Superseded);
        }

        if let Err(e) = self
            .debugger
            .enable_domains(tab, &self.config.domains)
            .await
        {
            warn!(%tab, error = %e, "failed to enable protocol domains");
        }

        let subscribe = self.tabs.lock().current(tab, generation).map(|record| {
            record.is_capturing = true;
            !std::mem::replace(&mut record.sink_registered, true)
        });
        let Some(subscribe) = subscribe else {
            // Whoever moved the generation saw `attached` and released the session.
            debug!(%tab, "tab stopped or closed while enabling domains");
            return Ok(StartOutcome::Superseded);
        };
        if subscribe {
            if let Err(e) = self.debugger.subscribe(tab).await {
                warn!(%tab, error = %e, "failed to subscribe to protocol events");
                if let Some(record) = self.tabs.lock().current(tab, generation) {
                    record.sink_registered = false;
                }
            }
        }

        self.inject_stage(tab, generation, false).await;
        self.seed_stage(tab, generation).await;

        if self.tabs.lock().current(tab, generation).is_none() {
            return Ok(StartOutcome::Superseded);
        }

        info!(%tab, %url, "console capture started");
        self.notifier.info(tab, "Console capture started");
        Ok(StartOutcome::Started)
    }

    /// Places the shim if the tab's `injected` bit is clear. Returns true if
    /// an injection was attempted.
    async fn inject_stage(&self, tab: TabId, generation: u64, require_capturing: bool) -> bool {
        let inject = self
            .tabs
            .lock()
            .current(tab, generation)
            .filter(|record| !require_capturing || record.is_capturing)
            .is_some_and(|record| !std::mem::replace(&mut record.injected, true));
        if !inject {
            return false;
        }

        debug!(%tab, "injecting capture shim");
        if let Err(e) = self.injector.inject(tab).await {
            warn!(%tab, error = %e, "shim injection failed, continuing with protocol events only");
            self.notifier.warning(
                tab,
                format!("Page script injection failed, only protocol events will be captured: {e}"),
            );
            if let Some(record) = self.tabs.lock().current(tab, generation) {
                record.injected = false;
            }
        }
        true
    }

    /// Loads persisted logs once per capture session. Entries that arrived
    /// while the load was in flight are kept after the stored ones; writes
    /// are held back until the merge so they cannot overwrite the stored
    /// buffer first. A clear issued during the load discards what was loaded.
    async fn seed_stage(&self, tab: TabId, generation: u64) {
        let clears = self
            .tabs
            .lock()
            .current(tab, generation)
            .and_then(|record| {
                record.seeding = !std::mem::replace(&mut record.seeded, true);
                record.seeding.then_some(record.clears)
            });
        let Some(clears) = clears else {
            return;
        };

        let loaded = self.store.load(tab).await;
        let arrived = {
            let mut tabs = self.tabs.lock();
            let Some(record) = tabs.current(tab, generation) else {
                return;
            };
            record.seeding = false;
            match loaded {
                Ok(_) if record.clears != clears => {
                    debug!(%tab, "logs cleared while loading, stored entries dropped");
                    record.logs.len()
                }
                Ok(stored) => {
                    let arrived = std::mem::replace(&mut record.logs, stored);
                    let count = arrived.len();
                    record.logs.extend(arrived);
                    debug!(%tab, count = record.logs.len(), "seeded log buffer from store");
                    count
                }
                Err(e) => {
                    warn!(%tab, error = %e, "failed to load persisted logs");
                    record.logs.len()
                }
            }
        };
        if arrived > 0 {
            self.persist(tab).await;
        }
    }

    /// Ends capture on `tab` and discards its logs.
    ///
    /// # Errors
    ///
    /// Returns `DetachFailed` when detach fails for a reason other than the
    /// session already being gone. The tab is idle either way.
    pub async fn stop(&self, tab: TabId) -> Result<StopOutcome, CaptureError> {
        let (generation, was_attached, subscribed, abandoned) = {
            let mut tabs = self.tabs.lock();
            let generation = tabs.next_generation();
            let Some(record) = tabs.records.get_mut(&tab) else {
                return Ok(StopOutcome::NotCapturing);
            };
            if !record.is_capturing && !record.attaching && !record.attached {
                return Ok(StopOutcome::NotCapturing);
            }
            if !record.is_capturing {
                // A start is between attach and capture. Cut it off here so
                // none of its remaining stages apply.
                debug!(%tab, attached = record.attached, "abandoning in-flight start");
                let attached = std::mem::take(&mut record.attached);
                record.attaching = false;
                record.generation = generation;
                (generation, attached, false, true)
            } else {
                let subscribed = record.sink_registered;
                record.is_capturing = false;
                record.attaching = false;
                record.injected = false;
                record.sink_registered = false;
                record.seeded = false;
                record.seeding = false;
                record.generation = generation;
                record.logs.clear();
                (generation, record.attached, subscribed, false)
            }
        };

        let detached = if was_attached {
            self.debugger.detach(tab).await
        } else {
            Ok(())
        };
        if subscribed {
            self.debugger.unsubscribe(tab).await;
        }
        if let Some(record) = self.tabs.lock().current(tab, generation) {
            record.attached = false;
        }

        if abandoned {
            if let Err(e) = detached {
                debug!(%tab, error = %e, "releasing abandoned session failed");
            }
            return Ok(StopOutcome::Abandoned);
        }
        self.remove_persisted(tab).await;

        match detached {
            Ok(()) => {}
            Err(e) if e.is_not_attached() => debug!(%tab, "debugger was already detached"),
            Err(source) => {
                error!(%tab, error = %source, "failed to detach debugger, tab forced idle");
                self.notifier
                    .error(tab, format!("Failed to detach debugger: {source}"));
                return Err(CaptureError::DetachFailed { tab, source });
            }
        }

        info!(%tab, "console capture stopped");
        self.notifier.info(tab, "Console capture stopped");
        Ok(if was_attached {
            StopOutcome::Stopped
        } else {
            StopOutcome::CaptureFlagCleared
        })
    }

    /// Starts or stops capture and reports the resulting status. A start
    /// still in flight counts as on, so toggling it abandons it.
    ///
    /// # Errors
    ///
    /// Propagates the error of the transition that ran.
    pub async fn toggle(&self, tab: TabId) -> Result<CaptureStatus, CaptureError> {
        let status = self.status(tab);
        if status.is_capturing || status.attaching || status.attached {
            self.stop(tab).await?;
        } else {
            self.start(tab).await?;
        }
        Ok(self.status(tab))
    }

    /// Re-arms attach and injection after a navigation discarded the page
    /// context. Returns `Ok(None)` when the tab is not capturing.
    ///
    /// # Errors
    ///
    /// Propagates `start` errors.
    pub async fn on_navigation_complete(
        &self,
        tab: TabId,
    ) -> Result<Option<StartOutcome>, CaptureError> {
        let capturing = self
            .tabs
            .lock()
            .records
            .get_mut(&tab)
            .filter(|record| record.is_capturing)
            .map(|record| record.injected = false)
            .is_some();
        if !capturing {
            return Ok(None);
        }
        debug!(%tab, "navigation completed, re-arming capture");
        self.start(tab).await.map(Some)
    }

    /// Stops a capturing tab that started (re)loading and arms a one-shot
    /// restart for its load-complete notification. Returns true if armed.
    ///
    /// # Errors
    ///
    /// Propagates `stop` errors. The restart is armed regardless.
    pub async fn on_tab_loading(&self, tab: TabId) -> Result<bool, CaptureError> {
        if !self.is_capturing(tab) {
            return Ok(false);
        }
        let stopped = self.stop(tab).await;
        if let Some(record) = self.tabs.lock().records.get_mut(&tab) {
            record.restart_on_complete = true;
        }
        debug!(%tab, "tab loading, restart deferred until load completes");
        stopped.map(|_| true)
    }

    /// Fires the restart armed by [`on_tab_loading`](Self::on_tab_loading).
    ///
    /// # Errors
    ///
    /// Propagates `start` errors.
    pub async fn on_tab_complete(&self, tab: TabId) -> Result<Option<StartOutcome>, CaptureError> {
        let restart = self
            .tabs
            .lock()
            .records
            .get_mut(&tab)
            .is_some_and(|record| std::mem::take(&mut record.restart_on_complete));
        if !restart {
            return Ok(None);
        }
        self.start(tab).await.map(Some)
    }

    /// Restarts a tab whose session was lost while capture stayed requested.
    ///
    /// # Errors
    ///
    /// Propagates `start` errors.
    pub async fn on_tab_activated(&self, tab: TabId) -> Result<Option<StartOutcome>, CaptureError> {
        let dropped = self
            .tabs
            .lock()
            .records
            .get(&tab)
            .is_some_and(|record| record.is_capturing && !record.attached && !record.attaching);
        if !dropped {
            return Ok(None);
        }
        debug!(%tab, "activated tab lost its debugger session, reattaching");
        self.start(tab).await.map(Some)
    }

    /// Records that the debugging session dropped underneath a capture.
    pub async fn on_attach_lost(&self, tab: TabId) {
        let subscribed = {
            let mut tabs = self.tabs.lock();
            let Some(record) = tabs.records.get_mut(&tab).filter(|r| r.attached) else {
                return;
            };
            record.attached = false;
            record.injected = false;
            std::mem::replace(&mut record.sink_registered, false)
        };
        if subscribed {
            self.debugger.unsubscribe(tab).await;
        }
        warn!(%tab, "debugger session lost");
        self.notifier.warning(
            tab,
            "Debugger detached; capture resumes when the tab is activated",
        );
    }

    /// Forgets a closed tab and deletes its persisted logs.
    pub async fn on_tab_closed(&self, tab: TabId) {
        let removed = self.tabs.lock().records.remove(&tab);
        if let Some(record) = removed.filter(|record| record.attached) {
            let debugger = Arc::clone(&self.debugger);
            tokio::spawn(async move {
                if record.sink_registered {
                    debugger.unsubscribe(tab).await;
                }
                if let Err(e) = debugger.detach(tab).await {
                    debug!(%tab, error = %e, "detach after tab close failed");
                }
            });
        }
        self.remove_persisted(tab).await;
        debug!(%tab, "tab closed, state discarded");
    }

    /// Appends an entry to a capturing tab and persists the buffer.
    ///
    /// Returns false (and writes nothing) when the tab is not capturing.
    pub async fn append(&self, tab: TabId, entry: LogEntry) -> bool {
        {
            let mut tabs = self.tabs.lock();
            let Some(record) = tabs.records.get_mut(&tab).filter(|r| r.is_capturing) else {
                trace!(%tab, "dropping entry for tab that is not capturing");
                return false;
            };
            record.logs.push(entry);
        }
        self.persist(tab).await;
        true
    }

    /// Empties the buffer and the persisted logs, leaving capture running.
    /// Untracked tabs are left alone. Returns true if the tab was tracked.
    pub async fn clear_logs(&self, tab: TabId) -> bool {
        {
            let mut tabs = self.tabs.lock();
            let Some(record) = tabs.records.get_mut(&tab) else {
                trace!(%tab, "clear requested for untracked tab");
                return false;
            };
            record.logs.clear();
            record.clears += 1;
        }
        {
            let _guard = self.persist_lock.lock().await;
            if let Err(e) = self.store.save(tab, &[]).await {
                warn!(%tab, error = %e, "failed to clear persisted logs");
            }
        }
        self.notifier
            .publish(tab, NotificationKind::LogsCleared, "Logs cleared");
        true
    }

    #[must_use]
    pub fn status(&self, tab: TabId) -> CaptureStatus {
        self.tabs
            .lock()
            .records
            .get(&tab)
            .map(TabRecord::status)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_capturing(&self, tab: TabId) -> bool {
        self.status(tab).is_capturing
    }

    /// Snapshot of the tab's buffer in arrival order.
    #[must_use]
    pub fn logs(&self, tab: TabId) -> Vec<LogEntry> {
        self.tabs
            .lock()
            .records
            .get(&tab)
            .map(|record| record.logs.clone())
            .unwrap_or_default()
    }

    /// Returns true if a record exists for `tab`.
    #[must_use]
    pub fn is_tracked(&self, tab: TabId) -> bool {
        self.tabs.lock().records.contains_key(&tab)
    }

    /// Writes the buffer as it is now. Writes are serialized so the last
    /// completed write always holds the newest buffer.
    async fn persist(&self, tab: TabId) {
        let _guard = self.persist_lock.lock().await;
        let snapshot = match self.tabs.lock().records.get(&tab) {
            Some(record) if record.is_capturing && !record.seeding => record.logs.clone(),
            _ => return,
        };
        if let Err(e) = self.store.save(tab, &snapshot).await {
            warn!(%tab, error = %e, "failed to persist logs");
        }
    }

    async fn remove_persisted(&self, tab: TabId) {
        let _guard = self.persist_lock.lock().await;
        if let Err(e) = self.store.remove(tab).await {
            warn!(%tab, error = %e, "failed to delete persisted logs");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_get_distinct_generations() {
        let mut tabs = Tabs::default();
        let first = tabs.record(TabId(1)).generation;
        let second = tabs.record(TabId(2)).generation;
        assert_ne!(first, second);
        assert_eq!(tabs.record(TabId(1)).generation, first);
    }

    #[test]
    fn stale_generation_hides_record() {
        let mut tabs = Tabs::default();
        let generation = tabs.record(TabId(1)).generation;
        assert!(tabs.current(TabId(1), generation).is_some());

        let next = tabs.next_generation();
        tabs.record(TabId(1)).generation = next;
        assert!(tabs.current(TabId(1), generation).is_none());
    }

    #[test]
    fn phase_follows_flags() {
        let mut status = CaptureStatus::default();
        assert_eq!(status.phase(), CapturePhase::Idle);
        status.attaching = true;
        assert_eq!(status.phase(), CapturePhase::Attaching);
        status = CaptureStatus {
            is_capturing: true,
            attached: true,
            attaching: false,
        };
        assert_eq!(status.phase(), CapturePhase::Capturing);
    }
}
