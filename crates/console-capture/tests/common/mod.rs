//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use console_capture::{
    CaptureConfig, CaptureRegistry, Category, Debugger, Domain, HostError, Level, LogEntry,
    LogStore, MemoryStore, Notification, PageInjector, Router, StoreError, TabId,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Notify};

pub const PAGE_URL: &str = "https://example.com/app";

/// A collaborator call, recorded in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    TabUrl(TabId),
    Attach(TabId),
    Detach(TabId),
    EnableDomains(TabId),
    Subscribe(TabId),
    Unsubscribe(TabId),
    Inject(TabId),
}

/// How the next detaches fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachFailure {
    /// The session is reported as already gone.
    NotAttached,
    /// The browser rejects the command.
    Protocol,
}

#[derive(Debug, Default)]
struct FakeState {
    urls: HashMap<TabId, String>,
    attached: HashSet<TabId>,
    subscribed: HashSet<TabId>,
    calls: Vec<Call>,
    fail_attach: bool,
    fail_inject: bool,
    fail_detach: Option<DetachFailure>,
}

/// In-process stand-in for the browser.
#[derive(Debug, Default)]
pub struct FakeHost {
    state: Mutex<FakeState>,
    attach_gate: Mutex<Option<Arc<Notify>>>,
    enable_gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_url(&self, tab: TabId, url: &str) {
        self.state.lock().urls.insert(tab, url.to_string());
    }

    pub fn fail_attach(&self, fail: bool) {
        self.state.lock().fail_attach = fail;
    }

    pub fn fail_inject(&self, fail: bool) {
        self.state.lock().fail_inject = fail;
    }

    pub fn fail_detach(&self, failure: Option<DetachFailure>) {
        self.state.lock().fail_detach = failure;
    }

    /// Makes every following attach wait until the returned handle is
    /// notified.
    pub fn hold_attach(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.attach_gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    /// Makes every following domain enable wait until the returned handle is
    /// notified. The session is already attached at that point.
    pub fn hold_enable(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.enable_gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    /// Drops the session as if the target crashed.
    pub fn lose_session(&self, tab: TabId) {
        let mut state = self.state.lock();
        state.attached.remove(&tab);
        state.subscribed.remove(&tab);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, call: Call) -> usize {
        self.state.lock().calls.iter().filter(|c| **c == call).count()
    }

    pub fn is_attached(&self, tab: TabId) -> bool {
        self.state.lock().attached.contains(&tab)
    }

    pub fn is_subscribed(&self, tab: TabId) -> bool {
        self.state.lock().subscribed.contains(&tab)
    }

    fn record(&self, call: Call) {
        self.state.lock().calls.push(call);
    }
}

#[async_trait]
impl Debugger for FakeHost {
    async fn tab_url(&self, tab: TabId) -> console_capture::Result<String> {
        self.record(Call::TabUrl(tab));
        Ok(self
            .state
            .lock()
            .urls
            .get(&tab)
            .cloned()
            .unwrap_or_else(|| PAGE_URL.to_string()))
    }

    async fn attach(&self, tab: TabId, version: &str) -> console_capture::Result<()> {
        self.record(Call::Attach(tab));
        let gate = self.attach_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut state = self.state.lock();
        if version != "1.3" {
            return Err(HostError::UnsupportedVersion(version.to_string()));
        }
        if state.fail_attach {
            return Err(HostError::Protocol {
                command: "attach".to_string(),
                reason: "Another debugger is already attached".to_string(),
            });
        }
        if !state.attached.insert(tab) {
            return Err(HostError::AlreadyAttached(tab));
        }
        Ok(())
    }

    async fn detach(&self, tab: TabId) -> console_capture::Result<()> {
        self.record(Call::Detach(tab));
        let mut state = self.state.lock();
        match state.fail_detach {
            Some(DetachFailure::NotAttached) => return Err(HostError::NotAttached(tab)),
            Some(DetachFailure::Protocol) => {
                return Err(HostError::Protocol {
                    command: "detach".to_string(),
                    reason: "target busy".to_string(),
                });
            }
            None => {}
        }
        if !state.attached.remove(&tab) {
            return Err(HostError::NotAttached(tab));
        }
        Ok(())
    }

    async fn enable_domains(&self, tab: TabId, _domains: &[Domain]) -> console_capture::Result<()> {
        self.record(Call::EnableDomains(tab));
        let gate = self.enable_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(())
    }

    async fn subscribe(&self, tab: TabId) -> console_capture::Result<()> {
        self.record(Call::Subscribe(tab));
        self.state.lock().subscribed.insert(tab);
        Ok(())
    }

    async fn unsubscribe(&self, tab: TabId) {
        self.record(Call::Unsubscribe(tab));
        self.state.lock().subscribed.remove(&tab);
    }
}

#[async_trait]
impl PageInjector for FakeHost {
    async fn inject(&self, tab: TabId) -> console_capture::Result<()> {
        self.record(Call::Inject(tab));
        if self.state.lock().fail_inject {
            return Err(HostError::Injection("Cannot access contents of the page".to_string()));
        }
        Ok(())
    }
}

/// Memory store that counts writes and can hold loads.
#[derive(Debug, Default)]
pub struct CountingStore {
    pub inner: MemoryStore,
    saves: AtomicUsize,
    load_gate: Mutex<Option<Arc<Notify>>>,
}

impl CountingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Makes every following load wait until the returned handle is notified.
    pub fn hold_load(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.load_gate.lock() = Some(Arc::clone(&gate));
        gate
    }
}

#[async_trait]
impl LogStore for CountingStore {
    async fn load(&self, tab: TabId) -> Result<Vec<LogEntry>, StoreError> {
        let gate = self.load_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.inner.load(tab).await
    }

    async fn save(&self, tab: TabId, logs: &[LogEntry]) -> Result<(), StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(tab, logs).await
    }

    async fn remove(&self, tab: TabId) -> Result<(), StoreError> {
        self.inner.remove(tab).await
    }
}

/// A registry and router wired to fakes.
pub struct Harness {
    pub host: Arc<FakeHost>,
    pub store: Arc<CountingStore>,
    pub registry: Arc<CaptureRegistry>,
    pub router: Router,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }

    /// Builds a harness over an existing store, as after a process restart.
    pub fn with_store(store: MemoryStore) -> Self {
        let host = Arc::new(FakeHost::new());
        let store = Arc::new(CountingStore::new(store));
        let registry = Arc::new(CaptureRegistry::new(
            CaptureConfig::default(),
            host.clone(),
            host.clone(),
            store.clone(),
        ));
        let router = Router::new(Arc::clone(&registry));
        Self {
            host,
            store,
            registry,
            router,
        }
    }
}

pub fn entry(text: &str) -> LogEntry {
    LogEntry::new(chrono::Utc::now(), Level::Log, Category::Log, text)
}

/// Everything published so far.
pub fn drain(rx: &mut broadcast::Receiver<Notification>) -> Vec<Notification> {
    let mut notifications = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        notifications.push(notification);
    }
    notifications
}

/// Yields until `condition` holds, giving spawned tasks a chance to run.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::task::yield_now().await;
    }
    condition()
}
