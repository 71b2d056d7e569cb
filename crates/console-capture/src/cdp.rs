//! Chrome host backed by chromiumoxide.
//!
//! [`CdpHost`] launches Chrome, tracks the tabs it opened and implements the
//! [`Debugger`] and [`PageInjector`] seams against them. Attaching a tab
//! spawns one listener task per protocol event; while the tab is subscribed,
//! each event is serialized back into its protocol `(method, params)` shape
//! and pushed to the router's inbound channel.
//!
//! # Resource Safety
//!
//! Dropping the host drops the chromiumoxide `Browser`, which kills the Chrome
//! process. Prefer calling [`CdpHost::close`] for a graceful shutdown.

use crate::error::{HostError, Result};
use crate::event::{CONSOLE_MESSAGE_ADDED, LOG_ENTRY_ADDED, RUNTIME_EXCEPTION_THROWN};
use crate::host::{Debugger, Domain, Inbound, PageInjector, TabEvent, TabId};
use crate::shim::{decode_binding_payload, shim_script, BINDING_NAME, UNINSTALL_SCRIPT};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::inspector::EventTargetCrashed;
use chromiumoxide::cdp::browser_protocol::log::{self, EventEntryAdded};
use chromiumoxide::cdp::browser_protocol::network;
use chromiumoxide::cdp::browser_protocol::page::EventLoadEventFired;
use chromiumoxide::cdp::js_protocol::runtime::{
    self, AddBindingParams, ConsoleApiCalledType, EventBindingCalled, EventConsoleApiCalled,
    EventExceptionThrown,
};
use chromiumoxide::page::Page;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Protocol version this host speaks.
pub const SUPPORTED_PROTOCOL_VERSION: &str = "1.3";

/// Configuration for launching the capture browser.
#[derive(Debug, Clone)]
pub struct CdpHostConfig {
    /// Run in headless mode (default: true unless the `visible` feature is on).
    pub headless: bool,

    /// Browser window size (default: 1280x800).
    pub window_size: (u32, u32),

    /// Additional Chrome arguments.
    pub args: Vec<String>,

    /// Chrome executable path (None = auto-detect).
    pub chrome_path: Option<String>,
}

impl CdpHostConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shows the browser window.
    #[must_use]
    pub fn visible(mut self) -> Self {
        self.headless = false;
        self
    }

    #[must_use]
    pub fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.window_size = (width, height);
        self
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args.extend(args);
        self
    }

    #[must_use]
    pub fn with_chrome_path(mut self, path: impl Into<String>) -> Self {
        self.chrome_path = Some(path.into());
        self
    }

    #[allow(clippy::result_large_err)]
    fn to_browser_config(&self) -> Result<BrowserConfig> {
        let mut config = BrowserConfig::builder();

        if self.headless {
            config = config.arg("--headless");
        }

        config = config.arg(format!(
            "--window-size={},{}",
            self.window_size.0, self.window_size.1
        ));

        // One profile per launch so concurrent hosts never share a
        // ProcessSingleton lock.
        let user_data_dir =
            std::env::temp_dir().join(format!("console-capture-{}", uuid::Uuid::new_v4()));
        config = config.arg(format!("--user-data-dir={}", user_data_dir.display()));

        for arg in &self.args {
            config = config.arg(arg.clone());
        }

        if let Some(path) = &self.chrome_path {
            config = config.chrome_executable(path.clone());
        }

        config.build().map_err(|e| HostError::LaunchFailed {
            reason: format!("invalid browser configuration: {e}"),
            source: None,
        })
    }
}

impl Default for CdpHostConfig {
    fn default() -> Self {
        Self {
            headless: !cfg!(feature = "visible"),
            window_size: (1280, 800),
            args: vec![
                // Needed where user namespaces are unavailable (containers, CI).
                "--no-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
            ],
            chrome_path: None,
        }
    }
}

#[derive(Debug)]
struct Session {
    forward: Arc<AtomicBool>,
    listeners: Vec<JoinHandle<()>>,
}

impl Session {
    fn abort(&self) {
        for listener in &self.listeners {
            listener.abort();
        }
    }
}

#[derive(Debug)]
struct TabHandle {
    page: Page,
    session: Option<Session>,
}

/// A Chrome instance driven over the DevTools Protocol.
pub struct CdpHost {
    browser: tokio::sync::Mutex<Option<Browser>>,
    tabs: Mutex<HashMap<TabId, TabHandle>>,
    next_tab: AtomicU64,
    events: mpsc::Sender<Inbound>,
}

impl std::fmt::Debug for CdpHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdpHost")
            .field("tabs", &self.tabs.lock().len())
            .finish_non_exhaustive()
    }
}

impl CdpHost {
    /// Launches Chrome. Inbound traffic for attached tabs is sent on `events`.
    ///
    /// # Errors
    ///
    /// Returns `LaunchFailed` if Chrome is not installed, not executable, or
    /// fails to start.
    pub async fn launch(config: CdpHostConfig, events: mpsc::Sender<Inbound>) -> Result<Self> {
        debug!(?config, "launching browser");

        let browser_config = config.to_browser_config()?;
        let (browser, mut handler) =
            Browser::launch(browser_config)
                .await
                .map_err(|e| HostError::LaunchFailed {
                    reason: "failed to launch Chrome process".to_string(),
                    source: Some(Box::new(e)),
                })?;

        // The handler must be polled for any CDP traffic to flow.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("browser handler error: {}", e);
                }
            }
        });

        debug!("browser launched");
        Ok(Self {
            browser: tokio::sync::Mutex::new(Some(browser)),
            tabs: Mutex::new(HashMap::new()),
            next_tab: AtomicU64::new(1),
            events,
        })
    }

    /// Opens a new tab on `url`.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyClosed` after [`close`](Self::close), or the browser's
    /// error if the tab cannot be created.
    pub async fn open_tab(&self, url: &str) -> Result<TabId> {
        let page = {
            let browser = self.browser.lock().await;
            let browser = browser.as_ref().ok_or(HostError::AlreadyClosed)?;
            browser.new_page(url).await?
        };

        let tab = TabId(self.next_tab.fetch_add(1, Ordering::Relaxed));
        self.tabs
            .lock()
            .insert(tab, TabHandle { page, session: None });
        debug!(%tab, %url, "opened tab");
        Ok(tab)
    }

    /// Navigates an open tab.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTab` or the navigation error.
    pub async fn navigate(&self, tab: TabId, url: &str) -> Result<()> {
        let page = self.page(tab)?;
        page.goto(url).await?;
        Ok(())
    }

    /// Closes a tab and reports its removal to the router.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTab` or the browser's error.
    pub async fn close_tab(&self, tab: TabId) -> Result<()> {
        let handle = self
            .tabs
            .lock()
            .remove(&tab)
            .ok_or(HostError::UnknownTab(tab))?;
        if let Some(session) = &handle.session {
            session.abort();
        }
        handle.page.close().await?;
        self.emit(Inbound::Tab(TabEvent::Removed { tab })).await;
        Ok(())
    }

    /// Ids of every tab this host has open.
    #[must_use]
    pub fn tabs(&self) -> Vec<TabId> {
        let mut tabs: Vec<TabId> = self.tabs.lock().keys().copied().collect();
        tabs.sort();
        tabs
    }

    /// Closes the browser and kills the Chrome process.
    ///
    /// # Errors
    ///
    /// Returns an error if the browser fails to close gracefully.
    pub async fn close(&self) -> Result<()> {
        for (_, handle) in self.tabs.lock().drain() {
            if let Some(session) = &handle.session {
                session.abort();
            }
        }

        if let Some(mut browser) = self.browser.lock().await.take() {
            debug!("closing browser");
            browser.close().await?;
        }
        Ok(())
    }

    fn page(&self, tab: TabId) -> Result<Page> {
        self.tabs
            .lock()
            .get(&tab)
            .map(|handle| handle.page.clone())
            .ok_or(HostError::UnknownTab(tab))
    }

    async fn emit(&self, inbound: Inbound) {
        if self.events.send(inbound).await.is_err() {
            trace!("inbound channel closed, dropping event");
        }
    }

    async fn start_listeners(
        &self,
        tab: TabId,
        page: &Page,
        forward: &Arc<AtomicBool>,
    ) -> Result<Vec<JoinHandle<()>>> {
        let gate = Some(Arc::clone(forward));
        let tx = &self.events;

        let log_entries = page.event_listener::<EventEntryAdded>().await?;
        let console_calls = page.event_listener::<EventConsoleApiCalled>().await?;
        let exceptions = page.event_listener::<EventExceptionThrown>().await?;
        let bindings = page.event_listener::<EventBindingCalled>().await?;
        let loads = page.event_listener::<EventLoadEventFired>().await?;
        let crashes = page.event_listener::<EventTargetCrashed>().await?;

        Ok(vec![
            spawn_forwarder(log_entries, tx.clone(), gate.clone(), move |event| {
                protocol_event(tab, LOG_ENTRY_ADDED, event)
            }),
            spawn_forwarder(console_calls, tx.clone(), gate.clone(), move |event| {
                console_message(tab, event)
            }),
            spawn_forwarder(exceptions, tx.clone(), gate.clone(), move |event| {
                protocol_event(tab, RUNTIME_EXCEPTION_THROWN, event)
            }),
            spawn_forwarder(bindings, tx.clone(), gate, move |event| {
                binding_message(tab, event)
            }),
            spawn_forwarder(loads, tx.clone(), None, move |_| {
                Some(Inbound::Tab(TabEvent::NavigationCompleted { tab }))
            }),
            spawn_forwarder(crashes, tx.clone(), None, move |_| {
                Some(Inbound::Tab(TabEvent::DebuggerDetached { tab }))
            }),
        ])
    }

    fn with_session<T>(&self, tab: TabId, f: impl FnOnce(&mut Session) -> T) -> Result<T> {
        let mut tabs = self.tabs.lock();
        let handle = tabs.get_mut(&tab).ok_or(HostError::UnknownTab(tab))?;
        let session = handle
            .session
            .as_mut()
            .ok_or(HostError::NotAttached(tab))?;
        Ok(f(session))
    }
}

#[async_trait]
impl Debugger for CdpHost {
    async fn tab_url(&self, tab: TabId) -> Result<String> {
        let page = self.page(tab)?;
        Ok(page
            .url()
            .await?
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn attach(&self, tab: TabId, version: &str) -> Result<()> {
        if version != SUPPORTED_PROTOCOL_VERSION {
            return Err(HostError::UnsupportedVersion(version.to_string()));
        }

        let page = {
            let tabs = self.tabs.lock();
            let handle = tabs.get(&tab).ok_or(HostError::UnknownTab(tab))?;
            if handle.session.is_some() {
                return Err(HostError::AlreadyAttached(tab));
            }
            handle.page.clone()
        };

        let forward = Arc::new(AtomicBool::new(false));
        let listeners = self.start_listeners(tab, &page, &forward).await?;
        let session = Session { forward, listeners };

        let mut tabs = self.tabs.lock();
        match tabs.get_mut(&tab) {
            Some(handle) if handle.session.is_none() => {
                handle.session = Some(session);
                debug!(%tab, "debugger attached");
                Ok(())
            }
            Some(_) => {
                session.abort();
                Err(HostError::AlreadyAttached(tab))
            }
            None => {
                session.abort();
                Err(HostError::UnknownTab(tab))
            }
        }
    }

    async fn detach(&self, tab: TabId) -> Result<()> {
        let (page, session) = {
            let mut tabs = self.tabs.lock();
            let handle = tabs.get_mut(&tab).ok_or(HostError::NotAttached(tab))?;
            let session = handle.session.take().ok_or(HostError::NotAttached(tab))?;
            (handle.page.clone(), session)
        };
        session.abort();

        if let Err(e) = page.evaluate(UNINSTALL_SCRIPT).await {
            debug!(%tab, error = %e, "could not uninstall page shim");
        }
        debug!(%tab, "debugger detached");
        Ok(())
    }

    async fn enable_domains(&self, tab: TabId, domains: &[Domain]) -> Result<()> {
        let page = self.page(tab)?;
        for &domain in domains {
            let result = match domain {
                Domain::Log => page.execute(log::EnableParams::default()).await.map(drop),
                Domain::Runtime => page
                    .execute(runtime::EnableParams::default())
                    .await
                    .map(drop),
                Domain::Network => page
                    .execute(network::EnableParams::default())
                    .await
                    .map(drop),
                // Console calls arrive as Runtime.consoleAPICalled instead.
                Domain::Console => {
                    debug!(%tab, "Console domain covered by Runtime");
                    Ok(())
                }
            };
            result.map_err(|e| HostError::Protocol {
                command: domain.enable_command().to_string(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    async fn subscribe(&self, tab: TabId) -> Result<()> {
        self.with_session(tab, |session| {
            session.forward.store(true, Ordering::Release);
        })
    }

    async fn unsubscribe(&self, tab: TabId) {
        if self
            .with_session(tab, |session| {
                session.forward.store(false, Ordering::Release);
            })
            .is_err()
        {
            trace!(%tab, "unsubscribe on a tab without a session");
        }
    }
}

#[async_trait]
impl PageInjector for CdpHost {
    async fn inject(&self, tab: TabId) -> Result<()> {
        let page = self.page(tab)?;
        page.execute(AddBindingParams::new(BINDING_NAME))
            .await
            .map_err(|e| HostError::Injection(format!("binding: {e}")))?;

        let script = shim_script(BINDING_NAME);
        let installed = page
            .evaluate(script.as_str())
            .await
            .map_err(|e| HostError::Injection(e.to_string()))?;
        if installed.value().and_then(Value::as_bool) != Some(true) {
            return Err(HostError::Injection(
                "binding is not reachable from the page".to_string(),
            ));
        }
        Ok(())
    }
}

impl Drop for CdpHost {
    fn drop(&mut self) {
        // chromiumoxide's Browser kills the process when dropped.
        if self.browser.get_mut().is_some() {
            warn!("CdpHost dropped without explicit close() - forcing shutdown via Drop");
        }
    }
}

fn spawn_forwarder<S, T, F>(
    mut events: S,
    tx: mpsc::Sender<Inbound>,
    gate: Option<Arc<AtomicBool>>,
    convert: F,
) -> JoinHandle<()>
where
    S: Stream<Item = Arc<T>> + Unpin + Send + 'static,
    T: Send + Sync + 'static,
    F: Fn(&T) -> Option<Inbound> + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if gate
                .as_ref()
                .is_some_and(|open| !open.load(Ordering::Acquire))
            {
                continue;
            }
            let Some(inbound) = convert(&event) else {
                continue;
            };
            if tx.send(inbound).await.is_err() {
                break;
            }
        }
    })
}

fn protocol_event<T: Serialize>(tab: TabId, method: &str, event: &T) -> Option<Inbound> {
    match serde_json::to_value(event) {
        Ok(params) => Some(Inbound::Protocol {
            tab,
            method: method.to_string(),
            params,
        }),
        Err(e) => {
            warn!(%tab, method, error = %e, "could not serialize protocol event");
            None
        }
    }
}

/// Rewrites `Runtime.consoleAPICalled` into the `Console.messageAdded` shape.
fn console_message(tab: TabId, event: &EventConsoleApiCalled) -> Option<Inbound> {
    let parameters = match serde_json::to_value(&event.args) {
        Ok(parameters) => parameters,
        Err(e) => {
            warn!(%tab, error = %e, "could not serialize console arguments");
            return None;
        }
    };
    // Runtime timestamps are milliseconds; the message shape uses seconds.
    let timestamp = serde_json::to_value(&event.timestamp)
        .ok()
        .and_then(|ts| ts.as_f64())
        .map(|millis| millis / 1000.0);

    Some(Inbound::Protocol {
        tab,
        method: CONSOLE_MESSAGE_ADDED.to_string(),
        params: json!({
            "message": {
                "timestamp": timestamp,
                "level": console_level(&event.r#type),
                "parameters": parameters,
            }
        }),
    })
}

fn console_level(kind: &ConsoleApiCalledType) -> &'static str {
    match kind {
        ConsoleApiCalledType::Info => "info",
        ConsoleApiCalledType::Warning => "warning",
        ConsoleApiCalledType::Error | ConsoleApiCalledType::Assert => "error",
        ConsoleApiCalledType::Debug => "debug",
        _ => "log",
    }
}

fn binding_message(tab: TabId, event: &EventBindingCalled) -> Option<Inbound> {
    if event.name != BINDING_NAME {
        return None;
    }
    match decode_binding_payload(&event.payload) {
        Ok(payload) => Some(Inbound::Shim {
            sender: Some(tab),
            payload,
        }),
        Err(e) => {
            warn!(%tab, error = %e, "dropping binding call");
            None
        }
    }
}
