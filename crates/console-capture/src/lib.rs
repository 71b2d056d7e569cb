//! # console-capture
//!
//! Per-tab browser console capture and classification over the Chrome
//! DevTools Protocol.
//!
//! The crate receives raw console activity from two independent producers
//! (the debugging protocol and an in-page shim), normalizes every record into
//! one [`LogEntry`] model, labels it with a fixed [`Category`] taxonomy and
//! keeps a per-tab buffer across navigation, reload and tab lifecycle events.
//!
//! ## Architecture
//!
//! - **classify**: pure `(level, text) -> Category` heuristics
//! - **normalize**: one exhaustive match over every raw producer shape
//! - **CaptureRegistry**: the per-tab capture state machine
//! - **Router**: the boundary dispatcher for UI requests, shim messages,
//!   protocol events and tab notifications
//! - **Debugger / PageInjector / LogStore**: collaborator seams, implemented
//!   by [`CdpHost`] (chromiumoxide), [`MemoryStore`] and [`RedbStore`]
//!
//! ## Example Usage
//!
//! ```ignore
//! use console_capture::{CaptureConfig, CaptureRegistry, CdpHost, CdpHostConfig, Request, Router};
//! use std::sync::Arc;
//!
//! let config = CaptureConfig::load(None)?;
//! let (tx, rx) = tokio::sync::mpsc::channel(256);
//! let host = Arc::new(CdpHost::launch(CdpHostConfig::default(), tx).await?);
//! let store = config.store.open()?;
//! let registry = Arc::new(CaptureRegistry::new(config, host.clone(), host.clone(), store));
//! let router = Router::new(registry);
//!
//! let tab = host.open_tab("https://example.com").await?;
//! router.handle_request(Request::ToggleCapture { tab_id: tab }).await;
//! tokio::spawn({
//!     let router = router.clone();
//!     async move { router.run(rx).await }
//! });
//! ```
//!
//! ## Testing Strategy
//!
//! 1. **Unit tests**: classification, normalization and decoding, in-module
//! 2. **Integration tests**: registry and router driven by a scripted fake host
//! 3. **Browser tests**: real Chrome, `#[ignore]`d (`cargo test -- --ignored`)

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cdp;
pub mod classify;
pub mod config;
pub mod entry;
pub mod error;
pub mod event;
pub mod host;
pub mod normalize;
pub mod notify;
pub mod registry;
pub mod router;
pub mod shim;
pub mod store;

// Re-export main types for convenience
pub use cdp::{CdpHost, CdpHostConfig, SUPPORTED_PROTOCOL_VERSION};
pub use classify::classify;
pub use config::{CaptureConfig, StoreBackend, StoreConfig};
pub use entry::{Category, Level, LogEntry};
pub use error::{CaptureError, ConfigError, EventError, HostError, Result, StoreError};
pub use event::{RawEvent, RemoteObject, ShimMessage};
pub use host::{Debugger, Domain, Inbound, PageInjector, TabEvent, TabId};
pub use normalize::normalize;
pub use notify::{Notification, NotificationKind, Notifier};
pub use registry::{CapturePhase, CaptureRegistry, CaptureStatus, StartOutcome, StopOutcome};
pub use router::{Request, Response, Router, ShimAck};
pub use store::{LogStore, MemoryStore, RedbStore};
