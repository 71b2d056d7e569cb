//! Capture configuration with multi-source loading.
//!
//! Priority: environment (`CONSOLE_CAPTURE_*`) > TOML file > defaults.
//! Nested keys use a double underscore, e.g. `CONSOLE_CAPTURE_STORE__BACKEND=redb`.

use crate::error::{ConfigError, StoreError};
use crate::host::Domain;
use crate::store::{LogStore, MemoryStore, RedbStore};
use figment::{
    providers::{Env, Format as _, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "console-capture.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "CONSOLE_CAPTURE_";

/// Persistence backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Redb,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    /// Database file for the `redb` backend.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_store_path(),
        }
    }
}

impl StoreConfig {
    /// Opens the configured backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the redb database cannot be opened.
    pub fn open(&self) -> Result<Arc<dyn LogStore>, StoreError> {
        Ok(match self.backend {
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
            StoreBackend::Redb => Arc::new(RedbStore::open(&self.path)?),
        })
    }
}

/// Capture configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaptureConfig {
    /// Debugging protocol version requested on attach.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,

    /// URL prefixes on which capture is refused.
    #[serde(default = "default_restricted_schemes")]
    pub restricted_schemes: Vec<String>,

    /// Domains enabled after attach.
    #[serde(default = "default_domains")]
    pub domains: Vec<Domain>,

    /// Per-subscriber backlog of the notification channel.
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,

    #[serde(default)]
    pub store: StoreConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            protocol_version: default_protocol_version(),
            restricted_schemes: default_restricted_schemes(),
            domains: default_domains(),
            notification_capacity: default_notification_capacity(),
            store: StoreConfig::default(),
        }
    }
}

impl CaptureConfig {
    /// Loads configuration from defaults, an optional TOML file and the
    /// environment.
    ///
    /// When `path` is `None`, `console-capture.toml` in the working directory
    /// is used if it exists.
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` when a source holds a value of the wrong type.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::figment(path).extract().map_err(ConfigError::from)
    }

    /// The layered figment behind [`CaptureConfig::load`].
    #[must_use]
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        let config_file = path.map(Path::to_path_buf).or_else(|| {
            let default_path = Path::new(DEFAULT_CONFIG_FILE);
            default_path.exists().then(|| default_path.to_path_buf())
        });

        if let Some(file) = config_file {
            figment = figment.merge(Toml::file(file));
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Returns true if capture must be refused on `url`.
    #[must_use]
    pub fn is_restricted(&self, url: &str) -> bool {
        let url = url.trim_start();
        self.restricted_schemes.iter().any(|scheme| {
            url.get(..scheme.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
        })
    }
}

fn default_protocol_version() -> String {
    "1.3".to_string()
}

fn default_restricted_schemes() -> Vec<String> {
    ["chrome://", "chrome-extension://", "about:", "devtools://", "edge://"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_domains() -> Vec<Domain> {
    vec![Domain::Log, Domain::Console, Domain::Runtime, Domain::Network]
}

fn default_backend() -> StoreBackend {
    StoreBackend::Memory
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".console-capture/logs.redb")
}

fn default_notification_capacity() -> usize {
    64
}
