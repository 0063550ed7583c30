//! Configuration data structures.
//!
//! Every field has a serde default so a partial YAML file (or none at all)
//! yields a usable configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database and connection pool settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// HTTP export surface.
    #[serde(default)]
    pub server: ServerConfig,
}

// ---------------------------------------------------------------------------
// StoreConfig
// ---------------------------------------------------------------------------

/// How the SQLite database is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database file, or `:memory:`.
    #[serde(default = "default_path")]
    pub path: PathBuf,

    /// Number of pooled connections. Forced to 1 for `:memory:`.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// SQLite `busy_timeout` in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// How long a caller waits for a free pooled connection, in
    /// milliseconds, before failing with [`crate::GraphError::Pool`].
    #[serde(default = "default_checkout_timeout_ms")]
    pub checkout_timeout_ms: u64,

    /// Use the write-ahead log so readers proceed during a write.
    #[serde(default = "default_true")]
    pub wal: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            pool_size: default_pool_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
            checkout_timeout_ms: default_checkout_timeout_ms(),
            wal: true,
        }
    }
}

impl StoreConfig {
    /// In-memory store with a single connection, mostly for tests.
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::from(":memory:"),
            pool_size: 1,
            ..Self::default()
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == ":memory:"
    }
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address for `serve`.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_path() -> PathBuf {
    PathBuf::from(".data/app.data")
}

fn default_pool_size() -> usize {
    10
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_checkout_timeout_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}
