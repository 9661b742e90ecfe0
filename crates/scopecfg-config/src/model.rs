//! Configuration schema for scopecfg.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root config for a scopecfg deployment.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScopecfgConfig {
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl ScopecfgConfig {
    /// Start building a config programmatically with defaults applied.
    pub fn builder() -> ScopecfgConfigBuilder {
        ScopecfgConfigBuilder::new()
    }
}

/// Builder for assembling a `ScopecfgConfig` in code.
#[derive(Debug, Default, Clone)]
pub struct ScopecfgConfigBuilder {
    config: ScopecfgConfig,
}

impl ScopecfgConfigBuilder {
    /// Create a new builder seeded with default config values.
    pub fn new() -> Self {
        Self {
            config: ScopecfgConfig::default(),
        }
    }

    /// Replace the store configuration.
    pub fn store(mut self, store: StoreConfig) -> Self {
        self.config.store = store;
        self
    }

    /// Replace the API key authentication configuration.
    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.config.auth = auth;
        self
    }

    /// Replace the document output configuration.
    pub fn output(mut self, output: OutputConfig) -> Self {
        self.config.output = output;
        self
    }

    /// Finalize and return the built `ScopecfgConfig`.
    pub fn build(self) -> ScopecfgConfig {
        self.config
    }
}

/// Persistence engine holding variables and the catalog.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Process-local store; contents are lost on exit.
    Memory,
    /// SQLite database file.
    #[default]
    Sqlite,
}

/// Variable store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Database path for the sqlite backend.
    #[serde(default)]
    pub path: Option<String>,
    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl StoreConfig {
    /// Database path, falling back to `.scopecfg/scopecfg.db` under the cwd.
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".scopecfg").join("scopecfg.db"))
    }
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// API key validity checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Tolerance applied to both edges of a key's validity window.
    #[serde(default = "default_clock_skew_seconds")]
    pub clock_skew_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            clock_skew_seconds: default_clock_skew_seconds(),
        }
    }
}

fn default_clock_skew_seconds() -> u64 {
    300
}

/// Rendering of merged documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_pretty")]
    pub pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            pretty: default_pretty(),
        }
    }
}

fn default_pretty() -> bool {
    true
}
