//! Layered loading of `scopecfg.json5`.
//!
//! Each layer is parsed and shape-checked on its own, then folded into one
//! JSON object in precedence order before being decoded.

mod layer_io;
mod merge;
mod schema;


use crate::{ConfigError, ScopecfgConfig, StoreBackend};
use layer_io::LayerCandidate;
use log::{debug, info};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "scopecfg.json5";
const USER_CONFIG_DIR: &str = ".scopecfg";

#[cfg(unix)]
const SYSTEM_CONFIG_PATH: &str = "/etc/scopecfg/scopecfg.json5";
#[cfg(windows)]
const SYSTEM_CONFIG_PATH: &str = "C:\\ProgramData\\scopecfg\\scopecfg.json5";

/// Decoded settings and the files they came from, lowest precedence first.
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    pub config: ScopecfgConfig,
    pub layers: Vec<ConfigLayer>,
}

/// Where a layer was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayerSource {
    System,
    User,
    Cwd,
    /// Passed explicitly by the caller; must exist.
    Runtime,
}

impl ConfigLayerSource {
    /// Short name used in log lines and error paths.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Cwd => "cwd",
            Self::Runtime => "runtime",
        }
    }
}

/// A layer file that contributed to the effective settings.
#[derive(Debug, Clone)]
pub struct ConfigLayer {
    pub source: ConfigLayerSource,
    pub path: PathBuf,
}

/// Locations searched by [`ScopecfgConfig::load_layered_with_options`].
///
/// Set `system_config_path` or `user_config_path` to `None` to skip that layer.
#[derive(Debug, Clone)]
pub struct LayeredConfigOptions {
    pub cwd: PathBuf,
    pub system_config_path: Option<PathBuf>,
    pub user_config_path: Option<PathBuf>,
    pub runtime_paths: Vec<PathBuf>,
}

impl LayeredConfigOptions {
    pub fn new(cwd: impl AsRef<Path>) -> Self {
        Self {
            cwd: cwd.as_ref().to_path_buf(),
            system_config_path: Some(PathBuf::from(SYSTEM_CONFIG_PATH)),
            user_config_path: layer_io::user_config_path(),
            runtime_paths: Vec::new(),
        }
    }

    /// Append an explicit layer that overrides everything discovered.
    pub fn with_runtime_path(mut self, path: impl AsRef<Path>) -> Self {
        self.runtime_paths.push(path.as_ref().to_path_buf());
        self
    }

    fn candidates(&self) -> Vec<LayerCandidate> {
        let discovered = [
            (ConfigLayerSource::System, self.system_config_path.clone()),
            (ConfigLayerSource::User, self.user_config_path.clone()),
            (ConfigLayerSource::Cwd, Some(self.cwd.join(CONFIG_FILE_NAME))),
        ];
        discovered
            .into_iter()
            .filter_map(|(source, path)| path.map(|path| LayerCandidate::optional(source, path)))
            .chain(
                self.runtime_paths
                    .iter()
                    .map(|path| LayerCandidate::required(ConfigLayerSource::Runtime, path.clone())),
            )
            .collect()
    }
}

impl ScopecfgConfig {
    /// Parse one file as the whole configuration.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("loading config file {}", path.display());
        let value = layer_io::parse_file(path)?;
        decode(value, "config")
    }

    pub fn load_from_str(contents: &str) -> Result<Self, ConfigError> {
        decode(json5::from_str(contents)?, "config")
    }

    /// Load system, user and cwd layers discovered from `cwd`.
    pub fn load_layered(cwd: impl AsRef<Path>) -> Result<LayeredConfig, ConfigError> {
        Self::load_layered_with_options(LayeredConfigOptions::new(cwd))
    }

    /// Later layers override earlier ones key by key. A file reached through
    /// two layers is applied once, at its first position.
    pub fn load_layered_with_options(
        options: LayeredConfigOptions,
    ) -> Result<LayeredConfig, ConfigError> {
        let mut applied = HashSet::new();
        let mut layers = Vec::new();
        let mut effective = Value::Object(Map::new());

        for candidate in options.candidates() {
            let Some((layer, value)) = candidate.load()? else {
                continue;
            };
            if !applied.insert(layer_io::canonical(&layer.path)) {
                debug!(
                    "{} layer {} already applied",
                    layer.source.as_str(),
                    layer.path.display()
                );
                continue;
            }
            merge::merge_json_values(&mut effective, &value);
            layers.push(layer);
        }

        let config = decode(effective, "effective")?;
        info!("config loaded from {} layer(s)", layers.len());
        Ok(LayeredConfig { config, layers })
    }

    /// Checks that depend on more than one field's type.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let failure = if self.store.busy_timeout_ms == 0 {
            Some(("store.busy_timeout_ms", "must be greater than zero"))
        } else if self.store.backend == StoreBackend::Sqlite
            && self.store.path.as_deref().is_some_and(|path| path.trim().is_empty())
        {
            Some(("store.path", "must not be empty"))
        } else {
            None
        };
        match failure {
            Some((path, message)) => Err(ConfigError::InvalidField {
                path: path.to_string(),
                message: message.to_string(),
            }),
            None => Ok(()),
        }
    }
}

fn decode(value: Value, label: &str) -> Result<ScopecfgConfig, ConfigError> {
    schema::validate_layer_schema(&value, label)?;
    let config: ScopecfgConfig = serde_json::from_value(value)?;
    config.validate()?;
    Ok(config)
}
