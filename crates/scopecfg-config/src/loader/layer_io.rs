//! Reading layer files from disk.

use super::{CONFIG_FILE_NAME, ConfigLayer, ConfigLayerSource, USER_CONFIG_DIR, schema};
use crate::ConfigError;
use directories::UserDirs;
use log::debug;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// A location that may hold a layer.
pub(super) struct LayerCandidate {
    source: ConfigLayerSource,
    path: PathBuf,
    required: bool,
}

impl LayerCandidate {
    pub(super) fn optional(source: ConfigLayerSource, path: PathBuf) -> Self {
        Self {
            source,
            path,
            required: false,
        }
    }

    pub(super) fn required(source: ConfigLayerSource, path: PathBuf) -> Self {
        Self {
            source,
            path,
            required: true,
        }
    }

    /// Parse and shape-check the file. Missing optional files yield `None`.
    pub(super) fn load(self) -> Result<Option<(ConfigLayer, Value)>, ConfigError> {
        if !self.path.is_file() {
            if self.required {
                return Err(ConfigError::MissingLayer(self.path));
            }
            debug!(
                "no {} layer at {}",
                self.source.as_str(),
                self.path.display()
            );
            return Ok(None);
        }
        let value = parse_file(&self.path)?;
        let label = format!("{}({})", self.source.as_str(), self.path.display());
        schema::validate_layer_schema(&value, &label)?;
        Ok(Some((
            ConfigLayer {
                source: self.source,
                path: self.path,
            },
            value,
        )))
    }
}

pub(super) fn parse_file(path: &Path) -> Result<Value, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(json5::from_str(&contents)?)
}

/// Key used to recognise the same file reached through two layers.
pub(super) fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

pub(super) fn user_config_path() -> Option<PathBuf> {
    UserDirs::new().map(|dirs| dirs.home_dir().join(USER_CONFIG_DIR).join(CONFIG_FILE_NAME))
}
