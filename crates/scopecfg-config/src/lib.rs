//! Settings for scopecfg hosts: which store to open, how much clock skew API
//! keys tolerate and how documents are printed.
//!
//! Settings come from `scopecfg.json5` files merged system, user, cwd, then
//! any explicit runtime paths.

mod error;
mod loader;
mod model;

pub use error::ConfigError;
pub use loader::{ConfigLayer, ConfigLayerSource, LayeredConfig, LayeredConfigOptions};
pub use model::*;
