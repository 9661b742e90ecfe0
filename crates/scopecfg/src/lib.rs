//! Public surface for scopecfg.
//!
//! This crate re-exports the configuration, store and merge engine crates
//! and provides a small initialization helper to keep consumer setup
//! consistent.

/// Re-export for convenience.
pub use scopecfg_config as config;
pub use scopecfg_core as core;
/// Re-export for convenience.
pub use scopecfg_protocol as protocol;
/// Re-export for convenience.
pub use scopecfg_store as store;

#[inline]
/// Initialize logging using env_logger if the "logging" feature is enabled.
///
/// This is a no-op if the feature is not enabled.
pub fn init_logging() {
    #[cfg(feature = "logging")]
    {
        let _ = env_logger::builder()
            .format_timestamp_millis()
            .parse_default_env()
            .try_init();
    }
}
