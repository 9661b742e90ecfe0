//! Configuration resolution and merge engine.
//!
//! Stored variables are flat `:`-delimited key paths scoped to applications
//! and tags. This crate turns them into nested JSON documents, picking the
//! most specific variable per key, and turns saved documents back into rows.

pub mod auth;
pub mod codec;
pub mod error;
pub mod locks;
pub mod merger;
pub mod render;
pub mod resolver;

pub use auth::{ApiKeyGate, KeyRejection, check_activity};
pub use codec::{CodecError, compare_keys, flatten, flatten_str, unflatten};
pub use error::CoreError;
pub use locks::{ScopeGuard, ScopeLocks};
pub use merger::ConfigMerger;
pub use render::render_document;
pub use resolver::resolve;
