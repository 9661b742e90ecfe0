//! Variable and catalog persistence for scopecfg.
//!
//! The merge engine only talks to the [`VariableStore`] and [`ScopeCatalog`]
//! traits. Two backends ship with the crate: a process-local store and a
//! SQLite store.

pub mod diff;
pub mod error;
pub mod memory;
pub mod sqlite;
pub mod store;

/// Store error type.
pub use error::StoreError;
/// Per-scope diff planning.
pub use diff::{ScopeChangeSet, ScopeChangeSummary, plan_scope_changes};
/// Backends.
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
/// Store interfaces and backend selection.
pub use store::{ScopeCatalog, StoreHandles, VariableStore, open_store};
