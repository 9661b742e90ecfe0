//! Test helpers shared across scopecfg crates.

pub mod events;
pub mod fixtures;
pub mod store;

pub use events::RecordingEventSink;
pub use fixtures::{SeededCatalog, seed_catalog};
pub use store::FailingStore;
