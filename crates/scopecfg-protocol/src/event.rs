//! Change notifications for caches that mirror stored configuration.

use crate::{ApplicationId, Scope, TagId};
use serde::{Deserialize, Serialize};

/// Events emitted after configuration or catalog changes are committed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "type", content = "payload")]
pub enum ConfigEvent {
    /// A document was saved for an exact scope.
    ScopeSaved {
        scope: Scope,
        inserted: usize,
        updated: usize,
        removed: usize,
    },
    /// Duplicate rows were found and removed while saving a scope.
    DuplicatesRemoved { scope: Scope, count: usize },
    /// An application was added to the catalog.
    ApplicationAdded { application_id: ApplicationId },
    /// A tag was added to the catalog.
    TagAdded { tag_id: TagId, group: String },
}

/// Sink interface for configuration change events.
///
/// Callers that keep derived state (tag pickers, cached documents) implement
/// this and pass it to the merger instead of registering global listeners.
pub trait ConfigEventSink: Send + Sync {
    /// Emit an event to downstream listeners.
    fn emit(&self, event: ConfigEvent);
}
