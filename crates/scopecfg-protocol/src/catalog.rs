//! Catalog records referenced by variable scopes.

use crate::{ApiKeyId, ApplicationId, Scope, TagId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An application variables can be scoped to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    /// Application identifier.
    pub id: ApplicationId,
    /// Display name.
    pub name: String,
    /// Optional JSON schema text describing the application's configuration.
    #[serde(default)]
    pub schema: Option<String>,
}

/// A deployment dimension value such as an environment or machine role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    /// Tag identifier.
    pub id: TagId,
    /// Display name (e.g. `Production`).
    pub name: String,
    /// Dimension the tag belongs to (e.g. `Environment`).
    pub group: String,
}

/// Credential a client application uses to fetch its merged configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApiKey {
    /// API key identifier.
    pub id: ApiKeyId,
    /// Application the key is bound to.
    pub application_id: ApplicationId,
    /// Tags linked to the key.
    #[serde(default)]
    pub tag_ids: Vec<TagId>,
    /// Start of the validity window.
    pub active_since: DateTime<Utc>,
    /// End of the validity window; open-ended when absent.
    #[serde(default)]
    pub active_until: Option<DateTime<Utc>>,
}

impl ApiKey {
    /// Scope a merged read for this key is requested with.
    pub fn scope(&self) -> Scope {
        Scope::new([self.application_id], self.tag_ids.iter().copied())
    }
}
