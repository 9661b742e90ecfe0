//! Store interfaces consumed by the merge engine.

use crate::error::StoreError;
use crate::{InMemoryStore, ScopeChangeSummary, SqliteStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use scopecfg_config::{StoreBackend, StoreConfig};
use scopecfg_protocol::{
    ApiKey, ApiKeyId, Application, ApplicationId, Candidate, FlatEntry, Scope, Tag, TagId,
    Variable,
};
use std::sync::Arc;

#[async_trait]
/// Persisted set of scoped variables.
pub trait VariableStore: Send + Sync {
    /// Every variable not disqualified for `request`, scored by specificity.
    ///
    /// A variable qualifies when each application and tag it is linked to is
    /// part of the request. Its specificity is the number of those links.
    async fn find_candidates(&self, request: &Scope) -> Result<Vec<Candidate>, StoreError>;

    /// Variables whose scope equals `scope` exactly, ordered by key then id.
    async fn find_exact(&self, scope: &Scope) -> Result<Vec<Variable>, StoreError>;

    /// Make the exact `scope` hold precisely `entries`.
    ///
    /// The read, diff and write happen as one unit: either every change is
    /// committed or none is.
    async fn replace_scope(
        &self,
        scope: &Scope,
        entries: &[FlatEntry],
    ) -> Result<ScopeChangeSummary, StoreError>;
}

#[async_trait]
/// Applications, tags and API keys that scopes refer to.
pub trait ScopeCatalog: Send + Sync {
    /// Look up an application by id.
    async fn find_application(
        &self,
        id: ApplicationId,
    ) -> Result<Option<Application>, StoreError>;

    /// Look up a tag by id.
    async fn find_tag(&self, id: TagId) -> Result<Option<Tag>, StoreError>;

    /// Look up an API key by id.
    async fn find_api_key(&self, id: ApiKeyId) -> Result<Option<ApiKey>, StoreError>;

    /// Register a new application.
    async fn insert_application(
        &self,
        name: &str,
        schema: Option<&str>,
    ) -> Result<Application, StoreError>;

    /// Register a new tag within a tag group.
    async fn insert_tag(&self, name: &str, group: &str) -> Result<Tag, StoreError>;

    /// Issue an API key bound to an application and tags.
    async fn insert_api_key(
        &self,
        application_id: ApplicationId,
        tag_ids: &[TagId],
        active_since: DateTime<Utc>,
        active_until: Option<DateTime<Utc>>,
    ) -> Result<ApiKey, StoreError>;
}

/// Variable store and catalog opened from one backend.
#[derive(Clone)]
pub struct StoreHandles {
    pub variables: Arc<dyn VariableStore>,
    pub catalog: Arc<dyn ScopeCatalog>,
}

impl StoreHandles {
    /// Share one backend value as both store and catalog.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: VariableStore + ScopeCatalog + 'static,
    {
        Self {
            variables: backend.clone(),
            catalog: backend,
        }
    }
}

/// Open the backend selected by configuration.
pub fn open_store(config: &StoreConfig) -> Result<StoreHandles, StoreError> {
    match config.backend {
        StoreBackend::Memory => {
            info!("opening in-memory variable store");
            Ok(StoreHandles::from_backend(Arc::new(InMemoryStore::new())))
        }
        StoreBackend::Sqlite => {
            let path = config.resolved_path();
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            let store = SqliteStore::open(&path, config.busy_timeout_ms)?;
            Ok(StoreHandles::from_backend(Arc::new(store)))
        }
    }
}
