use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use scopecfg_protocol::{
    ApiKey, ApiKeyId, Application, ApplicationId, Candidate, FlatEntry, Scope, Tag, TagId,
    Variable,
};
use scopecfg_store::{ScopeCatalog, ScopeChangeSummary, StoreError, VariableStore};

/// Store whose variable operations always fail, while its catalog accepts
/// every id. Records the scopes passed to `replace_scope`.
#[derive(Debug, Default)]
pub struct FailingStore {
    replace_calls: Mutex<Vec<Scope>>,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace_calls(&self) -> Vec<Scope> {
        self.replace_calls.lock().clone()
    }
}

fn unavailable() -> StoreError {
    StoreError::Corrupt("store unavailable".to_string())
}

#[async_trait]
impl VariableStore for FailingStore {
    async fn find_candidates(&self, _request: &Scope) -> Result<Vec<Candidate>, StoreError> {
        Err(unavailable())
    }

    async fn find_exact(&self, _scope: &Scope) -> Result<Vec<Variable>, StoreError> {
        Err(unavailable())
    }

    async fn replace_scope(
        &self,
        scope: &Scope,
        _entries: &[FlatEntry],
    ) -> Result<ScopeChangeSummary, StoreError> {
        self.replace_calls.lock().push(scope.clone());
        Err(unavailable())
    }
}

#[async_trait]
impl ScopeCatalog for FailingStore {
    async fn find_application(
        &self,
        id: ApplicationId,
    ) -> Result<Option<Application>, StoreError> {
        Ok(Some(Application {
            id,
            name: format!("app-{id}"),
            schema: None,
        }))
    }

    async fn find_tag(&self, id: TagId) -> Result<Option<Tag>, StoreError> {
        Ok(Some(Tag {
            id,
            name: format!("tag-{id}"),
            group: "Environment".to_string(),
        }))
    }

    async fn find_api_key(&self, _id: ApiKeyId) -> Result<Option<ApiKey>, StoreError> {
        Err(unavailable())
    }

    async fn insert_application(
        &self,
        _name: &str,
        _schema: Option<&str>,
    ) -> Result<Application, StoreError> {
        Err(unavailable())
    }

    async fn insert_tag(&self, _name: &str, _group: &str) -> Result<Tag, StoreError> {
        Err(unavailable())
    }

    async fn insert_api_key(
        &self,
        _application_id: ApplicationId,
        _tag_ids: &[TagId],
        _active_since: DateTime<Utc>,
        _active_until: Option<DateTime<Utc>>,
    ) -> Result<ApiKey, StoreError> {
        Err(unavailable())
    }
}
