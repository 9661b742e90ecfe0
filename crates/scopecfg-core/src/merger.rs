//! Merged reads and scope saves over a variable store.

use crate::codec::{flatten_str, unflatten};
use crate::error::CoreError;
use crate::locks::ScopeLocks;
use crate::resolver::resolve;
use log::{debug, info, warn};
use parking_lot::RwLock;
use scopecfg_protocol::{
    ApiKeyId, Application, ApplicationId, ConfigEvent, ConfigEventSink, FlatEntry,
    MultiTagSaveConfigRequest, SaveConfigRequest, Scope, Tag,
};
use scopecfg_store::{ScopeCatalog, ScopeChangeSummary, StoreHandles, VariableStore};
use serde_json::Value;
use std::sync::Arc;

/// Resolves scoped variables into JSON documents and saves documents back.
pub struct ConfigMerger {
    variables: Arc<dyn VariableStore>,
    catalog: Arc<dyn ScopeCatalog>,
    locks: ScopeLocks,
    event_sink: RwLock<Option<Arc<dyn ConfigEventSink>>>,
}

impl ConfigMerger {
    /// Create a merger over a variable store and the catalog its scopes use.
    pub fn new(variables: Arc<dyn VariableStore>, catalog: Arc<dyn ScopeCatalog>) -> Self {
        Self {
            variables,
            catalog,
            locks: ScopeLocks::new(),
            event_sink: RwLock::new(None),
        }
    }

    /// Create a merger over an opened backend.
    pub fn from_handles(handles: StoreHandles) -> Self {
        Self::new(handles.variables, handles.catalog)
    }

    /// Attach an event sink at construction time.
    pub fn with_event_sink(self, sink: Arc<dyn ConfigEventSink>) -> Self {
        self.set_event_sink(Some(sink));
        self
    }

    /// Replace or clear the event sink.
    pub fn set_event_sink(&self, sink: Option<Arc<dyn ConfigEventSink>>) {
        *self.event_sink.write() = sink;
    }

    /// Catalog the merger validates scopes against.
    pub fn catalog(&self) -> Arc<dyn ScopeCatalog> {
        self.catalog.clone()
    }

    /// Effective document for a request scope.
    ///
    /// Every variable not disqualified by the scope competes; per key the most
    /// specific one wins. An unscoped request sees only unscoped variables.
    pub async fn get_merged_config(&self, scope: &Scope) -> Result<Value, CoreError> {
        let candidates = self.variables.find_candidates(scope).await?;
        let considered = candidates.len();
        let resolved = resolve(candidates);
        debug!(
            "merged config (scope={scope}, candidates={considered}, keys={})",
            resolved.len()
        );
        let entries: Vec<FlatEntry> = resolved
            .values()
            .map(|variable| variable.to_entry())
            .collect();
        Ok(unflatten(&entries)?)
    }

    /// Effective document for the scope an API key is bound to.
    ///
    /// The key is expected to have passed authentication already.
    pub async fn get_merged_config_for_api_key(&self, id: ApiKeyId) -> Result<Value, CoreError> {
        let Some(key) = self.catalog.find_api_key(id).await? else {
            return Err(CoreError::NotFound(format!("api key {id}")));
        };
        self.get_merged_config(&key.scope()).await
    }

    /// Document stored for exactly `scope`, without overrides.
    pub async fn get_exact_config(&self, scope: &Scope) -> Result<Value, CoreError> {
        let rows = self.variables.find_exact(scope).await?;
        let mut entries: Vec<FlatEntry> = Vec::with_capacity(rows.len());
        for row in &rows {
            // Rows arrive ordered by key then id; the oldest duplicate is shown.
            if entries.last().is_some_and(|last| last.key == row.key) {
                continue;
            }
            entries.push(row.to_entry());
        }
        Ok(unflatten(&entries)?)
    }

    /// Replace everything stored for exactly `scope` with `document`.
    ///
    /// The document is parsed and the scope validated before anything is
    /// written. Unchanged rows keep their timestamps; duplicate rows left over
    /// from earlier data problems are removed.
    pub async fn save_config(
        &self,
        scope: &Scope,
        document: &str,
    ) -> Result<ScopeChangeSummary, CoreError> {
        let entries = flatten_str(document)?;
        self.validate_scope(scope).await?;

        let _guard = self.locks.lock(scope).await;
        let summary = self.variables.replace_scope(scope, &entries).await?;
        if summary.duplicates_removed > 0 {
            warn!(
                "removed duplicate variables (scope={scope}, count={})",
                summary.duplicates_removed
            );
            self.emit(ConfigEvent::DuplicatesRemoved {
                scope: scope.clone(),
                count: summary.duplicates_removed,
            });
        }
        if summary.inserted + summary.updated + summary.removed > 0 {
            self.emit(ConfigEvent::ScopeSaved {
                scope: scope.clone(),
                inserted: summary.inserted,
                updated: summary.updated,
                removed: summary.removed,
            });
        }
        info!(
            "saved config (scope={scope}, inserted={}, updated={}, unchanged={}, removed={})",
            summary.inserted, summary.updated, summary.unchanged, summary.removed
        );
        Ok(summary)
    }

    /// Save a single-tag write request.
    pub async fn save_request(
        &self,
        request: SaveConfigRequest,
    ) -> Result<ScopeChangeSummary, CoreError> {
        let (scope, document) = request.into_parts();
        self.save_config(&scope, &document).await
    }

    /// Save a multi-tag write request.
    pub async fn save_multi_tag_request(
        &self,
        request: MultiTagSaveConfigRequest,
    ) -> Result<ScopeChangeSummary, CoreError> {
        let (scope, document) = request.into_parts();
        self.save_config(&scope, &document).await
    }

    /// Stored JSON schema text of an application, if any.
    pub async fn application_schema(
        &self,
        id: ApplicationId,
    ) -> Result<Option<String>, CoreError> {
        Ok(self.require_application(id).await?.schema)
    }

    /// Display name of an application.
    pub async fn application_name(&self, id: ApplicationId) -> Result<String, CoreError> {
        Ok(self.require_application(id).await?.name)
    }

    /// Register an application. A schema, when given, must be valid JSON.
    pub async fn add_application(
        &self,
        name: &str,
        schema: Option<&str>,
    ) -> Result<Application, CoreError> {
        if let Some(schema) = schema
            && let Err(err) = serde_json::from_str::<Value>(schema)
        {
            return Err(CoreError::Validation(format!(
                "schema for application `{name}` is not valid JSON: {err}"
            )));
        }
        let application = self.catalog.insert_application(name, schema).await?;
        info!("application added (id={}, name={name})", application.id);
        self.emit(ConfigEvent::ApplicationAdded {
            application_id: application.id,
        });
        Ok(application)
    }

    /// Register a tag within a tag group.
    pub async fn add_tag(&self, name: &str, group: &str) -> Result<Tag, CoreError> {
        let tag = self.catalog.insert_tag(name, group).await?;
        info!("tag added (id={}, name={name}, group={group})", tag.id);
        self.emit(ConfigEvent::TagAdded {
            tag_id: tag.id,
            group: tag.group.clone(),
        });
        Ok(tag)
    }

    async fn require_application(&self, id: ApplicationId) -> Result<Application, CoreError> {
        self.catalog
            .find_application(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("application {id}")))
    }

    async fn validate_scope(&self, scope: &Scope) -> Result<(), CoreError> {
        for id in &scope.application_ids {
            if self.catalog.find_application(*id).await?.is_none() {
                return Err(CoreError::Validation(format!("unknown application {id}")));
            }
        }
        for id in &scope.tag_ids {
            if self.catalog.find_tag(*id).await?.is_none() {
                return Err(CoreError::Validation(format!("unknown tag {id}")));
            }
        }
        Ok(())
    }

    fn emit(&self, event: ConfigEvent) {
        let Some(sink) = self.event_sink.read().clone() else {
            return;
        };
        sink.emit(event);
    }
}
