//! Process-local variable store.

use crate::diff::plan_scope_changes;
use crate::error::StoreError;
use crate::store::{ScopeCatalog, VariableStore};
use crate::ScopeChangeSummary;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use parking_lot::RwLock;
use scopecfg_protocol::{
    ApiKey, ApiKeyId, Application, ApplicationId, Candidate, FlatEntry, Scope, Tag, TagId,
    Variable, VariableId,
};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    variables: BTreeMap<VariableId, Variable>,
    applications: BTreeMap<ApplicationId, Application>,
    tags: BTreeMap<TagId, Tag>,
    api_keys: BTreeMap<ApiKeyId, ApiKey>,
}

impl MemoryState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn push_variable(&mut self, scope: &Scope, entry: &FlatEntry, now: DateTime<Utc>) -> Variable {
        let variable = Variable {
            id: self.allocate_id(),
            key: entry.key.clone(),
            value: entry.value.clone(),
            value_type: entry.value_type,
            scope: scope.clone(),
            created_at: now,
            updated_at: now,
        };
        self.variables.insert(variable.id, variable.clone());
        variable
    }

    fn exact(&self, scope: &Scope) -> Vec<Variable> {
        let mut rows: Vec<Variable> = self
            .variables
            .values()
            .filter(|variable| &variable.scope == scope)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.key.cmp(&b.key).then(a.id.cmp(&b.id)));
        rows
    }
}

/// Variable store and catalog held in memory.
///
/// Every mutation runs under one write lock, so a scope replacement is never
/// observed half applied.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<MemoryState>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row without checking for an existing key in the same scope.
    ///
    /// Used to seed fixtures and imported data, including duplicate rows.
    pub fn insert_variable(&self, scope: &Scope, entry: &FlatEntry) -> Variable {
        self.state.write().push_variable(scope, entry, Utc::now())
    }

    /// Number of stored variable rows.
    pub fn variable_count(&self) -> usize {
        self.state.read().variables.len()
    }
}

#[async_trait]
impl VariableStore for InMemoryStore {
    async fn find_candidates(&self, request: &Scope) -> Result<Vec<Candidate>, StoreError> {
        let state = self.state.read();
        let candidates: Vec<Candidate> = state
            .variables
            .values()
            .filter(|variable| variable.scope.is_covered_by(request))
            .map(|variable| Candidate {
                specificity: variable.scope.dimension_count() as u32,
                variable: variable.clone(),
            })
            .collect();
        debug!(
            "memory candidates (scope={}, count={})",
            request,
            candidates.len()
        );
        Ok(candidates)
    }

    async fn find_exact(&self, scope: &Scope) -> Result<Vec<Variable>, StoreError> {
        Ok(self.state.read().exact(scope))
    }

    async fn replace_scope(
        &self,
        scope: &Scope,
        entries: &[FlatEntry],
    ) -> Result<ScopeChangeSummary, StoreError> {
        let mut state = self.state.write();
        let changes = plan_scope_changes(&state.exact(scope), entries);
        let now = Utc::now();
        for id in changes.deleted_ids() {
            state.variables.remove(&id);
        }
        for (id, entry) in &changes.updates {
            if let Some(variable) = state.variables.get_mut(id) {
                variable.value = entry.value.clone();
                variable.value_type = entry.value_type;
                variable.updated_at = now;
            }
        }
        for entry in &changes.inserts {
            state.push_variable(scope, entry, now);
        }
        Ok(changes.summary())
    }
}

#[async_trait]
impl ScopeCatalog for InMemoryStore {
    async fn find_application(
        &self,
        id: ApplicationId,
    ) -> Result<Option<Application>, StoreError> {
        Ok(self.state.read().applications.get(&id).cloned())
    }

    async fn find_tag(&self, id: TagId) -> Result<Option<Tag>, StoreError> {
        Ok(self.state.read().tags.get(&id).cloned())
    }

    async fn find_api_key(&self, id: ApiKeyId) -> Result<Option<ApiKey>, StoreError> {
        Ok(self.state.read().api_keys.get(&id).cloned())
    }

    async fn insert_application(
        &self,
        name: &str,
        schema: Option<&str>,
    ) -> Result<Application, StoreError> {
        let mut state = self.state.write();
        let application = Application {
            id: state.allocate_id(),
            name: name.to_string(),
            schema: schema.map(str::to_string),
        };
        state
            .applications
            .insert(application.id, application.clone());
        Ok(application)
    }

    async fn insert_tag(&self, name: &str, group: &str) -> Result<Tag, StoreError> {
        let mut state = self.state.write();
        let tag = Tag {
            id: state.allocate_id(),
            name: name.to_string(),
            group: group.to_string(),
        };
        state.tags.insert(tag.id, tag.clone());
        Ok(tag)
    }

    async fn insert_api_key(
        &self,
        application_id: ApplicationId,
        tag_ids: &[TagId],
        active_since: DateTime<Utc>,
        active_until: Option<DateTime<Utc>>,
    ) -> Result<ApiKey, StoreError> {
        let mut state = self.state.write();
        if !state.applications.contains_key(&application_id) {
            return Err(StoreError::MissingReference(format!(
                "application {application_id}"
            )));
        }
        if let Some(tag_id) = tag_ids.iter().find(|id| !state.tags.contains_key(*id)) {
            return Err(StoreError::MissingReference(format!("tag {tag_id}")));
        }
        let api_key = ApiKey {
            id: state.allocate_id(),
            application_id,
            tag_ids: tag_ids.to_vec(),
            active_since,
            active_until,
        };
        state.api_keys.insert(api_key.id, api_key.clone());
        Ok(api_key)
    }
}

#[cfg(test)]
mod tests {
    use super::InMemoryStore;
    use crate::store::{ScopeCatalog, VariableStore};
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use scopecfg_protocol::{FlatEntry, Scope, ValueType};

    fn entry(key: &str, value: &str) -> FlatEntry {
        FlatEntry::new(key, value, ValueType::String)
    }

    #[tokio::test]
    async fn candidates_exclude_foreign_dimensions() {
        let store = InMemoryStore::new();
        store.insert_variable(&Scope::unscoped(), &entry("A", "default"));
        store.insert_variable(&Scope::single_tag([1], None), &entry("A", "app"));
        store.insert_variable(&Scope::single_tag([1], Some(2)), &entry("A", "app+tag"));
        store.insert_variable(&Scope::single_tag([], Some(3)), &entry("A", "other tag"));

        let candidates = store
            .find_candidates(&Scope::single_tag([1], Some(2)))
            .await
            .expect("candidates");
        let mut scored: Vec<(String, u32)> = candidates
            .into_iter()
            .map(|candidate| (candidate.variable.value, candidate.specificity))
            .collect();
        scored.sort();
        assert_eq!(
            scored,
            vec![
                ("app".to_string(), 1),
                ("app+tag".to_string(), 2),
                ("default".to_string(), 0),
            ]
        );
    }

    #[tokio::test]
    async fn replace_scope_only_touches_changed_rows() {
        let store = InMemoryStore::new();
        let scope = Scope::single_tag([1], None);
        store
            .replace_scope(&scope, &[entry("A", "1"), entry("B", "2")])
            .await
            .expect("first save");
        let before = store.find_exact(&scope).await.expect("exact");

        let summary = store
            .replace_scope(&scope, &[entry("A", "1"), entry("B", "3")])
            .await
            .expect("second save");
        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.updated, 1);

        let after = store.find_exact(&scope).await.expect("exact");
        assert_eq!(after[0].updated_at, before[0].updated_at);
        assert_eq!(after[1].value, "3");
        assert_eq!(after[1].id, before[1].id);
    }

    #[tokio::test]
    async fn api_key_requires_known_application() {
        let store = InMemoryStore::new();
        let err = store
            .insert_api_key(42, &[], Utc::now(), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("application 42"));
    }
}
