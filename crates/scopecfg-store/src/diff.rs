//! Planning the row changes that make one exact scope match a new document.
//!
//! Saving a document replaces everything stored for its scope. Rows whose
//! value and type are unchanged are left alone so their `updated_at` does not
//! move; rows whose key vanished are removed; duplicate rows for one key are
//! collapsed onto the oldest row.

use scopecfg_protocol::{FlatEntry, Variable, VariableId};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Row-level changes for one exact scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeChangeSet {
    /// New keys to insert.
    pub inserts: Vec<FlatEntry>,
    /// Existing rows whose value or type changed.
    pub updates: Vec<(VariableId, FlatEntry)>,
    /// Rows whose key is absent from the new document.
    pub removals: Vec<VariableId>,
    /// Extra rows sharing a key with an older row in the same scope.
    pub duplicates: Vec<VariableId>,
    /// Number of rows left untouched.
    pub unchanged: usize,
}

impl ScopeChangeSet {
    /// True when applying the set would not modify any row.
    pub fn is_noop(&self) -> bool {
        self.inserts.is_empty()
            && self.updates.is_empty()
            && self.removals.is_empty()
            && self.duplicates.is_empty()
    }

    /// Every row id that must be deleted, in ascending order.
    pub fn deleted_ids(&self) -> Vec<VariableId> {
        let ids: BTreeSet<VariableId> = self
            .removals
            .iter()
            .chain(self.duplicates.iter())
            .copied()
            .collect();
        ids.into_iter().collect()
    }

    /// Counts reported back to callers.
    pub fn summary(&self) -> ScopeChangeSummary {
        ScopeChangeSummary {
            inserted: self.inserts.len(),
            updated: self.updates.len(),
            unchanged: self.unchanged,
            removed: self.removals.len(),
            duplicates_removed: self.duplicates.len(),
        }
    }
}

/// Counts of what a scope replacement did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeChangeSummary {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub duplicates_removed: usize,
}

/// Compute the changes turning `existing` rows of one scope into `desired`.
///
/// When `desired` repeats a key the last entry wins.
pub fn plan_scope_changes(existing: &[Variable], desired: &[FlatEntry]) -> ScopeChangeSet {
    let mut ordered: Vec<&Variable> = existing.iter().collect();
    ordered.sort_by_key(|variable| variable.id);

    let mut changes = ScopeChangeSet::default();
    let mut kept: BTreeMap<&str, &Variable> = BTreeMap::new();
    for variable in ordered {
        if kept.contains_key(variable.key.as_str()) {
            changes.duplicates.push(variable.id);
        } else {
            kept.insert(variable.key.as_str(), variable);
        }
    }

    let mut wanted: BTreeMap<&str, &FlatEntry> = BTreeMap::new();
    for entry in desired {
        wanted.insert(entry.key.as_str(), entry);
    }

    for (key, entry) in &wanted {
        match kept.get(key) {
            Some(current) if current.holds_value_of(entry) => changes.unchanged += 1,
            Some(current) => changes.updates.push((current.id, (*entry).clone())),
            None => changes.inserts.push((*entry).clone()),
        }
    }
    for (key, current) in &kept {
        if !wanted.contains_key(key) {
            changes.removals.push(current.id);
        }
    }
    changes.removals.sort_unstable();
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use scopecfg_protocol::{Scope, ValueType};

    fn row(id: VariableId, key: &str, value: &str, value_type: ValueType) -> Variable {
        let now = Utc::now();
        Variable {
            id,
            key: key.to_string(),
            value: value.to_string(),
            value_type,
            scope: Scope::single_tag([1], None),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn classifies_inserts_updates_and_removals() {
        let existing = vec![
            row(1, "Keep", "same", ValueType::String),
            row(2, "Change", "1", ValueType::Number),
            row(3, "Gone", "x", ValueType::String),
        ];
        let desired = vec![
            FlatEntry::new("Keep", "same", ValueType::String),
            FlatEntry::new("Change", "2", ValueType::Number),
            FlatEntry::new("New", "true", ValueType::Boolean),
        ];
        let changes = plan_scope_changes(&existing, &desired);

        assert_eq!(changes.unchanged, 1);
        assert_eq!(
            changes.updates,
            vec![(2, FlatEntry::new("Change", "2", ValueType::Number))]
        );
        assert_eq!(
            changes.inserts,
            vec![FlatEntry::new("New", "true", ValueType::Boolean)]
        );
        assert_eq!(changes.removals, vec![3]);
        assert!(changes.duplicates.is_empty());
    }

    #[test]
    fn type_change_alone_is_an_update() {
        let existing = vec![row(4, "Port", "80", ValueType::String)];
        let desired = vec![FlatEntry::new("Port", "80", ValueType::Number)];
        let changes = plan_scope_changes(&existing, &desired);
        assert_eq!(changes.updates.len(), 1);
        assert_eq!(changes.unchanged, 0);
    }

    #[test]
    fn duplicates_keep_the_oldest_row() {
        let existing = vec![
            row(9, "Dup", "late", ValueType::String),
            row(5, "Dup", "early", ValueType::String),
            row(7, "Dup", "middle", ValueType::String),
        ];
        let desired = vec![FlatEntry::new("Dup", "early", ValueType::String)];
        let changes = plan_scope_changes(&existing, &desired);

        assert_eq!(changes.duplicates, vec![7, 9]);
        assert_eq!(changes.unchanged, 1);
        assert_eq!(changes.deleted_ids(), vec![7, 9]);
        assert_eq!(changes.summary().duplicates_removed, 2);
    }

    #[test]
    fn identical_document_is_a_noop() {
        let existing = vec![row(1, "A", "x", ValueType::String)];
        let desired = vec![FlatEntry::new("A", "x", ValueType::String)];
        assert!(plan_scope_changes(&existing, &desired).is_noop());
    }

    #[test]
    fn empty_document_removes_everything() {
        let existing = vec![
            row(1, "A", "x", ValueType::String),
            row(2, "B", "y", ValueType::String),
        ];
        let changes = plan_scope_changes(&existing, &[]);
        assert_eq!(changes.removals, vec![1, 2]);
        assert_eq!(changes.summary().removed, 2);
    }
}
