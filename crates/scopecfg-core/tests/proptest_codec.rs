//! Property tests for the path codec and candidate disqualification.

use proptest::prelude::*;
use scopecfg_core::{flatten, resolve, unflatten};
use scopecfg_protocol::{Candidate, FlatEntry, Scope, ValueType};
use scopecfg_store::{InMemoryStore, ScopeCatalog, SqliteStore, VariableStore};
use serde_json::{Map, Value};
use tempfile::tempdir;

/// Object keys that cannot be mistaken for array indices or split on `:`.
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z_][a-zA-Z0-9_]{0,5}"
}

/// Documents with storable leaves and no empty containers.
fn value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        ".{0,12}".prop_map(Value::String),
    ];
    leaf.prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..6).prop_map(Value::Array),
            object_strategy(inner),
        ]
    })
}

fn object_strategy(inner: impl Strategy<Value = Value>) -> impl Strategy<Value = Value> {
    prop::collection::btree_map(key_strategy(), inner, 1..5)
        .prop_map(|map| Value::Object(map.into_iter().collect::<Map<_, _>>()))
}

fn id_set() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(1_i64..6, 0..3)
}

fn scope_strategy() -> impl Strategy<Value = Scope> {
    (id_set(), id_set()).prop_map(|(apps, tags)| Scope::new(apps, tags))
}

proptest! {
    #[test]
    fn flatten_then_unflatten_restores_document(document in object_strategy(value_strategy())) {
        let entries = flatten(&document).expect("flatten");
        let keys: Vec<&str> = entries.iter().map(|entry| entry.key.as_str()).collect();
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        prop_assert_eq!(keys, sorted);

        let rebuilt = unflatten(&entries).expect("unflatten");
        prop_assert_eq!(rebuilt, document);
    }
}

/// Candidates for `request`, oldest first.
async fn candidates_from(store: &dyn VariableStore, request: &Scope) -> Vec<Candidate> {
    let mut candidates = store.find_candidates(request).await.expect("candidates");
    candidates.sort_by_key(|candidate| candidate.variable.id);
    candidates
}

fn check_candidates(
    scopes: &[(Scope, usize)],
    request: &Scope,
    candidates: &[Candidate],
) -> Result<(), TestCaseError> {
    let covered = scopes
        .iter()
        .filter(|(scope, _)| scope.is_covered_by(request))
        .count();
    prop_assert_eq!(candidates.len(), covered);
    for candidate in candidates {
        prop_assert!(candidate.variable.scope.is_covered_by(request));
        prop_assert_eq!(
            candidate.specificity as usize,
            candidate.variable.scope.dimension_count()
        );
    }

    let resolved = resolve(candidates.to_vec());
    for (key, winner) in &resolved {
        let best = candidates
            .iter()
            .filter(|candidate| &candidate.variable.key == key)
            .map(|candidate| candidate.variable.scope.dimension_count())
            .max();
        prop_assert_eq!(Some(winner.scope.dimension_count()), best);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn candidates_never_reach_outside_the_request(
        scopes in prop::collection::vec((scope_strategy(), 0_usize..3), 1..16),
        request in scope_strategy(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");
        let temp = tempdir().expect("tempdir");
        let sqlite = SqliteStore::open(&temp.path().join("vars.db"), 1_000).expect("open");
        let memory = InMemoryStore::new();
        runtime.block_on(async {
            for id in 1..=5 {
                sqlite.insert_application(&format!("app{id}"), None).await.expect("app");
                sqlite.insert_tag(&format!("tag{id}"), "Group").await.expect("tag");
            }
        });

        for (index, (scope, key)) in scopes.iter().enumerate() {
            let entry = FlatEntry::new(format!("K{key}"), index.to_string(), ValueType::String);
            memory.insert_variable(scope, &entry);
            sqlite.insert_variable(scope, &entry).expect("insert");
        }

        let from_memory = runtime.block_on(candidates_from(&memory, &request));
        let from_sqlite = runtime.block_on(candidates_from(&sqlite, &request));
        check_candidates(&scopes, &request, &from_memory)?;
        check_candidates(&scopes, &request, &from_sqlite)?;

        let values = |candidates: &[Candidate]| -> Vec<String> {
            candidates.iter().map(|candidate| candidate.variable.value.clone()).collect()
        };
        prop_assert_eq!(values(&from_memory), values(&from_sqlite));
    }
}
