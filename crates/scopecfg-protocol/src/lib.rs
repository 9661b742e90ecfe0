//! Wire and storage types shared by scopecfg crates.
//!
//! Variables, scopes and catalog records are defined here so the store,
//! the merge engine and any HTTP layer agree on one representation.

mod catalog;
mod event;
mod request;

pub use catalog::{ApiKey, Application, Tag};
pub use event::{ConfigEvent, ConfigEventSink};
pub use request::{MultiTagSaveConfigRequest, SaveConfigRequest};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Unique identifier for an application.
pub type ApplicationId = i64;
/// Unique identifier for a tag.
pub type TagId = i64;
/// Unique identifier for an API key.
pub type ApiKeyId = i64;
/// Unique identifier for a stored variable row.
pub type VariableId = i64;

/// Separator between key path segments.
pub const KEY_DELIMITER: char = ':';
/// Maximum stored key length in characters.
pub const MAX_KEY_LENGTH: usize = 512;

/// How a variable's textual value is coerced when rebuilding JSON.
///
/// The textual names are a storage contract and must stay exactly
/// `"String"`, `"Number"` and `"Boolean"`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueType {
    /// Passed through verbatim.
    String,
    /// Integral number.
    Number,
    /// `true` or `false`.
    Boolean,
}

impl ValueType {
    /// Storage label for this value type.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Number => "Number",
            Self::Boolean => "Boolean",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored value type label is not recognized.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown value type: {0}")]
pub struct UnknownValueType(pub String);

impl FromStr for ValueType {
    type Err = UnknownValueType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "String" => Ok(Self::String),
            "Number" => Ok(Self::Number),
            "Boolean" => Ok(Self::Boolean),
            other => Err(UnknownValueType(other.to_string())),
        }
    }
}

/// Application and tag dimensions a variable or request is constrained to.
///
/// Both sets are kept sorted so equal scopes compare and hash equal no matter
/// how the ids were supplied.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    /// Application ids.
    #[serde(default)]
    pub application_ids: BTreeSet<ApplicationId>,
    /// Tag ids.
    #[serde(default)]
    pub tag_ids: BTreeSet<TagId>,
}

impl Scope {
    /// Scope with no application and no tag constraint.
    pub fn unscoped() -> Self {
        Self::default()
    }

    /// Build a scope from any number of applications and tags.
    pub fn new(
        application_ids: impl IntoIterator<Item = ApplicationId>,
        tag_ids: impl IntoIterator<Item = TagId>,
    ) -> Self {
        Self {
            application_ids: application_ids.into_iter().collect(),
            tag_ids: tag_ids.into_iter().collect(),
        }
    }

    /// Build a scope carrying at most one tag.
    pub fn single_tag(
        application_ids: impl IntoIterator<Item = ApplicationId>,
        tag_id: Option<TagId>,
    ) -> Self {
        Self::new(application_ids, tag_id)
    }

    /// Number of dimension values this scope is constrained to.
    pub fn dimension_count(&self) -> usize {
        self.application_ids.len() + self.tag_ids.len()
    }

    /// True when every dimension value of `self` is present in `request`.
    ///
    /// A variable scope that is covered by a request is a candidate for it.
    pub fn is_covered_by(&self, request: &Scope) -> bool {
        self.application_ids.is_subset(&request.application_ids)
            && self.tag_ids.is_subset(&request.tag_ids)
    }

    /// Canonical text form used to look up an exact scope (`a=1,2;t=3`).
    pub fn canonical_key(&self) -> String {
        fn join(ids: &BTreeSet<i64>) -> String {
            ids.iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(",")
        }
        format!("a={};t={}", join(&self.application_ids), join(&self.tag_ids))
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_key())
    }
}

/// A flattened key path row: what the path codec produces and consumes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct FlatEntry {
    /// Colon-delimited key path.
    pub key: String,
    /// Raw textual value.
    pub value: String,
    /// Coercion applied when rebuilding JSON.
    pub value_type: ValueType,
}

impl FlatEntry {
    /// Create a new flat entry.
    pub fn new(key: impl Into<String>, value: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            value_type,
        }
    }
}

/// A stored configuration variable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    /// Store-assigned id; lower ids were created first.
    pub id: VariableId,
    /// Colon-delimited key path.
    pub key: String,
    /// Raw textual value.
    pub value: String,
    /// Coercion applied when rebuilding JSON.
    pub value_type: ValueType,
    /// Scope the variable is defined for.
    pub scope: Scope,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Variable {
    /// Key, value and type of this variable as a flat entry.
    pub fn to_entry(&self) -> FlatEntry {
        FlatEntry::new(self.key.clone(), self.value.clone(), self.value_type)
    }

    /// True when the stored value text and type equal the entry's.
    pub fn holds_value_of(&self, entry: &FlatEntry) -> bool {
        self.value == entry.value && self.value_type == entry.value_type
    }
}

/// A variable that is not disqualified for a request, with its score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Candidate variable.
    pub variable: Variable,
    /// Number of application and tag links matched by the request.
    pub specificity: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn value_type_uses_storage_labels() {
        assert_eq!(
            serde_json::to_string(&ValueType::Boolean).expect("serialize"),
            "\"Boolean\""
        );
        assert_eq!("Number".parse::<ValueType>(), Ok(ValueType::Number));
        assert_eq!(
            "number".parse::<ValueType>(),
            Err(UnknownValueType("number".to_string()))
        );
    }

    #[test]
    fn scope_equality_ignores_input_order() {
        let a = Scope::new([3, 1], [9]);
        let b = Scope::new([1, 3, 3], [9]);
        assert_eq!(a, b);
        assert_eq!(a.canonical_key(), "a=1,3;t=9");
        assert_eq!(Scope::unscoped().canonical_key(), "a=;t=");
    }

    #[test]
    fn coverage_requires_subset_on_both_dimensions() {
        let request = Scope::single_tag([1], Some(7));
        assert!(Scope::unscoped().is_covered_by(&request));
        assert!(Scope::single_tag([1], None).is_covered_by(&request));
        assert!(Scope::single_tag([], Some(7)).is_covered_by(&request));
        assert!(!Scope::single_tag([1], Some(8)).is_covered_by(&request));
        assert!(!Scope::new([1, 2], []).is_covered_by(&request));
    }

    #[test]
    fn scope_deserializes_from_camel_case() {
        let scope: Scope =
            serde_json::from_str(r#"{ "applicationIds": [2, 1], "tagIds": [] }"#).expect("scope");
        assert_eq!(scope, Scope::new([1, 2], []));
        assert_eq!(scope.dimension_count(), 2);
    }

    #[test]
    fn variable_compares_value_and_type_with_entry() {
        let now = Utc::now();
        let variable = Variable {
            id: 1,
            key: "Port".to_string(),
            value: "8080".to_string(),
            value_type: ValueType::Number,
            scope: Scope::unscoped(),
            created_at: now,
            updated_at: now,
        };
        assert!(variable.holds_value_of(&FlatEntry::new("Port", "8080", ValueType::Number)));
        assert!(!variable.holds_value_of(&FlatEntry::new("Port", "8080", ValueType::String)));
        assert!(!variable.holds_value_of(&FlatEntry::new("Port", "8081", ValueType::Number)));
        assert_eq!(variable.to_entry(), FlatEntry::new("Port", "8080", ValueType::Number));
    }
}
