//! Conversion between nested JSON documents and flat key path rows.
//!
//! Object properties and array indices become `:`-joined path segments.
//! Rebuilding a document decides between an array and an object for every
//! intermediate node by looking at the segment that follows it: a
//! non-negative integer makes an array.
//!
//! Array indices are not preserved when rebuilding. Siblings are appended in
//! ascending index order, so `Items:1`, `Items:3` and `Items:5` come back as a
//! three element array.

use log::warn;
use scopecfg_protocol::{FlatEntry, KEY_DELIMITER, MAX_KEY_LENGTH, ValueType};
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use thiserror::Error;

/// Errors produced while flattening or rebuilding documents.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Input text is not valid JSON.
    #[error("malformed JSON document: {0}")]
    Parse(#[from] serde_json::Error),
    /// Documents must be JSON objects at the root.
    #[error("document root must be a JSON object, found {0}")]
    RootNotObject(&'static str),
    /// `null` has no stored representation.
    #[error("null value at `{0}` cannot be stored")]
    NullValue(String),
    /// Only integral numbers representable as `i64` are stored.
    #[error("number at `{path}` is not a 64-bit integer: {value}")]
    UnsupportedNumber { path: String, value: String },
    /// Property names must not contain the path delimiter.
    #[error("property `{0}` contains the key delimiter `:`")]
    DelimiterInName(String),
    /// Flattened key exceeds the stored key length.
    #[error("key `{0}` is longer than {MAX_KEY_LENGTH} characters")]
    KeyTooLong(String),
    /// Stored text cannot be coerced to its declared type.
    #[error("value `{value}` of `{key}` is not a valid {value_type}")]
    InvalidValue {
        key: String,
        value: String,
        value_type: ValueType,
    },
}

/// Parse a JSON document and flatten it.
pub fn flatten_str(document: &str) -> Result<Vec<FlatEntry>, CodecError> {
    let value: Value = serde_json::from_str(document)?;
    flatten(&value)
}

/// Flatten a JSON object into rows sorted by key.
///
/// Empty arrays and objects produce no rows.
pub fn flatten(document: &Value) -> Result<Vec<FlatEntry>, CodecError> {
    let Value::Object(root) = document else {
        return Err(CodecError::RootNotObject(kind_name(document)));
    };
    let mut entries = Vec::new();
    for (name, child) in root {
        check_name(name)?;
        flatten_into(name.clone(), child, &mut entries)?;
    }
    entries.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(entries)
}

fn flatten_into(path: String, value: &Value, out: &mut Vec<FlatEntry>) -> Result<(), CodecError> {
    match value {
        Value::Object(map) => {
            for (name, child) in map {
                check_name(name)?;
                flatten_into(join(&path, name), child, out)?;
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_into(join(&path, &index.to_string()), child, out)?;
            }
        }
        Value::Null => return Err(CodecError::NullValue(path)),
        Value::Bool(flag) => push_leaf(path, flag.to_string(), ValueType::Boolean, out)?,
        Value::String(text) => push_leaf(path, text.clone(), ValueType::String, out)?,
        Value::Number(number) => {
            let text = integral_text(number).ok_or_else(|| CodecError::UnsupportedNumber {
                path: path.clone(),
                value: number.to_string(),
            })?;
            push_leaf(path, text, ValueType::Number, out)?;
        }
    }
    Ok(())
}

fn push_leaf(
    key: String,
    value: String,
    value_type: ValueType,
    out: &mut Vec<FlatEntry>,
) -> Result<(), CodecError> {
    if key.chars().count() > MAX_KEY_LENGTH {
        return Err(CodecError::KeyTooLong(key));
    }
    out.push(FlatEntry {
        key,
        value,
        value_type,
    });
    Ok(())
}

/// Canonical integer text, accepting floats without a fractional part.
fn integral_text(number: &Number) -> Option<String> {
    if let Some(value) = number.as_i64() {
        return Some(value.to_string());
    }
    if number.is_u64() {
        return None;
    }
    let value = number.as_f64()?;
    let in_range = value >= i64::MIN as f64 && value < i64::MAX as f64;
    if value.is_finite() && value.fract() == 0.0 && in_range {
        return Some((value as i64).to_string());
    }
    None
}

fn check_name(name: &str) -> Result<(), CodecError> {
    if name.contains(KEY_DELIMITER) {
        return Err(CodecError::DelimiterInName(name.to_string()));
    }
    Ok(())
}

fn join(prefix: &str, segment: &str) -> String {
    let mut path = String::with_capacity(prefix.len() + segment.len() + 1);
    path.push_str(prefix);
    path.push(KEY_DELIMITER);
    path.push_str(segment);
    path
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Emitted array slot for each (array path, original index) pair.
type SlotMap = HashMap<(String, u64), usize>;

/// Rebuild a JSON object from flat rows.
///
/// Rows may arrive in any order. When two rows disagree about the shape of a
/// node, nested rows win and the conflicting row is skipped with a warning.
/// Repeated keys keep the last row.
pub fn unflatten(entries: &[FlatEntry]) -> Result<Value, CodecError> {
    let mut ordered: Vec<&FlatEntry> = entries.iter().collect();
    ordered.sort_by(|a, b| compare_keys(&a.key, &b.key));

    let mut root = Value::Object(Map::new());
    let mut slots = SlotMap::new();
    for entry in ordered {
        let leaf = typed_value(entry)?;
        let segments: Vec<&str> = entry.key.split(KEY_DELIMITER).collect();
        place(&mut root, None, &segments, leaf, &mut slots, &entry.key);
    }
    Ok(root)
}

/// Order keys segment by segment, comparing numeric segments as numbers.
pub fn compare_keys(a: &str, b: &str) -> Ordering {
    let mut left = a.split(KEY_DELIMITER);
    let mut right = b.split(KEY_DELIMITER);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ordering = match (parse_index(x), parse_index(y)) {
                    (Some(i), Some(j)) => i.cmp(&j).then_with(|| x.cmp(y)),
                    _ => x.cmp(y),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

fn place(
    node: &mut Value,
    parent: Option<&str>,
    segments: &[&str],
    leaf: Value,
    slots: &mut SlotMap,
    key: &str,
) {
    let Some((segment, rest)) = segments.split_first() else {
        return;
    };
    let path = match parent {
        Some(parent) => join(parent, segment),
        None => (*segment).to_string(),
    };
    match node {
        Value::Object(map) => {
            if rest.is_empty() {
                match map.get(*segment) {
                    Some(existing) if is_container(existing) => {
                        warn!("skipping `{key}`: `{path}` already holds nested keys");
                    }
                    _ => {
                        map.insert((*segment).to_string(), leaf);
                    }
                }
                return;
            }
            let child = map
                .entry((*segment).to_string())
                .or_insert_with(|| empty_container(rest[0]));
            make_container(child, &path, rest[0], key);
            place(child, Some(&path), rest, leaf, slots, key);
        }
        Value::Array(items) => {
            let Some(index) = parse_index(segment) else {
                warn!("skipping `{key}`: `{segment}` is not an array index");
                return;
            };
            let slot = *slots
                .entry((parent.unwrap_or_default().to_string(), index))
                .or_insert_with(|| {
                    items.push(match rest.first() {
                        Some(next) => empty_container(next),
                        None => Value::Null,
                    });
                    items.len() - 1
                });
            let Some(child) = items.get_mut(slot) else {
                return;
            };
            if rest.is_empty() {
                if is_container(child) {
                    warn!("skipping `{key}`: `{path}` already holds nested keys");
                } else {
                    *child = leaf;
                }
                return;
            }
            make_container(child, &path, rest[0], key);
            place(child, Some(&path), rest, leaf, slots, key);
        }
        _ => {}
    }
}

/// Replace a scalar sitting where nested keys need a container.
fn make_container(node: &mut Value, path: &str, next_segment: &str, key: &str) {
    if !is_container(node) {
        warn!("`{key}` replaces the value stored at `{path}`");
        *node = empty_container(next_segment);
    }
}

fn empty_container(next_segment: &str) -> Value {
    if parse_index(next_segment).is_some() {
        Value::Array(Vec::new())
    } else {
        Value::Object(Map::new())
    }
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Array(_) | Value::Object(_))
}

fn parse_index(segment: &str) -> Option<u64> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

fn typed_value(entry: &FlatEntry) -> Result<Value, CodecError> {
    let invalid = || CodecError::InvalidValue {
        key: entry.key.clone(),
        value: entry.value.clone(),
        value_type: entry.value_type,
    };
    match entry.value_type {
        ValueType::String => Ok(Value::String(entry.value.clone())),
        ValueType::Number => entry
            .value
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| invalid()),
        ValueType::Boolean => {
            let text = entry.value.trim();
            if text.eq_ignore_ascii_case("true") {
                Ok(Value::Bool(true))
            } else if text.eq_ignore_ascii_case("false") {
                Ok(Value::Bool(false))
            } else {
                Err(invalid())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn string(key: &str, value: &str) -> FlatEntry {
        FlatEntry::new(key, value, ValueType::String)
    }

    #[test]
    fn simple_key_value() {
        let entries = flatten(&json!({ "Foo": "Bar" })).expect("flatten");
        assert_eq!(entries, vec![string("Foo", "Bar")]);
        assert_eq!(unflatten(&entries).expect("unflatten"), json!({ "Foo": "Bar" }));
    }

    #[test]
    fn arrays_use_index_segments() {
        let entries = flatten(&json!({ "Foo": ["Test1", "Test2"] })).expect("flatten");
        assert_eq!(
            entries,
            vec![string("Foo:0", "Test1"), string("Foo:1", "Test2")]
        );
        assert_eq!(
            unflatten(&entries).expect("unflatten"),
            json!({ "Foo": ["Test1", "Test2"] })
        );
    }

    #[test]
    fn mixed_document_is_typed_and_sorted() {
        let document = json!({
            "Panel Members": [{ "FirstName": "Stephen", "LastName": "Fry" }],
            "Count": 145,
            "Recorded": true
        });
        let entries = flatten(&document).expect("flatten");
        assert_eq!(
            entries,
            vec![
                FlatEntry::new("Count", "145", ValueType::Number),
                string("Panel Members:0:FirstName", "Stephen"),
                string("Panel Members:0:LastName", "Fry"),
                FlatEntry::new("Recorded", "true", ValueType::Boolean),
            ]
        );
        assert_eq!(unflatten(&entries).expect("unflatten"), document);
    }

    #[test]
    fn gaps_are_compacted() {
        let entries = vec![
            string("DeletedVariables:5", "C"),
            string("DeletedVariables:1", "A"),
            string("DeletedVariables:3", "B"),
        ];
        assert_eq!(
            unflatten(&entries).expect("unflatten"),
            json!({ "DeletedVariables": ["A", "B", "C"] })
        );
    }

    #[test]
    fn repeated_index_reuses_its_slot() {
        let entries = vec![
            string("Servers:4:Host", "b"),
            string("Servers:2:Host", "a"),
            string("Servers:2:Port", "80"),
            string("Servers:4:Port", "81"),
        ];
        assert_eq!(
            unflatten(&entries).expect("unflatten"),
            json!({ "Servers": [
                { "Host": "a", "Port": "80" },
                { "Host": "b", "Port": "81" }
            ] })
        );
    }

    #[test]
    fn long_arrays_keep_numeric_order() {
        let items: Vec<String> = (0..12).map(|i| format!("item{i}")).collect();
        let document = json!({ "List": items });
        let entries = flatten(&document).expect("flatten");
        assert_eq!(entries[2].key, "List:10");
        assert_eq!(unflatten(&entries).expect("unflatten"), document);
    }

    #[test]
    fn numeric_root_keys_stay_object_properties() {
        let document = json!({ "0": "zero", "1": "one" });
        let entries = flatten(&document).expect("flatten");
        assert_eq!(entries[0].key, "0");
        let rebuilt = unflatten(&entries).expect("unflatten");
        assert_eq!(rebuilt, document);
        assert!(rebuilt.is_object());
    }

    #[test]
    fn root_must_be_an_object() {
        assert!(matches!(
            flatten(&json!(["a"])),
            Err(CodecError::RootNotObject("an array"))
        ));
        assert!(matches!(
            flatten_str("{ not json"),
            Err(CodecError::Parse(_))
        ));
    }

    #[test]
    fn rejects_values_without_a_stored_form() {
        assert!(matches!(
            flatten(&json!({ "A": null })),
            Err(CodecError::NullValue(path)) if path == "A"
        ));
        assert!(matches!(
            flatten(&json!({ "A": [1.5] })),
            Err(CodecError::UnsupportedNumber { path, .. }) if path == "A:0"
        ));
        assert!(matches!(
            flatten(&json!({ "A": u64::MAX })),
            Err(CodecError::UnsupportedNumber { .. })
        ));
        assert!(matches!(
            flatten(&json!({ "A:B": 1 })),
            Err(CodecError::DelimiterInName(_))
        ));
        let long = "k".repeat(MAX_KEY_LENGTH + 1);
        assert!(matches!(
            flatten(&json!({ long: "x" })),
            Err(CodecError::KeyTooLong(_))
        ));
    }

    #[test]
    fn integral_floats_are_stored_as_integers() {
        let entries = flatten(&json!({ "Port": 8080.0 })).expect("flatten");
        assert_eq!(entries, vec![FlatEntry::new("Port", "8080", ValueType::Number)]);
    }

    #[test]
    fn empty_containers_produce_no_rows() {
        let entries = flatten(&json!({ "A": [], "B": {}, "C": "x" })).expect("flatten");
        assert_eq!(entries, vec![string("C", "x")]);
    }

    #[test]
    fn coerces_stored_text() {
        let entries = vec![
            FlatEntry::new("Count", "145", ValueType::Number),
            FlatEntry::new("Enabled", "True", ValueType::Boolean),
            FlatEntry::new("Label", "007", ValueType::String),
        ];
        assert_eq!(
            unflatten(&entries).expect("unflatten"),
            json!({ "Count": 145, "Enabled": true, "Label": "007" })
        );
        let bad = vec![FlatEntry::new("Count", "1.5", ValueType::Number)];
        assert!(matches!(
            unflatten(&bad),
            Err(CodecError::InvalidValue { .. })
        ));
        let bad = vec![FlatEntry::new("On", "yes", ValueType::Boolean)];
        assert!(unflatten(&bad).is_err());
    }

    #[test]
    fn shape_conflicts_prefer_nested_keys() {
        let entries = vec![
            string("A", "scalar"),
            string("A:B", "nested"),
            string("List:0", "first"),
            string("List:name", "ignored"),
        ];
        assert_eq!(
            unflatten(&entries).expect("unflatten"),
            json!({ "A": { "B": "nested" }, "List": ["first"] })
        );
    }

    #[test]
    fn key_comparison_is_segment_aware() {
        assert_eq!(compare_keys("List:2", "List:10"), Ordering::Less);
        assert_eq!(compare_keys("List:10", "List:9:Name"), Ordering::Greater);
        assert_eq!(compare_keys("A", "A:0"), Ordering::Less);
        assert_eq!(compare_keys("Alpha", "Beta"), Ordering::Less);
    }
}
