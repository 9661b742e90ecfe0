//! Shape checks applied to each raw config layer before merging.
//!
//! Layers are partial documents, so every key is optional; only unknown keys
//! and wrongly typed values are rejected.

use crate::ConfigError;
use serde_json::{Map, Value};

/// Expected JSON type of a leaf setting.
#[derive(Debug, Clone, Copy)]
enum Field {
    Text,
    Flag,
    Count,
    Choice(&'static [&'static str]),
}

/// Known sections and the settings each may contain.
const SECTIONS: &[(&str, &[(&str, Field)])] = &[
    (
        "store",
        &[
            ("backend", Field::Choice(&["memory", "sqlite"])),
            ("path", Field::Text),
            ("busy_timeout_ms", Field::Count),
        ],
    ),
    ("auth", &[("clock_skew_seconds", Field::Count)]),
    ("output", &[("pretty", Field::Flag)]),
];

/// Validate one layer; `layer` prefixes the path in error messages.
pub(super) fn validate_layer_schema(value: &Value, layer: &str) -> Result<(), ConfigError> {
    let root = as_object(value, layer, "root")?;
    for (key, value) in root {
        if key == "$schema" {
            check_field(value, Field::Text, layer, key)?;
            continue;
        }
        let Some((_, fields)) = SECTIONS.iter().find(|(name, _)| name == key) else {
            return Err(invalid_field(layer, key, "unknown key"));
        };
        for (setting, value) in as_object(value, layer, key)? {
            let path = format!("{key}.{setting}");
            let Some((_, field)) = fields.iter().find(|(name, _)| name == setting) else {
                return Err(invalid_field(layer, &path, "unknown key"));
            };
            check_field(value, *field, layer, &path)?;
        }
    }
    Ok(())
}

fn as_object<'a>(
    value: &'a Value,
    layer: &str,
    path: &str,
) -> Result<&'a Map<String, Value>, ConfigError> {
    value
        .as_object()
        .ok_or_else(|| invalid_field(layer, path, "expected object"))
}

fn check_field(value: &Value, field: Field, layer: &str, path: &str) -> Result<(), ConfigError> {
    let message = match field {
        Field::Text if !value.is_string() => "expected string".to_string(),
        Field::Flag if !value.is_boolean() => "expected bool".to_string(),
        Field::Count if !value.is_u64() => "expected non-negative integer".to_string(),
        Field::Choice(options) => match value.as_str() {
            Some(choice) if options.contains(&choice) => return Ok(()),
            _ => format!("expected one of: {}", options.join(", ")),
        },
        _ => return Ok(()),
    };
    Err(invalid_field(layer, path, &message))
}

fn invalid_field(layer: &str, path: &str, message: &str) -> ConfigError {
    ConfigError::InvalidField {
        path: format!("{layer}:{path}"),
        message: message.to_string(),
    }
}
