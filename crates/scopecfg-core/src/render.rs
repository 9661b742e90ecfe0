//! Text rendering of merged documents.

use crate::error::CoreError;
use serde_json::Value;

/// Render a document as JSON text.
///
/// Object keys come out in ascending order and non-ASCII text is written
/// unescaped.
pub fn render_document(document: &Value, pretty: bool) -> Result<String, CoreError> {
    let text = if pretty {
        serde_json::to_string_pretty(document)?
    } else {
        serde_json::to_string(document)?
    };
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::render_document;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn compact_output_is_sorted() {
        let document = json!({ "b": 1, "a": { "d": true, "c": "é" } });
        assert_eq!(
            render_document(&document, false).expect("render"),
            r#"{"a":{"c":"é","d":true},"b":1}"#
        );
    }

    #[test]
    fn pretty_output_is_indented() {
        let rendered = render_document(&json!({ "a": [1] }), true).expect("render");
        assert_eq!(rendered, "{\n  \"a\": [\n    1\n  ]\n}");
    }
}
