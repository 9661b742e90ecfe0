//! Request bodies accepted by the write endpoint.

use crate::{ApplicationId, Scope, TagId};
use serde::{Deserialize, Serialize};

/// Save request targeting at most one tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SaveConfigRequest {
    /// Applications the document is scoped to.
    #[serde(default)]
    pub application_ids: Vec<ApplicationId>,
    /// Optional tag the document is scoped to.
    #[serde(default)]
    pub tag_id: Option<TagId>,
    /// Nested JSON document as text.
    pub json: String,
}

impl SaveConfigRequest {
    /// Split into the target scope and the raw document.
    pub fn into_parts(self) -> (Scope, String) {
        (Scope::single_tag(self.application_ids, self.tag_id), self.json)
    }
}

/// Save request carrying any number of tags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MultiTagSaveConfigRequest {
    /// Applications the document is scoped to.
    #[serde(default)]
    pub application_ids: Vec<ApplicationId>,
    /// Tags the document is scoped to.
    #[serde(default)]
    pub tag_ids: Vec<TagId>,
    /// Nested JSON document as text.
    pub json: String,
}

impl MultiTagSaveConfigRequest {
    /// Split into the target scope and the raw document.
    pub fn into_parts(self) -> (Scope, String) {
        (Scope::new(self.application_ids, self.tag_ids), self.json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn single_tag_request_parses_null_tag() {
        let request: SaveConfigRequest =
            serde_json::from_str(r#"{ "applicationIds": [4], "tagId": null, "json": "{}" }"#)
                .expect("request");
        let (scope, json) = request.into_parts();
        assert_eq!(scope, Scope::new([4], []));
        assert_eq!(json, "{}");
    }

    #[test]
    fn multi_tag_request_collects_tags() {
        let request: MultiTagSaveConfigRequest = serde_json::from_str(
            r#"{ "applicationIds": [], "tagIds": [5, 2], "json": "{\"A\":1}" }"#,
        )
        .expect("request");
        let (scope, _) = request.into_parts();
        assert_eq!(scope, Scope::new([], [2, 5]));
    }
}
