use serde::{Deserialize, Serialize};

use crate::{
    errors::{ValidationError, ValidationResult},
    model::{Identified, Record, check_url, fields},
};

/// A club. Owns its events, posts and merchandise by listing their ids.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Society {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "fields::non_empty")]
    pub logo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "fields::non_empty")]
    pub background_image: Option<String>,
    /// Display counter only.
    #[serde(default)]
    pub members: u64,
    #[serde(default, deserialize_with = "fields::id_list")]
    pub events: Vec<String>,
    #[serde(default, deserialize_with = "fields::id_list")]
    pub merch: Vec<String>,
    #[serde(default, deserialize_with = "fields::id_list")]
    pub posts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "fields::non_empty")]
    pub passkey: Option<String>,
}

impl Identified for Society {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for Society {
    const COLLECTION: &'static str = "societies";

    fn validate(&self) -> ValidationResult<()> {
        let mut issues = Vec::new();
        check_url("logo", self.logo.as_deref(), &mut issues);
        check_url("backgroundImage", self.background_image.as_deref(), &mut issues);
        ValidationError::into_result(issues)
    }
}

/// Read-only tag shown on society cards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub text_color: String,
}

impl Identified for Category {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for Category {
    const COLLECTION: &'static str = "categories";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{model::decode_record, store::DocumentSnapshot};
    use serde_json::{Value, json};

    fn snapshot(id: &str, value: Value) -> DocumentSnapshot {
        match value {
            Value::Object(map) => DocumentSnapshot::new(id, map),
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn decodes_society_lists_in_stored_order() {
        let society: Society = decode_record(&snapshot(
            "S1",
            json!({ "name": "Chess", "events": ["E9", "E1"], "merch": {}, "logo": "https://cdn.example.com/chess.png" }),
        ))
        .expect("decode");
        assert_eq!(society.events, ["E9", "E1"]);
        assert!(society.merch.is_empty());
        assert!(society.posts.is_empty());
        assert_eq!(society.passkey, None);
    }

    #[test]
    fn rejects_non_url_logo() {
        assert!(decode_record::<Society>(&snapshot("S2", json!({ "logo": "chess.png" }))).is_err());
    }

    #[test]
    fn decodes_category() {
        let category: Category = decode_record(&snapshot(
            "sports",
            json!({ "name": "Sports", "color": "#ff0000", "textColor": "#ffffff" }),
        ))
        .expect("decode");
        assert_eq!(category.text_color, "#ffffff");
    }
}
