use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    errors::{ValidationError, ValidationIssue, ValidationResult},
    model::{Identified, Record, check_url, fields},
    validators::{is_valid_email, is_valid_url},
};

/// Which membership set of a user a mutation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Events,
    Societies,
}

impl Relation {
    /// Field of the user document holding this set.
    pub fn field(self) -> &'static str {
        match self {
            Relation::Events => "joinedEvents",
            Relation::Societies => "joinedSocieties",
        }
    }

    /// Collection the set's ids point into.
    pub fn collection(self) -> &'static str {
        match self {
            Relation::Events => "events",
            Relation::Societies => "societies",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

/// The signed-in person, keyed by their email.
///
/// Only the identity and the two membership sets can make a snapshot unreadable; profile fields
/// that are blank, mistyped or malformed read as absent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "id")]
    pub identity: String,
    #[serde(default, deserialize_with = "fields::id_list")]
    pub joined_events: BTreeSet<String>,
    #[serde(default, deserialize_with = "fields::id_list")]
    pub joined_societies: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "fields::loose_text")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "fields::loose_text")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "fields::loose_text")]
    pub degree: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "fields::loose_text")]
    pub major: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "fields::loose_text")]
    pub year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "fields::loose_text")]
    pub university_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "fields::loose_text")]
    pub picture: Option<String>,
}

impl User {
    /// A fresh account with no memberships.
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            ..Self::default()
        }
    }

    pub fn relation(&self, relation: Relation) -> &BTreeSet<String> {
        match relation {
            Relation::Events => &self.joined_events,
            Relation::Societies => &self.joined_societies,
        }
    }

    pub fn relation_mut(&mut self, relation: Relation) -> &mut BTreeSet<String> {
        match relation {
            Relation::Events => &mut self.joined_events,
            Relation::Societies => &mut self.joined_societies,
        }
    }
}

impl Identified for User {
    fn id(&self) -> &str {
        &self.identity
    }
}

impl Record for User {
    const COLLECTION: &'static str = "users";

    fn normalize(&mut self) {
        if let Some(picture) = self.picture.take_if(|picture| !is_valid_url(picture)) {
            warn!(identity = %self.identity, picture = %picture, "dropping invalid profile picture");
        }
    }

    fn validate(&self) -> ValidationResult<()> {
        let mut issues = Vec::new();
        if !is_valid_email(&self.identity) {
            issues.push(ValidationIssue::new(
                "id",
                "validation.email",
                "user identity must be a valid email address",
            ));
        }
        check_url("picture", self.picture.as_deref(), &mut issues);
        ValidationError::into_result(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{decode_record, encode_record},
        store::DocumentSnapshot,
    };
    use serde_json::{Value, json};

    fn snapshot(id: &str, value: Value) -> DocumentSnapshot {
        match value {
            Value::Object(map) => DocumentSnapshot::new(id, map),
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn decodes_user_with_key_as_identity() {
        let user: User = decode_record(&snapshot(
            "ada@connect.hku.hk",
            json!({ "joinedEvents": ["E2", "E1"], "joinedSocieties": {}, "name": "Ada", "bio": "" }),
        ))
        .expect("decode");
        assert_eq!(user.identity, "ada@connect.hku.hk");
        assert_eq!(user.joined_events.iter().collect::<Vec<_>>(), ["E1", "E2"]);
        assert!(user.joined_societies.is_empty());
        assert_eq!(user.name.as_deref(), Some("Ada"));
        assert_eq!(user.bio, None);
    }

    #[test]
    fn malformed_profile_fields_read_as_absent() {
        let user: User = decode_record(&snapshot(
            "ada@connect.hku.hk",
            json!({ "joinedEvents": ["E1"], "picture": "avatars/ada.png", "year": 3, "major": ["CS"] }),
        ))
        .expect("decode");
        assert_eq!(user.picture, None);
        assert_eq!(user.year, None);
        assert_eq!(user.major, None);
        assert!(user.joined_events.contains("E1"));
    }

    #[test]
    fn invalid_picture_is_still_rejected_on_write() {
        let mut user = User::new("ada@connect.hku.hk");
        user.picture = Some("avatars/ada.png".into());
        assert!(encode_record(&user).is_err());
    }

    #[test]
    fn rejects_non_email_identity() {
        let err = decode_record::<User>(&snapshot("not-an-email", json!({}))).expect_err("invalid identity");
        assert!(err.to_string().contains("users/not-an-email"));
    }

    #[test]
    fn encodes_without_key_and_with_empty_sets() {
        let body = encode_record(&User::new("ada@connect.hku.hk")).expect("encode");
        assert!(!body.contains_key("id"));
        assert_eq!(body["joinedEvents"], json!([]));
        assert_eq!(body["joinedSocieties"], json!([]));
        assert!(!body.contains_key("name"));
    }

    #[test]
    fn relation_fields() {
        assert_eq!(Relation::Events.field(), "joinedEvents");
        assert_eq!(Relation::Societies.field(), "joinedSocieties");
        assert_eq!(Relation::Societies.to_string(), "societies");
    }
}
