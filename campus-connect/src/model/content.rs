use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    errors::{ValidationError, ValidationResult},
    model::{Identified, OwnedRecord, Record, Society, check_amount, check_present, check_url, fields},
};

/// An item sold by a society.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Merchandise {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "fields::amount")]
    pub price: f64,
    #[serde(default, deserialize_with = "fields::flag")]
    pub availability: bool,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "fields::non_empty")]
    pub image: Option<String>,
    pub society: String,
}

impl Identified for Merchandise {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for Merchandise {
    const COLLECTION: &'static str = "merch";

    fn validate(&self) -> ValidationResult<()> {
        let mut issues = Vec::new();
        check_amount("price", self.price, &mut issues);
        check_url("image", self.image.as_deref(), &mut issues);
        check_present("society", &self.society, &mut issues);
        ValidationError::into_result(issues)
    }
}

impl OwnedRecord for Merchandise {
    const SOCIETY_LIST: &'static str = "merch";
    const IMAGE_FIELD: &'static str = "image";
    const IMAGE_FOLDER: &'static str = "merch/images";

    fn society(&self) -> &str {
        &self.society
    }

    fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn listed(society: &Society) -> &[String] {
        &society.merch
    }

    fn listed_mut(society: &mut Society) -> &mut Vec<String> {
        &mut society.merch
    }
}

/// A society announcement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub caption: String,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "fields::non_empty")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    pub society: String,
}

impl Identified for Post {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for Post {
    const COLLECTION: &'static str = "posts";

    fn validate(&self) -> ValidationResult<()> {
        let mut issues = Vec::new();
        check_url("image", self.image.as_deref(), &mut issues);
        check_present("society", &self.society, &mut issues);
        ValidationError::into_result(issues)
    }
}

impl OwnedRecord for Post {
    const SOCIETY_LIST: &'static str = "posts";
    const IMAGE_FIELD: &'static str = "image";
    const IMAGE_FOLDER: &'static str = "posts/images";

    fn society(&self) -> &str {
        &self.society
    }

    fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn listed(society: &Society) -> &[String] {
        &society.posts
    }

    fn listed_mut(society: &mut Society) -> &mut Vec<String> {
        &mut society.posts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::encode_record;
    use serde_json::json;

    #[test]
    fn merch_encodes_camel_case_without_id() {
        let item = Merchandise {
            id: "M1".into(),
            name: "Hoodie".into(),
            description: String::new(),
            price: 159.99,
            availability: true,
            image: None,
            society: "S1".into(),
        };
        let body = encode_record(&item).expect("encode");
        assert!(!body.contains_key("id"));
        assert_eq!(body["price"], json!(159.99));
        assert!(!body.contains_key("image"));
    }

    #[test]
    fn post_without_owner_fails_validation() {
        let post = Post {
            id: String::new(),
            caption: "hello".into(),
            image: None,
            date: None,
            society: " ".into(),
        };
        assert!(post.validate().is_err());
    }
}
