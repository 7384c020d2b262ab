//! Typed records and the schema boundary.
//!
//! Documents arrive from the store as loosely typed JSON maps. [`decode_record`] turns one into a
//! typed record (injecting the document key as `id`, normalizing, then validating) so nothing past this module
//! handles optional-maybe fields; [`encode_record`] is the reverse for writes.

mod content;
mod event;
pub mod fields;
mod society;
mod user;

pub use content::{Merchandise, Post};
pub use event::{Event, EventListing};
pub use society::{Category, Society};
pub use user::{Relation, User};

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    errors::{StoreError, ValidationIssue, ValidationResult},
    store::{Document, DocumentSnapshot},
    validators::is_valid_url,
};

/// Anything shown in a list keyed by document id.
pub trait Identified {
    fn id(&self) -> &str;
}

/// A typed document of a remote collection.
pub trait Record: Identified + Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection the record lives in.
    const COLLECTION: &'static str;

    /// Repairs or drops non-essential fields after reading, before validation.
    fn normalize(&mut self) {}

    fn validate(&self) -> ValidationResult<()> {
        Ok(())
    }
}

/// A record owned by exactly one society, listed on the society document.
pub trait OwnedRecord: Record {
    /// Field of the society document listing ids of this kind.
    const SOCIETY_LIST: &'static str;
    /// Field holding the record's image URL.
    const IMAGE_FIELD: &'static str;
    /// Blob folder the record's image is uploaded under.
    const IMAGE_FOLDER: &'static str;

    fn society(&self) -> &str;
    fn image(&self) -> Option<&str>;
    fn set_id(&mut self, id: String);

    /// The society's list of ids of this kind.
    fn listed(society: &Society) -> &[String];
    fn listed_mut(society: &mut Society) -> &mut Vec<String>;
}

/// Converts a raw snapshot into a typed record.
pub fn decode_record<T: Record>(snapshot: &DocumentSnapshot) -> Result<T, StoreError> {
    let mut data = snapshot.data.clone();
    data.insert("id".to_string(), Value::String(snapshot.id.clone()));
    let mut record: T = serde_json::from_value(Value::Object(data))
        .map_err(|err| StoreError::decode(T::COLLECTION, &snapshot.id, err.to_string()))?;
    record.normalize();
    record
        .validate()
        .map_err(|err| StoreError::decode(T::COLLECTION, &snapshot.id, format!("{:?}", err.issues)))?;
    Ok(record)
}

/// Converts a typed record into the body stored remotely (the key is not part of the body).
pub fn encode_record<T: Record>(record: &T) -> Result<Document, StoreError> {
    record.validate()?;
    match serde_json::to_value(record) {
        Ok(Value::Object(mut data)) => {
            data.remove("id");
            Ok(data)
        }
        Ok(other) => Err(StoreError::InvalidRequest {
            message: format!("{} record serialized to {other}", T::COLLECTION),
        }),
        Err(err) => Err(StoreError::InvalidRequest {
            message: format!("failed to serialize {} record: {err}", T::COLLECTION),
        }),
    }
}

fn check_url(field: &str, value: Option<&str>, issues: &mut Vec<ValidationIssue>) {
    if let Some(candidate) = value
        && !is_valid_url(candidate)
    {
        issues.push(ValidationIssue::new(field, "validation.url", "value must be a valid URL"));
    }
}

fn check_amount(field: &str, value: f64, issues: &mut Vec<ValidationIssue>) {
    if !value.is_finite() || value < 0.0 {
        issues.push(ValidationIssue::new(
            field,
            "validation.range",
            "value must be a non-negative number",
        ));
    }
}

fn check_present(field: &str, value: &str, issues: &mut Vec<ValidationIssue>) {
    if value.trim().is_empty() {
        issues.push(ValidationIssue::new(field, "validation.required", "value is required"));
    }
}
