use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    errors::{ValidationError, ValidationResult},
    model::{Identified, OwnedRecord, Record, Society, check_amount, check_url, fields},
};

/// A scheduled happening owned by one society.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "fields::amount")]
    pub fee: f64,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "fields::non_empty")]
    pub background_image: Option<String>,
    /// Owning society; may be blank on documents written before ownership was recorded.
    #[serde(default)]
    pub society: String,
}

impl Identified for Event {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for Event {
    const COLLECTION: &'static str = "events";

    fn validate(&self) -> ValidationResult<()> {
        let mut issues = Vec::new();
        check_amount("fee", self.fee, &mut issues);
        check_url("backgroundImage", self.background_image.as_deref(), &mut issues);
        ValidationError::into_result(issues)
    }
}

impl OwnedRecord for Event {
    const SOCIETY_LIST: &'static str = "events";
    const IMAGE_FIELD: &'static str = "backgroundImage";
    const IMAGE_FOLDER: &'static str = "events/backgroundImages";

    fn society(&self) -> &str {
        &self.society
    }

    fn image(&self) -> Option<&str> {
        self.background_image.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn listed(society: &Society) -> &[String] {
        &society.events
    }

    fn listed_mut(society: &mut Society) -> &mut Vec<String> {
        &mut society.events
    }
}

/// An event with its owning society's display fields resolved.
///
/// The society fields stay `None` when the society could not be read.
#[derive(Debug, Clone, PartialEq)]
pub struct EventListing {
    pub event: Event,
    pub society_name: Option<String>,
    pub society_logo: Option<String>,
}

impl EventListing {
    pub fn unresolved(event: Event) -> Self {
        Self {
            event,
            society_name: None,
            society_logo: None,
        }
    }
}

impl Identified for EventListing {
    fn id(&self) -> &str {
        &self.event.id
    }
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
    fn decodes_event_with_string_fee_and_blank_image() {
        let event: Event = decode_record(&snapshot(
            "E1",
            json!({
                "name": "Orientation",
                "fee": "25",
                "time": "2026-09-01T10:00:00Z",
                "backgroundImage": "",
                "society": "S1"
            }),
        ))
        .expect("decode");
        assert_eq!(event.id, "E1");
        assert_eq!(event.fee, 25.0);
        assert_eq!(event.background_image, None);
        assert_eq!(event.location, "");
    }

    #[test]
    fn rejects_negative_fee() {
        let err = decode_record::<Event>(&snapshot("E2", json!({ "fee": -1, "time": "2026-09-01T10:00:00Z" })))
            .expect_err("invalid event");
        assert!(err.to_string().contains("fee"));
    }

    #[test]
    fn missing_owner_decodes_as_blank() {
        let event: Event = decode_record(&snapshot("E4", json!({ "time": "2026-09-01T10:00:00Z" }))).expect("decode");
        assert_eq!(event.society, "");
        let event: Event =
            decode_record(&snapshot("E5", json!({ "time": "2026-09-01T10:00:00Z", "society": "" }))).expect("decode");
        assert_eq!(event.society, "");
    }

    #[test]
    fn missing_time_is_a_decode_error() {
        assert!(decode_record::<Event>(&snapshot("E3", json!({ "society": "S1" }))).is_err());
    }
}
