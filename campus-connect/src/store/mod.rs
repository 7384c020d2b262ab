//! Document database contract.
//!
//! The rest of the crate talks to the remote database only through [`DocumentStore`]:
//! point reads, live subscriptions, whole-document writes and field-level patches.
//! Two backends ship with the crate:
//! - [`MemoryStore`] - in-process store with change fan-out, spy counters and fault injection
//! - [`RedisStore`] - JSON documents in Redis, patched by Lua scripts, change feed over pub/sub

mod memory;
mod redis_store;
mod scripts;

pub use memory::MemoryStore;
pub use redis_store::{ReconnectPolicy, RedisStore};

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::errors::StoreError;

/// Raw, loosely typed document body as stored remotely.
pub type Document = Map<String, Value>;

/// A document body together with its key.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub id: String,
    pub data: Document,
}

impl DocumentSnapshot {
    pub fn new(id: impl Into<String>, data: Document) -> Self {
        Self { id: id.into(), data }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Eq,
    ArrayContains,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl FieldFilter {
    fn matches(&self, data: &Document) -> bool {
        let Some(candidate) = data.get(&self.field) else {
            return false;
        };
        match self.op {
            FilterOp::Eq => candidate == &self.value,
            FilterOp::ArrayContains => candidate
                .as_array()
                .is_some_and(|items| items.contains(&self.value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub order: SortOrder,
}

/// Filter and ordering applied to a collection subscription.
///
/// Documents lacking the `order_by` field are excluded from ordered results and ties
/// break by document id, matching hosted document-store query semantics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionQuery {
    pub filters: Vec<FieldFilter>,
    pub order_by: Option<OrderBy>,
}

impl CollectionQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(FieldFilter {
            field: field.into(),
            op: FilterOp::Eq,
            value: value.into(),
        });
        self
    }

    pub fn where_array_contains(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(FieldFilter {
            field: field.into(),
            op: FilterOp::ArrayContains,
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            order,
        });
        self
    }

    /// Filters and orders a full collection listing.
    pub fn apply(&self, mut docs: Vec<DocumentSnapshot>) -> Vec<DocumentSnapshot> {
        docs.retain(|doc| self.filters.iter().all(|filter| filter.matches(&doc.data)));
        match &self.order_by {
            Some(order_by) => {
                docs.retain(|doc| doc.data.contains_key(&order_by.field));
                docs.sort_by(|a, b| {
                    let ordering = match (a.data.get(&order_by.field), b.data.get(&order_by.field)) {
                        (Some(left), Some(right)) => compare_values(left, right),
                        _ => Ordering::Equal,
                    };
                    let ordering = match order_by.order {
                        SortOrder::Asc => ordering,
                        SortOrder::Desc => ordering.reverse(),
                    };
                    ordering.then_with(|| a.id.cmp(&b.id))
                });
            }
            None => docs.sort_by(|a, b| a.id.cmp(&b.id)),
        }
        docs
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: null < bool < number < string < array < object.
pub(crate) fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => {
            for (x, y) in a.iter().zip(b.iter()) {
                let ordering = compare_values(x, y);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            a.len().cmp(&b.len())
        }
        _ => type_rank(left).cmp(&type_rank(right)),
    }
}

/// One field-level operation of an update.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldUpdate {
    Set { field: String, value: Value },
    DeleteField { field: String },
    /// Appends `value` unless an equal element is already present.
    ArrayAppend { field: String, value: Value },
    /// Removes every element equal to `value`.
    ArrayRemove { field: String, value: Value },
}

/// Ordered list of field operations applied atomically by `update_document`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DocumentPatch {
    operations: Vec<FieldUpdate>,
}

impl DocumentPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.operations.push(FieldUpdate::Set {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn delete_field(mut self, field: impl Into<String>) -> Self {
        self.operations.push(FieldUpdate::DeleteField { field: field.into() });
        self
    }

    pub fn array_append(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.operations.push(FieldUpdate::ArrayAppend {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn array_remove(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.operations.push(FieldUpdate::ArrayRemove {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Builds a patch that overwrites every field present in `data`.
    pub fn from_document(data: Document) -> Self {
        data.into_iter().fold(Self::new(), |patch, (field, value)| patch.set(field, value))
    }

    pub fn operations(&self) -> &[FieldUpdate] {
        &self.operations
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Applies the operations to a local document body.
    pub fn apply_to(&self, data: &mut Document) {
        for operation in &self.operations {
            match operation {
                FieldUpdate::Set { field, value } => {
                    data.insert(field.clone(), value.clone());
                }
                FieldUpdate::DeleteField { field } => {
                    data.remove(field);
                }
                FieldUpdate::ArrayAppend { field, value } => {
                    let slot = data.entry(field.clone()).or_insert_with(|| Value::Array(Vec::new()));
                    if !slot.is_array() {
                        *slot = Value::Array(Vec::new());
                    }
                    if let Value::Array(items) = slot
                        && !items.contains(value)
                    {
                        items.push(value.clone());
                    }
                }
                FieldUpdate::ArrayRemove { field, value } => {
                    let slot = data.entry(field.clone()).or_insert_with(|| Value::Array(Vec::new()));
                    match slot {
                        Value::Array(items) => items.retain(|item| item != value),
                        other => *other = Value::Array(Vec::new()),
                    }
                }
            }
        }
    }
}

/// A live feed of snapshots.
///
/// The first item is the state at subscription time; every later item follows a remote
/// change. Dropping the subscription (or calling [`Subscription::cancel`]) tears the feed down.
pub struct Subscription<T> {
    receiver: mpsc::UnboundedReceiver<Result<T, StoreError>>,
    forwarder: Option<JoinHandle<()>>,
}

impl<T> Subscription<T> {
    pub fn new(receiver: mpsc::UnboundedReceiver<Result<T, StoreError>>) -> Self {
        Self {
            receiver,
            forwarder: None,
        }
    }

    /// Attaches the task that feeds this subscription; it is aborted on teardown.
    pub fn with_forwarder(mut self, forwarder: JoinHandle<()>) -> Self {
        self.forwarder = Some(forwarder);
        self
    }

    /// Waits for the next snapshot. Returns `None` once the feed is closed.
    pub async fn next(&mut self) -> Option<Result<T, StoreError>> {
        self.receiver.recv().await
    }

    pub fn cancel(self) {}
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.receiver.close();
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}

/// Contract of the remote document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<DocumentSnapshot>, StoreError>;

    async fn subscribe_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Subscription<Option<DocumentSnapshot>>, StoreError>;

    async fn subscribe_collection(
        &self,
        collection: &str,
        query: CollectionQuery,
    ) -> Result<Subscription<Vec<DocumentSnapshot>>, StoreError>;

    async fn set_document(&self, collection: &str, id: &str, data: Document) -> Result<(), StoreError>;

    /// Applies `patch` to an existing document; fails with `NotFound` if it does not exist.
    async fn update_document(&self, collection: &str, id: &str, patch: DocumentPatch) -> Result<(), StoreError>;

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// Stores `data` under a freshly generated key and returns that key.
    async fn add_document(&self, collection: &str, data: Document) -> Result<String, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, value: Value) -> DocumentSnapshot {
        match value {
            Value::Object(data) => DocumentSnapshot::new(id, data),
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn query_orders_by_field_then_id_and_drops_missing() {
        let docs = vec![
            doc("c", json!({ "name": "Chess" })),
            doc("a", json!({ "name": "Archery" })),
            doc("x", json!({ "description": "nameless" })),
            doc("b", json!({ "name": "Archery" })),
        ];
        let ordered = CollectionQuery::new().order_by("name", SortOrder::Asc).apply(docs);
        let ids: Vec<_> = ordered.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn query_descending_and_filters() {
        let docs = vec![
            doc("e1", json!({ "society": "s1", "fee": 10 })),
            doc("e2", json!({ "society": "s2", "fee": 5 })),
            doc("e3", json!({ "society": "s1", "fee": 30 })),
        ];
        let ordered = CollectionQuery::new()
            .where_eq("society", "s1")
            .order_by("fee", SortOrder::Desc)
            .apply(docs);
        let ids: Vec<_> = ordered.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["e3", "e1"]);
    }

    #[test]
    fn array_contains_filter() {
        let docs = vec![
            doc("u1", json!({ "joinedEvents": ["E1", "E2"] })),
            doc("u2", json!({ "joinedEvents": ["E3"] })),
        ];
        let matched = CollectionQuery::new().where_array_contains("joinedEvents", "E2").apply(docs);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, "u1");
    }

    #[test]
    fn patch_array_ops_behave_like_union_and_remove() {
        let mut data = match json!({ "joinedEvents": ["E1"], "bio": "hi" }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        DocumentPatch::new()
            .array_append("joinedEvents", "E1")
            .array_append("joinedEvents", "E2")
            .array_remove("joinedSocieties", "S1")
            .delete_field("bio")
            .apply_to(&mut data);
        assert_eq!(data["joinedEvents"], json!(["E1", "E2"]));
        assert_eq!(data["joinedSocieties"], json!([]));
        assert!(!data.contains_key("bio"));

        DocumentPatch::new().array_remove("joinedEvents", "E1").apply_to(&mut data);
        assert_eq!(data["joinedEvents"], json!(["E2"]));
    }

    #[test]
    fn patch_serializes_as_tagged_operations() {
        let patch = DocumentPatch::new().array_append("events", "E9").set("name", "Chess");
        let encoded = serde_json::to_value(&patch).expect("serialize patch");
        assert_eq!(
            encoded,
            json!([
                { "type": "array_append", "field": "events", "value": "E9" },
                { "type": "set", "field": "name", "value": "Chess" }
            ])
        );
    }
}
