use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    errors::StoreError,
    id::generate_document_id,
    store::{CollectionQuery, Document, DocumentPatch, DocumentSnapshot, DocumentStore, Subscription},
};

type DocumentSender = mpsc::UnboundedSender<Result<Option<DocumentSnapshot>, StoreError>>;
type CollectionSender = mpsc::UnboundedSender<Result<Vec<DocumentSnapshot>, StoreError>>;

enum Watcher {
    Document {
        collection: String,
        id: String,
        sender: DocumentSender,
    },
    Collection {
        collection: String,
        query: CollectionQuery,
        sender: CollectionSender,
    },
}

impl Watcher {
    fn collection(&self) -> &str {
        match self {
            Watcher::Document { collection, .. } | Watcher::Collection { collection, .. } => collection,
        }
    }

    fn is_closed(&self) -> bool {
        match self {
            Watcher::Document { sender, .. } => sender.is_closed(),
            Watcher::Collection { sender, .. } => sender.is_closed(),
        }
    }
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, BTreeMap<String, Document>>,
    watchers: Vec<Watcher>,
}

impl Inner {
    fn document(&self, collection: &str, id: &str) -> Option<DocumentSnapshot> {
        self.collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| DocumentSnapshot::new(id, data.clone()))
    }

    fn listing(&self, collection: &str, query: &CollectionQuery) -> Vec<DocumentSnapshot> {
        let docs = self
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, data)| DocumentSnapshot::new(id.clone(), data.clone()))
                    .collect()
            })
            .unwrap_or_default();
        query.apply(docs)
    }

    /// Pushes fresh snapshots to every live watcher affected by a change to `collection/id`.
    fn notify(&mut self, collection: &str, id: &str) {
        self.watchers.retain(|watcher| !watcher.is_closed());
        for watcher in &self.watchers {
            match watcher {
                Watcher::Document {
                    collection: watched,
                    id: watched_id,
                    sender,
                } if watched == collection && watched_id == id => {
                    let _ = sender.send(Ok(self.document(collection, id)));
                }
                Watcher::Collection {
                    collection: watched,
                    query,
                    sender,
                } if watched == collection => {
                    let _ = sender.send(Ok(self.listing(collection, query)));
                }
                _ => {}
            }
        }
    }
}

#[derive(Default)]
struct Faults {
    failing_writes: u32,
    failing_reads: HashSet<String>,
}

/// In-process document store.
///
/// Writes fan out synchronously to every live subscription of the touched collection, so a
/// subscriber observes changes in the order they were applied. The store doubles as a test
/// spy: it counts reads and writes and can be told to fail writes, fail point reads on a
/// collection, or push an error into live subscriptions.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    faults: Mutex<Faults>,
    writes: AtomicU64,
    reads: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of successful writes applied so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of point reads served so far.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of subscriptions that are still open.
    pub fn live_subscriptions(&self) -> usize {
        let mut inner = self.inner();
        inner.watchers.retain(|watcher| !watcher.is_closed());
        inner.watchers.len()
    }

    /// Makes the next `count` writes fail with `StoreError::Unavailable`.
    pub fn fail_next_writes(&self, count: u32) {
        self.faults().failing_writes = count;
    }

    /// Makes every point read on `collection` fail until cleared.
    pub fn fail_reads_of(&self, collection: &str) {
        self.faults().failing_reads.insert(collection.to_string());
    }

    pub fn clear_read_failures(&self) {
        self.faults().failing_reads.clear();
    }

    /// Delivers a transient error to every live subscription on `collection`.
    pub fn emit_error(&self, collection: &str, message: &str) {
        let inner = self.inner();
        for watcher in inner.watchers.iter().filter(|w| w.collection() == collection) {
            let error = StoreError::Unavailable {
                message: message.to_string(),
            };
            match watcher {
                Watcher::Document { sender, .. } => {
                    let _ = sender.send(Err(error));
                }
                Watcher::Collection { sender, .. } => {
                    let _ = sender.send(Err(error));
                }
            }
        }
    }

    fn check_write(&self) -> Result<(), StoreError> {
        let mut faults = self.faults();
        if faults.failing_writes > 0 {
            faults.failing_writes -= 1;
            return Err(StoreError::Unavailable {
                message: "injected write failure".into(),
            });
        }
        Ok(())
    }

    fn commit(&self, collection: &str, id: &str, data: Option<Document>) {
        let mut inner = self.inner();
        let docs = inner.collections.entry(collection.to_string()).or_default();
        match data {
            Some(data) => {
                docs.insert(id.to_string(), data);
            }
            None => {
                docs.remove(id);
            }
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        inner.notify(collection, id);
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<DocumentSnapshot>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.faults().failing_reads.contains(collection) {
            return Err(StoreError::Unavailable {
                message: format!("injected read failure on {collection}"),
            });
        }
        Ok(self.inner().document(collection, id))
    }

    async fn subscribe_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Subscription<Option<DocumentSnapshot>>, StoreError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut inner = self.inner();
        let _ = sender.send(Ok(inner.document(collection, id)));
        inner.watchers.push(Watcher::Document {
            collection: collection.to_string(),
            id: id.to_string(),
            sender,
        });
        Ok(Subscription::new(receiver))
    }

    async fn subscribe_collection(
        &self,
        collection: &str,
        query: CollectionQuery,
    ) -> Result<Subscription<Vec<DocumentSnapshot>>, StoreError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut inner = self.inner();
        let _ = sender.send(Ok(inner.listing(collection, &query)));
        inner.watchers.push(Watcher::Collection {
            collection: collection.to_string(),
            query,
            sender,
        });
        Ok(Subscription::new(receiver))
    }

    async fn set_document(&self, collection: &str, id: &str, data: Document) -> Result<(), StoreError> {
        self.check_write()?;
        self.commit(collection, id, Some(data));
        Ok(())
    }

    async fn update_document(&self, collection: &str, id: &str, patch: DocumentPatch) -> Result<(), StoreError> {
        self.check_write()?;
        let mut inner = self.inner();
        let data = inner
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        patch.apply_to(data);
        self.writes.fetch_add(1, Ordering::SeqCst);
        inner.notify(collection, id);
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.check_write()?;
        self.commit(collection, id, None);
        Ok(())
    }

    async fn add_document(&self, collection: &str, data: Document) -> Result<String, StoreError> {
        self.check_write()?;
        let id = generate_document_id();
        self.commit(collection, &id, Some(data));
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn body(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn document_subscription_sees_initial_state_and_changes() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe_document("users", "ada@uni.edu").await.expect("subscribe");
        assert_eq!(sub.next().await.expect("initial").expect("ok"), None);

        store
            .set_document("users", "ada@uni.edu", body(json!({ "joinedEvents": [] })))
            .await
            .expect("set");
        let snapshot = sub.next().await.expect("change").expect("ok").expect("present");
        assert_eq!(snapshot.data["joinedEvents"], json!([]));

        // Unrelated documents do not wake the subscription.
        store.set_document("users", "bob@uni.edu", Document::new()).await.expect("set");
        store
            .update_document("users", "ada@uni.edu", DocumentPatch::new().array_append("joinedEvents", "E1"))
            .await
            .expect("update");
        let snapshot = sub.next().await.expect("change").expect("ok").expect("present");
        assert_eq!(snapshot.data["joinedEvents"], json!(["E1"]));
    }

    #[tokio::test]
    async fn update_of_missing_document_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update_document("users", "ghost@uni.edu", DocumentPatch::new().set("bio", "boo"))
            .await
            .expect_err("missing document");
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn dropped_subscriptions_are_pruned() {
        let store = MemoryStore::new();
        let sub = store
            .subscribe_collection("events", CollectionQuery::new())
            .await
            .expect("subscribe");
        assert_eq!(store.live_subscriptions(), 1);
        sub.cancel();
        assert_eq!(store.live_subscriptions(), 0);
    }

    #[tokio::test]
    async fn injected_faults() {
        let store = MemoryStore::new();
        store.fail_next_writes(1);
        assert!(store.add_document("posts", Document::new()).await.is_err());
        let id = store.add_document("posts", Document::new()).await.expect("second write succeeds");
        assert_eq!(id.len(), 20);

        store.fail_reads_of("posts");
        assert!(store.get_document("posts", &id).await.is_err());
        store.clear_read_failures();
        assert!(store.get_document("posts", &id).await.expect("read").is_some());

        let mut sub = store
            .subscribe_collection("posts", CollectionQuery::new())
            .await
            .expect("subscribe");
        let _initial = sub.next().await;
        store.emit_error("posts", "connection reset");
        assert!(matches!(sub.next().await, Some(Err(StoreError::Unavailable { .. }))));
    }
}
