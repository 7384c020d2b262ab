//! Live in-memory copies of the `events` and `societies` collections.
//!
//! A mirror owns one collection subscription and one task. Each snapshot from the store is
//! rebuilt into a full list (never patched) and published through a `watch` channel. Subscription
//! errors are logged and the last good list stays published.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, warn};

use crate::{
    errors::StoreError,
    model::{Event, EventListing, Identified, Record, Society, decode_record},
    store::{CollectionQuery, DocumentSnapshot, DocumentStore, SortOrder},
};

/// Latest list published by a mirror.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorSnapshot<T> {
    pub items: Vec<T>,
    /// `false` until the first snapshot has been rebuilt.
    pub loaded: bool,
}

impl<T> Default for MirrorSnapshot<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            loaded: false,
        }
    }
}

impl<T: Identified> MirrorSnapshot<T> {
    pub fn find(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }
}

/// How a mirror subscribes to its collection and turns documents into items.
#[async_trait]
pub trait MirrorSource: Send + Sync + 'static {
    type Item: Identified + Clone + PartialEq + Send + Sync + 'static;

    fn collection(&self) -> &'static str;

    fn query(&self) -> CollectionQuery {
        CollectionQuery::new()
    }

    async fn rebuild(&self, store: &dyn DocumentStore, docs: Vec<DocumentSnapshot>) -> Vec<Self::Item>;
}

/// Societies ordered by name; ordering is delegated to the store's query.
pub struct Societies;

#[async_trait]
impl MirrorSource for Societies {
    type Item = Society;

    fn collection(&self) -> &'static str {
        Society::COLLECTION
    }

    fn query(&self) -> CollectionQuery {
        CollectionQuery::new().order_by("name", SortOrder::Asc)
    }

    async fn rebuild(&self, _store: &dyn DocumentStore, docs: Vec<DocumentSnapshot>) -> Vec<Society> {
        decode_all(&docs)
    }
}

/// Events with their owning society resolved, ordered by time.
///
/// Societies are re-read with point reads on every rebuild; nothing is cached across snapshots.
pub struct Events;

#[async_trait]
impl MirrorSource for Events {
    type Item = EventListing;

    fn collection(&self) -> &'static str {
        Event::COLLECTION
    }

    async fn rebuild(&self, store: &dyn DocumentStore, docs: Vec<DocumentSnapshot>) -> Vec<EventListing> {
        let events: Vec<Event> = decode_all(&docs);
        let mut listings = join_all(events.into_iter().map(|event| resolve_society(store, event))).await;
        listings.sort_by(|a, b| a.event.time.cmp(&b.event.time));
        listings
    }
}

fn decode_all<T: Record>(docs: &[DocumentSnapshot]) -> Vec<T> {
    docs.iter()
        .filter_map(|doc| match decode_record::<T>(doc) {
            Ok(record) => Some(record),
            Err(error) => {
                warn!(collection = T::COLLECTION, id = %doc.id, %error, "skipping invalid document");
                None
            }
        })
        .collect()
}

/// Attaches the owning society's name and logo; any failure leaves them unset.
pub async fn resolve_society(store: &dyn DocumentStore, event: Event) -> EventListing {
    if event.society.trim().is_empty() {
        warn!(event_id = %event.id, "event has no owning society");
        return EventListing::unresolved(event);
    }
    let snapshot = match store.get_document(Society::COLLECTION, &event.society).await {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => {
            warn!(event_id = %event.id, society = %event.society, "owning society not found");
            return EventListing::unresolved(event);
        }
        Err(error) => {
            warn!(event_id = %event.id, society = %event.society, %error, "failed to resolve owning society");
            return EventListing::unresolved(event);
        }
    };
    match decode_record::<Society>(&snapshot) {
        Ok(society) => EventListing {
            event,
            society_name: Some(society.name).filter(|name| !name.is_empty()),
            society_logo: society.logo,
        },
        Err(error) => {
            warn!(event_id = %event.id, %error, "owning society is invalid");
            EventListing::unresolved(event)
        }
    }
}

pub struct CollectionMirror<T> {
    collection: &'static str,
    state: watch::Receiver<MirrorSnapshot<T>>,
    task: JoinHandle<()>,
}

impl<T> CollectionMirror<T>
where
    T: Identified + Clone + PartialEq + Send + Sync + 'static,
{
    /// Subscribes to the source's collection and starts rebuilding on every snapshot.
    pub async fn open<S>(store: Arc<dyn DocumentStore>, source: S) -> Result<Self, StoreError>
    where
        S: MirrorSource<Item = T>,
    {
        let collection = source.collection();
        let mut subscription = store.subscribe_collection(collection, source.query()).await?;
        let (sender, state) = watch::channel(MirrorSnapshot::default());

        let task = tokio::spawn(async move {
            while let Some(item) = subscription.next().await {
                let docs = match item {
                    Ok(docs) => docs,
                    Err(error) => {
                        warn!(collection, %error, "collection subscription error; keeping last snapshot");
                        continue;
                    }
                };
                let items = source.rebuild(store.as_ref(), docs).await;
                debug!(collection, count = items.len(), "mirror rebuilt");
                sender.send_if_modified(|current| {
                    let next = MirrorSnapshot { items, loaded: true };
                    if *current == next {
                        return false;
                    }
                    *current = next;
                    true
                });
            }
            debug!(collection, "collection subscription ended");
        });

        Ok(Self {
            collection,
            state,
            task,
        })
    }

    pub fn collection(&self) -> &'static str {
        self.collection
    }

    pub fn watch(&self) -> watch::Receiver<MirrorSnapshot<T>> {
        self.state.clone()
    }

    pub fn current(&self) -> MirrorSnapshot<T> {
        self.state.borrow().clone()
    }

    /// Waits until the first snapshot has been published.
    pub async fn loaded(&self) -> Result<MirrorSnapshot<T>, StoreError> {
        let mut state = self.state.clone();
        let snapshot = state
            .wait_for(|snapshot| snapshot.loaded)
            .await
            .map_err(|_| StoreError::SubscriptionClosed {
                target: self.collection.to_string(),
            })?;
        Ok(MirrorSnapshot::clone(&snapshot))
    }

    pub fn close(self) {}
}

impl<T> Drop for CollectionMirror<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub async fn mirror_societies(store: Arc<dyn DocumentStore>) -> Result<CollectionMirror<Society>, StoreError> {
    CollectionMirror::open(store, Societies).await
}

pub async fn mirror_events(store: Arc<dyn DocumentStore>) -> Result<CollectionMirror<EventListing>, StoreError> {
    CollectionMirror::open(store, Events).await
}
