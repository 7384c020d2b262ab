use std::{borrow::Cow, time::Duration};

use async_trait::async_trait;
use futures::StreamExt;
use redis::{
    AsyncCommands,
    aio::{ConnectionManager, PubSub},
    cmd,
};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    errors::StoreError,
    id::generate_document_id,
    keys::KeyContext,
    store::{
        CollectionQuery, Document, DocumentPatch, DocumentSnapshot, DocumentStore, Subscription,
        scripts::{DOCUMENT_PATCH_SCRIPT, DOCUMENT_SET_SCRIPT},
    },
};

/// Document store backed by Redis.
///
/// Each document is a JSON string under `{prefix}:{collection}:{id}`; a per-collection set
/// indexes the ids. Writes go through Lua scripts so the body, the index and the change
/// announcement on `{prefix}:changes:{collection}` are applied atomically. Subscriptions
/// listen on that channel and re-read the affected document or collection; a dropped pub/sub
/// connection is re-established with [`ReconnectPolicy`] backoff.
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    conn: ConnectionManager,
    prefix: String,
    reconnect: ReconnectPolicy,
}

impl RedisStore {
    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self {
            client,
            conn,
            prefix: prefix.into(),
            reconnect: ReconnectPolicy::default(),
        })
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn keys(&self) -> KeyContext<'_> {
        KeyContext::new(&self.prefix)
    }

    /// Deletes every key under this store's prefix.
    ///
    /// This performs a SCAN + DEL loop so Redis is never blocked by a large KEYS call.
    pub async fn clear(&self) -> Result<u64, StoreError> {
        const SCAN_COUNT: usize = 1000;
        let mut conn = self.conn.clone();
        let pattern = format!("{}:*", self.prefix);
        let mut cursor: u64 = 0;
        let mut total_deleted: u64 = 0;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let deleted: u64 = cmd("DEL").arg(&keys).query_async(&mut conn).await?;
                total_deleted += deleted;
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(total_deleted)
    }

    /// Subscribes to the collection's change channel, sends the initial read, and spawns the
    /// forwarder.
    async fn follow<R: FeedReader>(&self, collection: &str, reader: R) -> Result<Subscription<R::Output>, StoreError> {
        let channel = self.keys().changes(collection);
        let pubsub = listen(&self.client, &channel).await?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let mut feed = ChangeFeed {
            client: self.client.clone(),
            conn: self.conn.clone(),
            prefix: self.prefix.clone(),
            collection: collection.to_string(),
            channel,
            reconnect: self.reconnect,
            reader,
            sender,
        };
        feed.publish_read().await;
        let forwarder = tokio::spawn(feed.run(pubsub));

        Ok(Subscription::new(receiver).with_forwarder(forwarder))
    }

    async fn write_body(&self, collection: &str, id: &str, body: &str) -> Result<(), StoreError> {
        let keys = self.keys();
        let mut conn = self.conn.clone();
        let mut invocation = DOCUMENT_SET_SCRIPT.prepare_invoke();
        invocation
            .key(keys.document(collection, id))
            .key(keys.index(collection))
            .key(keys.changes(collection))
            .arg(id)
            .arg(body);
        let raw: String = invocation.invoke_async(&mut conn).await?;
        check_script_response(collection, id, &raw)
    }
}

fn check_script_response(collection: &str, id: &str, raw: &str) -> Result<(), StoreError> {
    let value: Value = serde_json::from_str(raw).map_err(|err| StoreError::Other {
        message: Cow::Owned(format!("failed to parse lua response: {err}")),
    })?;

    match value.get("error").and_then(Value::as_str) {
        None => Ok(()),
        Some("document_not_found") => Err(StoreError::not_found(collection, id)),
        Some("unknown_operation") => Err(StoreError::InvalidRequest {
            message: format!(
                "unknown patch operation {}",
                value.get("operation").and_then(Value::as_str).unwrap_or("?")
            ),
        }),
        Some(other) => Err(StoreError::Other {
            message: Cow::Owned(other.to_string()),
        }),
    }
}

fn parse_body(collection: &str, id: &str, json: &str) -> Result<Document, StoreError> {
    serde_json::from_str::<Document>(json).map_err(|err| StoreError::decode(collection, id, err.to_string()))
}

fn encode_body(data: &Document) -> Result<String, StoreError> {
    serde_json::to_string(data).map_err(|err| StoreError::Other {
        message: Cow::Owned(format!("failed to serialize document: {err}")),
    })
}

async fn read_document(
    conn: &mut ConnectionManager,
    prefix: &str,
    collection: &str,
    id: &str,
) -> Result<Option<DocumentSnapshot>, StoreError> {
    let key = KeyContext::new(prefix).document(collection, id);
    let raw: Option<String> = conn.get(&key).await?;
    raw.map(|json| parse_body(collection, id, &json).map(|data| DocumentSnapshot::new(id, data)))
        .transpose()
}

async fn read_collection(
    conn: &mut ConnectionManager,
    prefix: &str,
    collection: &str,
    query: &CollectionQuery,
) -> Result<Vec<DocumentSnapshot>, StoreError> {
    let keys = KeyContext::new(prefix);
    let mut ids: Vec<String> = conn.smembers(keys.index(collection)).await?;
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    ids.sort();

    let document_keys: Vec<String> = ids.iter().map(|id| keys.document(collection, id)).collect();
    let bodies: Vec<Option<String>> = cmd("MGET").arg(&document_keys).query_async(conn).await?;

    let mut docs = Vec::with_capacity(ids.len());
    for (id, body) in ids.into_iter().zip(bodies) {
        let Some(body) = body else {
            continue;
        };
        match parse_body(collection, &id, &body) {
            Ok(data) => docs.push(DocumentSnapshot::new(id, data)),
            Err(error) => warn!(collection, id = %id, %error, "skipping unreadable document"),
        }
    }
    Ok(query.apply(docs))
}

/// Delay before each reconnection attempt of a change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            max: Duration::from_secs(5),
        }
    }
}

impl ReconnectPolicy {
    /// Doubles from `base` per attempt (starting at zero), capped at `max`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(1u32 << attempt.min(16)).min(self.max)
    }
}

/// What a change feed re-reads when its collection announces a change.
#[async_trait]
trait FeedReader: Send + Sync + 'static {
    type Output: Send + 'static;

    fn target(&self, collection: &str) -> String;

    /// Whether a change to document `changed` affects this feed.
    fn affected_by(&self, changed: &str) -> bool;

    async fn read(
        &self,
        conn: &mut ConnectionManager,
        prefix: &str,
        collection: &str,
    ) -> Result<Self::Output, StoreError>;
}

struct DocumentFeed {
    id: String,
}

#[async_trait]
impl FeedReader for DocumentFeed {
    type Output = Option<DocumentSnapshot>;

    fn target(&self, collection: &str) -> String {
        format!("{collection}/{}", self.id)
    }

    fn affected_by(&self, changed: &str) -> bool {
        changed == self.id
    }

    async fn read(
        &self,
        conn: &mut ConnectionManager,
        prefix: &str,
        collection: &str,
    ) -> Result<Option<DocumentSnapshot>, StoreError> {
        read_document(conn, prefix, collection, &self.id).await
    }
}

struct CollectionFeed {
    query: CollectionQuery,
}

#[async_trait]
impl FeedReader for CollectionFeed {
    type Output = Vec<DocumentSnapshot>;

    fn target(&self, collection: &str) -> String {
        collection.to_string()
    }

    fn affected_by(&self, _changed: &str) -> bool {
        true
    }

    async fn read(
        &self,
        conn: &mut ConnectionManager,
        prefix: &str,
        collection: &str,
    ) -> Result<Vec<DocumentSnapshot>, StoreError> {
        read_collection(conn, prefix, collection, &self.query).await
    }
}

async fn listen(client: &redis::Client, channel: &str) -> Result<PubSub, StoreError> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(channel).await?;
    Ok(pubsub)
}

/// Everything a spawned change feed owns.
struct ChangeFeed<R: FeedReader> {
    client: redis::Client,
    conn: ConnectionManager,
    prefix: String,
    collection: String,
    channel: String,
    reconnect: ReconnectPolicy,
    reader: R,
    sender: mpsc::UnboundedSender<Result<R::Output, StoreError>>,
}

impl<R: FeedReader> ChangeFeed<R> {
    async fn publish_read(&mut self) -> bool {
        let value = self.reader.read(&mut self.conn, &self.prefix, &self.collection).await;
        self.sender.send(value).is_ok()
    }

    /// Forwards changes until the receiver goes away, resubscribing whenever the pub/sub
    /// connection drops. A fresh read follows every reconnect so changes missed while
    /// disconnected are delivered.
    async fn run(mut self, mut pubsub: PubSub) {
        let target = self.reader.target(&self.collection);
        loop {
            let mut messages = pubsub.into_on_message();
            while let Some(message) = messages.next().await {
                let changed: String = match message.get_payload() {
                    Ok(changed) => changed,
                    Err(error) => {
                        warn!(target = %target, %error, "ignoring malformed change notification");
                        continue;
                    }
                };
                if self.reader.affected_by(&changed) && !self.publish_read().await {
                    return;
                }
            }
            drop(messages);

            warn!(target = %target, "change feed disconnected");
            let disconnected = StoreError::Unavailable {
                message: format!("change feed for {target} disconnected; reconnecting"),
            };
            if self.sender.send(Err(disconnected)).is_err() {
                return;
            }
            let mut attempt = 0;
            pubsub = loop {
                tokio::time::sleep(self.reconnect.delay_for_attempt(attempt)).await;
                if self.sender.is_closed() {
                    return;
                }
                match listen(&self.client, &self.channel).await {
                    Ok(pubsub) => break pubsub,
                    Err(error) => {
                        debug!(target = %target, attempt, %error, "change feed reconnect failed");
                        attempt = attempt.saturating_add(1);
                    }
                }
            };
            info!(target = %target, "change feed reconnected");
            if !self.publish_read().await {
                return;
            }
        }
    }
}

#[async_trait]
impl DocumentStore for RedisStore {
    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<DocumentSnapshot>, StoreError> {
        let mut conn = self.conn.clone();
        read_document(&mut conn, &self.prefix, collection, id).await
    }

    async fn subscribe_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Subscription<Option<DocumentSnapshot>>, StoreError> {
        self.follow(collection, DocumentFeed { id: id.to_string() }).await
    }

    async fn subscribe_collection(
        &self,
        collection: &str,
        query: CollectionQuery,
    ) -> Result<Subscription<Vec<DocumentSnapshot>>, StoreError> {
        self.follow(collection, CollectionFeed { query }).await
    }

    async fn set_document(&self, collection: &str, id: &str, data: Document) -> Result<(), StoreError> {
        let body = encode_body(&data)?;
        self.write_body(collection, id, &body).await
    }

    async fn update_document(&self, collection: &str, id: &str, patch: DocumentPatch) -> Result<(), StoreError> {
        let operations = serde_json::to_string(&patch).map_err(|err| StoreError::Other {
            message: Cow::Owned(format!("failed to serialize patch: {err}")),
        })?;
        let keys = self.keys();
        let mut conn = self.conn.clone();
        let mut invocation = DOCUMENT_PATCH_SCRIPT.prepare_invoke();
        invocation
            .key(keys.document(collection, id))
            .key(keys.changes(collection))
            .arg(id)
            .arg(operations);
        let raw: String = invocation.invoke_async(&mut conn).await?;
        check_script_response(collection, id, &raw)
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.write_body(collection, id, "").await
    }

    async fn add_document(&self, collection: &str, data: Document) -> Result<String, StoreError> {
        let id = generate_document_id();
        self.set_document(collection, &id, data).await?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_errors_map_to_store_errors() {
        assert!(check_script_response("users", "a", r#"{"ok":true}"#).is_ok());
        assert!(matches!(
            check_script_response("users", "a", r#"{"error":"document_not_found","id":"a"}"#),
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            check_script_response("users", "a", r#"{"error":"unknown_operation","operation":"pop"}"#),
            Err(StoreError::InvalidRequest { .. })
        ));
        assert!(matches!(
            check_script_response("users", "a", "not json"),
            Err(StoreError::Other { .. })
        ));
    }

    #[test]
    fn reconnect_delay_doubles_up_to_the_cap() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn document_feeds_only_follow_their_own_id() {
        let feed = DocumentFeed { id: "ada@connect.hku.hk".into() };
        assert!(feed.affected_by("ada@connect.hku.hk"));
        assert!(!feed.affected_by("grace@connect.hku.hk"));
        assert_eq!(feed.target("users"), "users/ada@connect.hku.hk");
        assert!(CollectionFeed { query: CollectionQuery::new() }.affected_by("anything"));
    }

    #[test]
    fn unreadable_bodies_are_decode_errors() {
        let err = parse_body("events", "E1", "[1,2]").expect_err("array is not a document");
        assert!(matches!(err, StoreError::Decode { .. }));
    }
}
