//! Society administration against the in-memory store and blob storage.

use std::sync::Arc;

use campus_connect::{
    AdminError, BlobStorage, DocumentPatch, DocumentStore, Event, MemoryBlobStorage, MemoryStore, Merchandise, Post, Society,
    SocietyAdmin, SocietyProfile, StoreError, model::decode_record, store::Document,
};
use chrono::{TimeZone, Utc};
use serde_json::{Value, json};

// ============================================================================
// Test Utilities
// ============================================================================

fn body(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

struct Fixture {
    store: Arc<MemoryStore>,
    blobs: Arc<MemoryBlobStorage>,
}

impl Fixture {
    async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        store
            .set_document(
                "societies",
                "chess",
                body(json!({ "name": "Chess Club", "category": "academic", "passkey": "checkmate", "events": [] })),
            )
            .await
            .expect("seed chess");
        store
            .set_document("societies", "hiking", body(json!({ "name": "Hiking Society", "passkey": "summit" })))
            .await
            .expect("seed hiking");
        Self {
            store,
            blobs: Arc::new(MemoryBlobStorage::new("campus")),
        }
    }

    async fn login(&self, society: &str, passkey: &str) -> Result<SocietyAdmin, AdminError> {
        let store: Arc<dyn DocumentStore> = self.store.clone();
        let blobs: Arc<dyn BlobStorage> = self.blobs.clone();
        SocietyAdmin::login(store, blobs, society, passkey).await
    }

    async fn society(&self, id: &str) -> Society {
        let snapshot = self
            .store
            .get_document("societies", id)
            .await
            .expect("read society")
            .expect("society exists");
        decode_record(&snapshot).expect("valid society")
    }
}

fn event(society: &str) -> Event {
    Event {
        id: String::new(),
        name: "Blitz Night".into(),
        description: "Five-minute games".into(),
        fee: 0.0,
        time: Utc.with_ymd_and_hms(2026, 11, 2, 10, 0, 0).unwrap(),
        location: "Library 201".into(),
        background_image: None,
        society: society.into(),
    }
}

// ============================================================================
// Login
// ============================================================================

#[tokio::test]
async fn login_checks_society_and_passkey() {
    let fixture = Fixture::new().await;

    assert!(matches!(
        fixture.login("go", "anything").await,
        Err(AdminError::SocietyNotFound { .. })
    ));
    assert!(matches!(
        fixture.login("chess", "stalemate").await,
        Err(AdminError::IncorrectPasskey)
    ));

    let admin = fixture.login("chess", "checkmate").await.expect("login");
    assert_eq!(admin.society().name, "Chess Club");
}

#[tokio::test]
async fn profile_and_logo_updates_reach_the_store() {
    let fixture = Fixture::new().await;
    let mut admin = fixture.login("chess", "checkmate").await.expect("login");

    admin
        .update_profile(SocietyProfile {
            name: "HKU Chess".into(),
            description: "Rapid and classical".into(),
            category: "games".into(),
        })
        .await
        .expect("update profile");
    let url = admin.replace_logo(vec![0xFF, 0xD8]).await.expect("logo");
    assert_eq!(url, "memory://campus/societies/logos/chess");

    let stored = fixture.society("chess").await;
    assert_eq!(stored.name, "HKU Chess");
    assert_eq!(stored.category, "games");
    assert_eq!(stored.logo.as_deref(), Some(url.as_str()));
    assert_eq!(stored.passkey.as_deref(), Some("checkmate"));
    assert_eq!(admin.refresh().await.expect("refresh"), &stored);
}

// ============================================================================
// Owned Records
// ============================================================================

#[tokio::test]
async fn create_lists_the_record_on_the_society() {
    let fixture = Fixture::new().await;
    let mut admin = fixture.login("chess", "checkmate").await.expect("login");

    let created = admin.create(event("chess")).await.expect("create");
    assert!(!created.id.is_empty());
    assert_eq!(admin.society().events, [created.id.clone()]);
    assert_eq!(fixture.society("chess").await.events, [created.id.clone()]);

    let listed: Vec<Event> = admin.list().await.expect("list");
    assert_eq!(listed, [created]);
}

#[tokio::test]
async fn records_of_other_societies_are_rejected() {
    let fixture = Fixture::new().await;
    let mut chess = fixture.login("chess", "checkmate").await.expect("login chess");
    let mut hiking = fixture.login("hiking", "summit").await.expect("login hiking");

    assert!(matches!(
        chess.create(event("hiking")).await,
        Err(AdminError::NotOwned { .. })
    ));
    assert!(matches!(chess.create(event("")).await, Err(AdminError::NotOwned { .. })));

    let hike = hiking.create(event("hiking")).await.expect("create hike");
    assert!(matches!(
        chess.fetch::<Event>(&hike.id).await,
        Err(AdminError::NotOwned { .. })
    ));
    assert!(matches!(
        chess.delete::<Event>(&hike.id).await,
        Err(AdminError::NotOwned { .. })
    ));
    assert!(
        fixture
            .store
            .get_document("events", &hike.id)
            .await
            .expect("read")
            .is_some()
    );
}

#[tokio::test]
async fn update_replaces_fields_and_clears_removed_image() {
    let fixture = Fixture::new().await;
    let mut admin = fixture.login("chess", "checkmate").await.expect("login");
    let mut created = admin.create(event("chess")).await.expect("create");
    let url = admin
        .replace_image::<Event>(&created.id, vec![1, 2, 3])
        .await
        .expect("image");
    assert_eq!(url, format!("memory://campus/events/backgroundImages/{}", created.id));

    created.name = "Blitz Finals".into();
    created.fee = 20.0;
    created.background_image = None;
    admin.update(&created).await.expect("update");

    let stored: Event = admin.fetch(&created.id).await.expect("fetch");
    assert_eq!(stored.name, "Blitz Finals");
    assert_eq!(stored.fee, 20.0);
    assert_eq!(stored.background_image, None);
}

#[tokio::test]
async fn update_deletes_every_cleared_field() {
    let fixture = Fixture::new().await;
    let mut admin = fixture.login("chess", "checkmate").await.expect("login");
    let mut post = admin
        .create(Post {
            id: String::new(),
            caption: "Simul on Friday".into(),
            image: None,
            date: Some(Utc.with_ymd_and_hms(2026, 10, 12, 4, 0, 0).unwrap()),
            society: "chess".into(),
        })
        .await
        .expect("create post");
    fixture
        .store
        .update_document("posts", &post.id, DocumentPatch::new().set("pinned", true))
        .await
        .expect("out of band field");

    post.date = None;
    post.caption = "Simul moved".into();
    admin.update(&post).await.expect("update");

    let stored = fixture
        .store
        .get_document("posts", &post.id)
        .await
        .expect("read")
        .expect("post exists");
    assert_eq!(stored.data["caption"], json!("Simul moved"));
    assert!(!stored.data.contains_key("date"));
    assert!(!stored.data.contains_key("pinned"));
    assert_eq!(admin.fetch::<Post>(&post.id).await.expect("fetch"), post);
}

#[tokio::test]
async fn update_of_missing_record_is_not_found() {
    let fixture = Fixture::new().await;
    let admin = fixture.login("chess", "checkmate").await.expect("login");
    let mut ghost = event("chess");
    ghost.id = "ghost".into();

    assert!(matches!(
        admin.update(&ghost).await,
        Err(AdminError::Store(StoreError::NotFound { .. }))
    ));
}

#[tokio::test]
async fn delete_removes_blob_document_and_listing() {
    let fixture = Fixture::new().await;
    let mut admin = fixture.login("chess", "checkmate").await.expect("login");

    let hoodie = admin
        .create(Merchandise {
            id: String::new(),
            name: "Hoodie".into(),
            description: "Navy".into(),
            price: 180.0,
            availability: true,
            image: None,
            society: "chess".into(),
        })
        .await
        .expect("create merch");
    admin
        .replace_image::<Merchandise>(&hoodie.id, vec![9])
        .await
        .expect("image");
    assert_eq!(fixture.blobs.paths(), [format!("merch/images/{}", hoodie.id)]);

    admin.delete::<Merchandise>(&hoodie.id).await.expect("delete");
    assert!(fixture.blobs.paths().is_empty());
    assert!(
        fixture
            .store
            .get_document("merch", &hoodie.id)
            .await
            .expect("read")
            .is_none()
    );
    assert!(admin.society().merch.is_empty());
    assert!(fixture.society("chess").await.merch.is_empty());
}

#[tokio::test]
async fn delete_tolerates_an_already_missing_image() {
    let fixture = Fixture::new().await;
    let mut admin = fixture.login("chess", "checkmate").await.expect("login");
    let post = admin
        .create(Post {
            id: String::new(),
            caption: "Tournament sign-ups open".into(),
            image: None,
            date: Some(Utc.with_ymd_and_hms(2026, 10, 10, 4, 0, 0).unwrap()),
            society: "chess".into(),
        })
        .await
        .expect("create post");
    let url = admin.replace_image::<Post>(&post.id, vec![1]).await.expect("image");
    fixture.blobs.delete(&url).await.expect("remove blob out of band");

    admin.delete::<Post>(&post.id).await.expect("delete");
    let posts: Vec<Post> = admin.list().await.expect("list");
    assert!(posts.is_empty());
}

#[tokio::test]
async fn list_skips_dangling_and_invalid_records() {
    let fixture = Fixture::new().await;
    let mut admin = fixture.login("chess", "checkmate").await.expect("login");
    let kept = admin.create(event("chess")).await.expect("create");
    let dropped = admin.create(event("chess")).await.expect("create");
    let corrupted = admin.create(event("chess")).await.expect("create");
    let later = admin.create(event("chess")).await.expect("create");
    fixture
        .store
        .delete_document("events", &dropped.id)
        .await
        .expect("delete out of band");
    fixture
        .store
        .set_document("events", &corrupted.id, body(json!({ "name": "No time", "society": "chess" })))
        .await
        .expect("corrupt out of band");

    let listed: Vec<Event> = admin.list().await.expect("list");
    assert_eq!(listed, [kept, later]);
}
