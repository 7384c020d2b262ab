//! Campus Connect client core.
//!
//! Keeps the signed-in user's memberships (`joinedEvents`, `joinedSocieties`) in sync with live
//! mirrors of the `events` and `societies` collections, and derives the "my events" and
//! "my societies" views from both. The remote document database, blob storage, authentication
//! and reminder delivery are reached only through the traits in [`store`], [`blobs`], [`auth`]
//! and [`reminders`].

pub mod admin;
pub mod auth;
pub mod blobs;
pub mod client;
pub mod config;
pub mod errors;
pub mod id;
pub mod keys;
pub mod membership;
pub mod mirror;
pub mod model;
pub mod qr;
pub mod reconciler;
pub mod reminders;
pub mod session;
pub mod store;
pub mod suggest;
pub mod validators;

pub use admin::{SocietyAdmin, SocietyProfile};
pub use auth::{AuthProvider, MemoryAuth};
pub use blobs::{BlobStorage, MemoryBlobStorage};
pub use client::CampusClient;
pub use config::ClientConfig;
pub use errors::{
    AdminError, AuthError, ConfigError, MembershipError, QrError, ReminderError, StorageError, StoreError,
    ValidationError, ValidationIssue,
};
pub use membership::{MembershipPhase, MembershipState, MembershipStore, RollbackPolicy};
pub use mirror::{CollectionMirror, MirrorSnapshot, mirror_events, mirror_societies};
pub use model::{Category, Event, EventListing, Merchandise, Post, Relation, Society, User};
pub use qr::QrTarget;
pub use reconciler::{MembershipChange, MembershipReconciler, derive_mine};
pub use reminders::{EventReminder, LogReminders, MemoryReminders, ReminderScheduler};
pub use session::Session;
pub use store::{CollectionQuery, DocumentPatch, DocumentSnapshot, DocumentStore, MemoryStore, RedisStore};
pub use suggest::{Suggestion, suggest};
