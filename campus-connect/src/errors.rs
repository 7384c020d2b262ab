use std::borrow::Cow;

use thiserror::Error;

/// Error returned by document store operations and subscriptions.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A stored document failed the schema boundary.
    #[error("failed to decode {collection}/{id}: {message}")]
    Decode {
        collection: String,
        id: String,
        message: String,
    },

    /// Validation failed for one or more fields of an outgoing record.
    #[error("validation failed")]
    Validation(#[from] ValidationError),

    /// Underlying Redis command failed.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Target document was not found when performing a mutation.
    #[error("document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    /// Invalid input supplied to a store operation.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// A live subscription ended because the backend connection went away.
    #[error("subscription to {target} closed")]
    SubscriptionClosed { target: String },

    /// Transient backend failure.
    #[error("backend unavailable: {message}")]
    Unavailable { message: String },

    #[error("{message}")]
    Other { message: Cow<'static, str> },
}

impl StoreError {
    pub fn not_found(collection: &str, id: &str) -> Self {
        Self::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    pub fn decode(collection: &str, id: &str, message: impl Into<String>) -> Self {
        Self::Decode {
            collection: collection.to_string(),
            id: id.to_string(),
            message: message.into(),
        }
    }
}

/// Collection of validation issues encountered at the schema boundary.
#[derive(Debug, Error)]
#[error("validation errors: {issues:?}")]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn new<I>(issues: I) -> Self
    where
        I: IntoIterator<Item = ValidationIssue>,
    {
        Self {
            issues: issues.into_iter().collect(),
        }
    }

    /// Convenience helper for constructing a single-field validation error.
    pub fn single(field: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new([ValidationIssue::new(field, code, message)])
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Returns `Ok(())` when no issues were collected.
    pub fn into_result(issues: Vec<ValidationIssue>) -> ValidationResult<()> {
        if issues.is_empty() { Ok(()) } else { Err(Self::new(issues)) }
    }
}

/// Detailed validation failure for a single field.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    pub field: String,
    pub code: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Errors raised by the membership store and reconciler.
#[derive(Debug, Error)]
pub enum MembershipError {
    /// No identity is subscribed.
    #[error("no signed-in user")]
    Unauthenticated,

    /// The user record has not arrived yet (or does not exist), so membership is unknown.
    #[error("membership for {identity} is not loaded yet")]
    NotLoaded { identity: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised by the blob storage collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("blob not found: {path}")]
    NotFound { path: String },

    #[error("invalid blob path: {path}")]
    InvalidPath { path: String },

    #[error("storage unavailable: {message}")]
    Unavailable { message: String },
}

/// Errors raised by the authentication collaborator.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid email address: {email}")]
    InvalidEmail { email: String },

    #[error("password must be at least {min} characters")]
    WeakPassword { min: usize },

    #[error("an account already exists for {email}")]
    EmailInUse { email: String },

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised while scheduling or cancelling event reminders.
#[derive(Debug, Error)]
pub enum ReminderError {
    #[error("reminder scheduler unavailable: {message}")]
    Unavailable { message: String },
}

/// Errors raised by society administration.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("society not found: {society_id}")]
    SocietyNotFound { society_id: String },

    #[error("incorrect passkey")]
    IncorrectPasskey,

    #[error("{collection}/{id} is not owned by society {society_id}")]
    NotOwned {
        collection: &'static str,
        id: String,
        society_id: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<ValidationError> for AdminError {
    fn from(err: ValidationError) -> Self {
        Self::Store(StoreError::Validation(err))
    }
}

/// Errors raised when decoding a QR payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QrError {
    #[error("malformed QR payload: {payload:?}")]
    Malformed { payload: String },

    #[error("unknown QR target kind: {kind:?}")]
    UnknownKind { kind: String },
}

/// Errors raised while loading client configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}
