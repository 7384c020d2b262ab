//! Authentication collaborator.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tracing::info;

use crate::{errors::AuthError, validators::is_valid_email};

pub const MIN_PASSWORD_LEN: usize = 6;

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Follows the signed-in identity; `None` while signed out.
    fn identity_changes(&self) -> watch::Receiver<Option<String>>;

    fn current_identity(&self) -> Option<String> {
        self.identity_changes().borrow().clone()
    }

    /// Creates an account and signs it in. Returns the identity.
    async fn sign_up(&self, email: &str, password: &str) -> Result<String, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<String, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;
}

struct Account {
    salt: [u8; 16],
    digest: [u8; 32],
}

fn password_digest(salt: &[u8; 16], password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// In-process accounts with salted SHA-256 password digests.
pub struct MemoryAuth {
    accounts: Mutex<HashMap<String, Account>>,
    identity: watch::Sender<Option<String>>,
}

impl Default for MemoryAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            identity: watch::Sender::new(None),
        }
    }

    fn accounts(&self) -> MutexGuard<'_, HashMap<String, Account>> {
        self.accounts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_identity(&self, identity: Option<String>) {
        self.identity.send_if_modified(|current| {
            if *current == identity {
                return false;
            }
            *current = identity;
            true
        });
    }
}

#[async_trait]
impl AuthProvider for MemoryAuth {
    fn identity_changes(&self) -> watch::Receiver<Option<String>> {
        self.identity.subscribe()
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<String, AuthError> {
        let identity = normalize_email(email);
        if !is_valid_email(&identity) {
            return Err(AuthError::InvalidEmail {
                email: email.to_string(),
            });
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword { min: MIN_PASSWORD_LEN });
        }
        {
            let mut accounts = self.accounts();
            if accounts.contains_key(&identity) {
                return Err(AuthError::EmailInUse { email: identity });
            }
            let salt: [u8; 16] = rand::random();
            let digest = password_digest(&salt, password);
            accounts.insert(identity.clone(), Account { salt, digest });
        }
        info!(identity = %identity, "account created");
        self.set_identity(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<String, AuthError> {
        let identity = normalize_email(email);
        let matches = self
            .accounts()
            .get(&identity)
            .is_some_and(|account| password_digest(&account.salt, password) == account.digest);
        if !matches {
            return Err(AuthError::InvalidCredentials);
        }
        self.set_identity(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.set_identity(None);
        Ok(())
    }
}
