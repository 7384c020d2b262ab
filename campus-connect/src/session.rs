//! Ties the membership store's lifecycle to the authentication state.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{
    auth::AuthProvider,
    errors::AuthError,
    membership::MembershipStore,
    model::{Record, User, encode_record},
    store::DocumentStore,
};

pub struct Session {
    auth: Arc<dyn AuthProvider>,
    store: Arc<dyn DocumentStore>,
    membership: Arc<MembershipStore>,
    follower: JoinHandle<()>,
}

impl Session {
    /// Starts following identity changes: a new identity subscribes the membership store, signing
    /// out unsubscribes it. The current identity, if any, is applied right away.
    pub fn start(
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn DocumentStore>,
        membership: Arc<MembershipStore>,
    ) -> Self {
        let mut changes = auth.identity_changes();
        let follower_membership = Arc::clone(&membership);
        let follower = tokio::spawn(async move {
            let mut applied: Option<Option<String>> = None;
            loop {
                let identity = changes.borrow_and_update().clone();
                if applied.as_ref() != Some(&identity) {
                    match &identity {
                        Some(identity) => {
                            debug!(identity = %identity, "signed in; subscribing to user document");
                            if let Err(error) = follower_membership.subscribe(identity).await {
                                warn!(identity = %identity, %error, "failed to subscribe to user document");
                            }
                        }
                        None => {
                            debug!("signed out; dropping user subscription");
                            follower_membership.unsubscribe();
                        }
                    }
                    applied = Some(identity);
                }
                if changes.changed().await.is_err() {
                    break;
                }
            }
        });
        Self {
            auth,
            store,
            membership,
            follower,
        }
    }

    pub fn membership(&self) -> &Arc<MembershipStore> {
        &self.membership
    }

    /// Creates the account, then the user document with empty membership sets.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<String, AuthError> {
        let identity = self.auth.sign_up(email, password).await?;
        let body = encode_record(&User::new(identity.clone()))?;
        self.store.set_document(User::COLLECTION, &identity, body).await?;
        Ok(identity)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<String, AuthError> {
        self.auth.sign_in(email, password).await
    }

    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.auth.sign_out().await
    }

    /// Stops following identity changes and drops the user subscription.
    pub fn shutdown(self) {
        self.follower.abort();
        self.membership.unsubscribe();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.follower.abort();
    }
}
