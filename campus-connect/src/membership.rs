//! The signed-in user's record, kept live by a standing document subscription.
//!
//! [`MembershipStore`] owns the only writer of [`MembershipState`]. Readers get a
//! `watch::Receiver` and see every committed state in order. Each `subscribe` starts a new
//! generation; state writes carry their generation and are dropped once it is stale, so nothing
//! lands after `unsubscribe` even if a remote change is already in flight.

use std::{
    collections::BTreeSet,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use serde::Deserialize;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, warn};

use crate::{
    errors::MembershipError,
    model::{Record, Relation, User, decode_record},
    store::{DocumentPatch, DocumentStore},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MembershipPhase {
    #[default]
    Unauthenticated,
    /// An identity is known but its first snapshot has not arrived.
    Subscribing,
    /// At least one snapshot of the user document has been applied.
    Synced,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MembershipState {
    pub identity: Option<String>,
    pub phase: MembershipPhase,
    /// `None` until the first snapshot, or when the user document does not exist.
    pub user: Option<User>,
}

impl MembershipState {
    /// The relation set of the loaded user, if any.
    pub fn relation_set(&self, relation: Relation) -> Option<&BTreeSet<String>> {
        self.user.as_ref().map(|user| user.relation(relation))
    }

    /// Whether `target_id` is in the relation set.
    ///
    /// Fails instead of answering `false` when the user record is not loaded, so callers never
    /// mistake "unknown" for "not joined".
    pub fn is_member(&self, relation: Relation, target_id: &str) -> Result<bool, MembershipError> {
        let identity = self.identity.as_ref().ok_or(MembershipError::Unauthenticated)?;
        self.relation_set(relation)
            .map(|set| set.contains(target_id))
            .ok_or_else(|| MembershipError::NotLoaded {
                identity: identity.clone(),
            })
    }
}

/// What to do with an optimistic local change when the remote write fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackPolicy {
    /// Leave the optimistic change in place; the next snapshot corrects it.
    #[default]
    Keep,
    /// Undo the optimistic change.
    Revert,
}

impl RollbackPolicy {
    pub fn from_flag(rollback_on_failure: bool) -> Self {
        if rollback_on_failure { Self::Revert } else { Self::Keep }
    }
}

struct LocalChange {
    identity: String,
    generation: u64,
    changed: bool,
}

pub struct MembershipStore {
    store: Arc<dyn DocumentStore>,
    state: Arc<watch::Sender<MembershipState>>,
    generation: Arc<AtomicU64>,
    listener: Mutex<Option<JoinHandle<()>>>,
    rollback: RollbackPolicy,
}

impl MembershipStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            state: Arc::new(watch::Sender::new(MembershipState::default())),
            generation: Arc::new(AtomicU64::new(0)),
            listener: Mutex::new(None),
            rollback: RollbackPolicy::default(),
        }
    }

    pub fn with_rollback(mut self, rollback: RollbackPolicy) -> Self {
        self.rollback = rollback;
        self
    }

    pub fn rollback(&self) -> RollbackPolicy {
        self.rollback
    }

    pub fn watch(&self) -> watch::Receiver<MembershipState> {
        self.state.subscribe()
    }

    pub fn current(&self) -> MembershipState {
        self.state.borrow().clone()
    }

    fn listener(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens a standing subscription to the user document keyed by `identity`.
    ///
    /// Any previous subscription is torn down first. Every snapshot replaces the whole local
    /// record; a snapshot equal to the current record does not notify readers.
    pub async fn subscribe(&self, identity: &str) -> Result<(), MembershipError> {
        self.unsubscribe();

        let mut generation = 0;
        self.state.send_modify(|current| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *current = MembershipState {
                identity: Some(identity.to_string()),
                phase: MembershipPhase::Subscribing,
                user: None,
            };
        });

        let mut subscription = match self.store.subscribe_document(User::COLLECTION, identity).await {
            Ok(subscription) => subscription,
            Err(error) => {
                warn!(identity, %error, "failed to subscribe to user document");
                self.reset(generation);
                return Err(error.into());
            }
        };

        let state = Arc::clone(&self.state);
        let current_generation = Arc::clone(&self.generation);
        let owner = identity.to_string();
        let task = tokio::spawn(async move {
            while let Some(item) = subscription.next().await {
                let snapshot = match item {
                    Ok(snapshot) => snapshot,
                    Err(error) => {
                        warn!(identity = %owner, %error, "user subscription error; keeping last snapshot");
                        continue;
                    }
                };
                let user = match snapshot.as_ref().map(decode_record::<User>).transpose() {
                    Ok(user) => user,
                    Err(error) => {
                        warn!(identity = %owner, %error, "ignoring undecodable user snapshot");
                        continue;
                    }
                };
                state.send_if_modified(|current| {
                    if current_generation.load(Ordering::SeqCst) != generation {
                        return false;
                    }
                    let next = MembershipState {
                        identity: Some(owner.clone()),
                        phase: MembershipPhase::Synced,
                        user,
                    };
                    if *current == next {
                        return false;
                    }
                    *current = next;
                    true
                });
            }
            debug!(identity = %owner, "user subscription ended");
        });

        let mut listener = self.listener();
        if self.generation.load(Ordering::SeqCst) == generation {
            *listener = Some(task);
        } else {
            task.abort();
        }
        Ok(())
    }

    /// Cancels the user subscription and returns to `Unauthenticated`. Idempotent.
    pub fn unsubscribe(&self) {
        if let Some(task) = self.listener().take() {
            task.abort();
        }
        self.state.send_if_modified(|current| {
            self.generation.fetch_add(1, Ordering::SeqCst);
            if *current == MembershipState::default() {
                return false;
            }
            *current = MembershipState::default();
            true
        });
    }

    fn reset(&self, generation: u64) {
        self.state.send_if_modified(|current| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            *current = MembershipState::default();
            true
        });
    }

    /// Adds `target_id` to the relation set, locally first and then on the remote user document.
    pub async fn join(&self, relation: Relation, target_id: &str) -> Result<(), MembershipError> {
        self.mutate(relation, target_id, true).await
    }

    /// Removes `target_id` from the relation set, locally first and then on the remote user document.
    pub async fn leave(&self, relation: Relation, target_id: &str) -> Result<(), MembershipError> {
        self.mutate(relation, target_id, false).await
    }

    async fn mutate(&self, relation: Relation, target_id: &str, join: bool) -> Result<(), MembershipError> {
        let local = self.apply_local(relation, target_id, join)?;
        let patch = if join {
            DocumentPatch::new().array_append(relation.field(), target_id)
        } else {
            DocumentPatch::new().array_remove(relation.field(), target_id)
        };

        match self.store.update_document(User::COLLECTION, &local.identity, patch).await {
            Ok(()) => {
                debug!(identity = %local.identity, %relation, target_id, join, "membership write committed");
                Ok(())
            }
            Err(error) => {
                warn!(identity = %local.identity, %relation, target_id, join, %error, "membership write failed");
                if self.rollback == RollbackPolicy::Revert && local.changed {
                    self.revert(local.generation, relation, target_id, join);
                }
                Err(error.into())
            }
        }
    }

    fn apply_local(&self, relation: Relation, target_id: &str, join: bool) -> Result<LocalChange, MembershipError> {
        let mut outcome = Err(MembershipError::Unauthenticated);
        self.state.send_if_modified(|current| {
            let Some(identity) = current.identity.clone() else {
                return false;
            };
            let Some(user) = current.user.as_mut() else {
                outcome = Err(MembershipError::NotLoaded { identity });
                return false;
            };
            let set = user.relation_mut(relation);
            let changed = if join {
                set.insert(target_id.to_string())
            } else {
                set.remove(target_id)
            };
            outcome = Ok(LocalChange {
                identity,
                generation: self.generation.load(Ordering::SeqCst),
                changed,
            });
            changed
        });
        outcome
    }

    fn revert(&self, generation: u64, relation: Relation, target_id: &str, join: bool) {
        self.state.send_if_modified(|current| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            let Some(user) = current.user.as_mut() else {
                return false;
            };
            let set = user.relation_mut(relation);
            if join {
                set.remove(target_id)
            } else {
                set.insert(target_id.to_string())
            }
        });
    }
}

impl Drop for MembershipStore {
    fn drop(&mut self) {
        if let Some(task) = self.listener().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(events: &[&str]) -> MembershipState {
        let mut user = User::new("ada@connect.hku.hk");
        user.joined_events = events.iter().map(|id| id.to_string()).collect();
        MembershipState {
            identity: Some(user.identity.clone()),
            phase: MembershipPhase::Synced,
            user: Some(user),
        }
    }

    #[test]
    fn membership_requires_a_loaded_user() {
        let state = MembershipState::default();
        assert!(matches!(
            state.is_member(Relation::Events, "E1"),
            Err(MembershipError::Unauthenticated)
        ));

        let state = MembershipState {
            identity: Some("ada@connect.hku.hk".into()),
            phase: MembershipPhase::Subscribing,
            user: None,
        };
        assert!(matches!(
            state.is_member(Relation::Events, "E1"),
            Err(MembershipError::NotLoaded { .. })
        ));
    }

    #[test]
    fn membership_reads_the_relation_set() {
        let state = loaded(&["E1"]);
        assert!(state.is_member(Relation::Events, "E1").expect("loaded"));
        assert!(!state.is_member(Relation::Events, "E2").expect("loaded"));
        assert!(!state.is_member(Relation::Societies, "E1").expect("loaded"));
    }

    #[test]
    fn rollback_policy_from_config_flag() {
        assert_eq!(RollbackPolicy::from_flag(false), RollbackPolicy::Keep);
        assert_eq!(RollbackPolicy::from_flag(true), RollbackPolicy::Revert);
    }
}
