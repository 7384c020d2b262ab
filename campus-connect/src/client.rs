use std::sync::Arc;

use tracing::info;

use crate::{
    config::ClientConfig,
    errors::StoreError,
    membership::{MembershipStore, RollbackPolicy},
    mirror::{CollectionMirror, mirror_events, mirror_societies},
    model::{EventListing, Society},
    reconciler::MembershipReconciler,
    reminders::ReminderScheduler,
    store::{DocumentStore, RedisStore},
};

/// One store, both mirrors, the membership store and the reconciler, wired together.
pub struct CampusClient {
    store: Arc<dyn DocumentStore>,
    membership: Arc<MembershipStore>,
    events: CollectionMirror<EventListing>,
    societies: CollectionMirror<Society>,
    reconciler: MembershipReconciler,
}

impl CampusClient {
    /// Connects to the Redis store named by `config`.
    pub async fn connect(config: &ClientConfig, reminders: Arc<dyn ReminderScheduler>) -> Result<Self, StoreError> {
        let store = RedisStore::connect(&config.redis.url, config.redis.prefix.clone())
            .await?
            .with_reconnect(config.redis.reconnect_policy());
        info!(prefix = %config.redis.prefix, "connected to redis document store");
        Self::with_store(Arc::new(store), config, reminders).await
    }

    pub async fn with_store(
        store: Arc<dyn DocumentStore>,
        config: &ClientConfig,
        reminders: Arc<dyn ReminderScheduler>,
    ) -> Result<Self, StoreError> {
        let membership = Arc::new(
            MembershipStore::new(Arc::clone(&store))
                .with_rollback(RollbackPolicy::from_flag(config.membership.rollback_on_failure)),
        );
        let events = mirror_events(Arc::clone(&store)).await?;
        let societies = mirror_societies(Arc::clone(&store)).await?;
        let reconciler = MembershipReconciler::new(Arc::clone(&membership), &events, &societies, reminders)
            .with_reminder_lead(config.reminders.lead_minutes);
        Ok(Self {
            store,
            membership,
            events,
            societies,
            reconciler,
        })
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn membership(&self) -> &Arc<MembershipStore> {
        &self.membership
    }

    pub fn events(&self) -> &CollectionMirror<EventListing> {
        &self.events
    }

    pub fn societies(&self) -> &CollectionMirror<Society> {
        &self.societies
    }

    pub fn reconciler(&self) -> &MembershipReconciler {
        &self.reconciler
    }

    /// Tears down the derived views, the user subscription and both mirrors, in that order.
    pub fn shutdown(self) {
        let Self {
            membership,
            events,
            societies,
            reconciler,
            ..
        } = self;
        reconciler.shutdown();
        membership.unsubscribe();
        events.close();
        societies.close();
    }
}
