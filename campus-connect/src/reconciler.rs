//! "My events" and "my societies", and the join/leave toggles behind them.
//!
//! A derived view has two input ports: the collection mirror and the membership state. Whichever
//! fires, the view is recomputed from the latest value of both, so the result does not depend on
//! which side arrived first.

use std::{collections::BTreeSet, sync::Arc};

use chrono::{Duration, Utc};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, warn};

use crate::{
    errors::MembershipError,
    membership::{MembershipState, MembershipStore},
    mirror::{CollectionMirror, MirrorSnapshot},
    model::{EventListing, Identified, Relation, Society},
    reminders::{DEFAULT_LEAD_MINUTES, EventReminder, ReminderScheduler},
};

/// Items of `items` whose id is in `membership`, in mirror order.
///
/// No membership (not signed in, or not loaded yet) yields an empty view.
pub fn derive_mine<T: Identified + Clone>(items: &[T], membership: Option<&BTreeSet<String>>) -> Vec<T> {
    let Some(membership) = membership else {
        return Vec::new();
    };
    items
        .iter()
        .filter(|item| membership.contains(item.id()))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipChange {
    Joined,
    Left,
}

fn recompute<T: Identified + Clone>(
    mirror: &mut watch::Receiver<MirrorSnapshot<T>>,
    membership: &mut watch::Receiver<MembershipState>,
    relation: Relation,
) -> Vec<T> {
    let mirror = mirror.borrow_and_update();
    let membership = membership.borrow_and_update();
    derive_mine(&mirror.items, membership.relation_set(relation))
}

fn spawn_view<T>(
    mut mirror: watch::Receiver<MirrorSnapshot<T>>,
    mut membership: watch::Receiver<MembershipState>,
    relation: Relation,
) -> (watch::Receiver<Vec<T>>, JoinHandle<()>)
where
    T: Identified + Clone + PartialEq + Send + Sync + 'static,
{
    let (sender, view) = watch::channel(recompute(&mut mirror, &mut membership, relation));
    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = mirror.changed() => if changed.is_err() { break },
                changed = membership.changed() => if changed.is_err() { break },
            }
            let next = recompute(&mut mirror, &mut membership, relation);
            sender.send_if_modified(|current| {
                if *current == next {
                    return false;
                }
                *current = next;
                true
            });
        }
        debug!(%relation, "derived view stopped");
    });
    (view, task)
}

pub struct MembershipReconciler {
    membership: Arc<MembershipStore>,
    events: watch::Receiver<MirrorSnapshot<EventListing>>,
    reminders: Arc<dyn ReminderScheduler>,
    reminder_lead: Duration,
    my_events: watch::Receiver<Vec<EventListing>>,
    my_societies: watch::Receiver<Vec<Society>>,
    tasks: Vec<JoinHandle<()>>,
}

impl MembershipReconciler {
    /// Starts both derived views. Must be called inside a Tokio runtime.
    pub fn new(
        membership: Arc<MembershipStore>,
        events: &CollectionMirror<EventListing>,
        societies: &CollectionMirror<Society>,
        reminders: Arc<dyn ReminderScheduler>,
    ) -> Self {
        let (my_events, events_task) = spawn_view(events.watch(), membership.watch(), Relation::Events);
        let (my_societies, societies_task) = spawn_view(societies.watch(), membership.watch(), Relation::Societies);
        Self {
            membership,
            events: events.watch(),
            reminders,
            reminder_lead: Duration::minutes(DEFAULT_LEAD_MINUTES),
            my_events,
            my_societies,
            tasks: vec![events_task, societies_task],
        }
    }

    pub fn with_reminder_lead(mut self, minutes: i64) -> Self {
        self.reminder_lead = Duration::minutes(minutes);
        self
    }

    pub fn membership(&self) -> &Arc<MembershipStore> {
        &self.membership
    }

    pub fn my_events(&self) -> watch::Receiver<Vec<EventListing>> {
        self.my_events.clone()
    }

    pub fn my_societies(&self) -> watch::Receiver<Vec<Society>> {
        self.my_societies.clone()
    }

    /// Leaves a joined event (cancelling its reminder) or joins it (scheduling one).
    ///
    /// The membership write and the reminder are independent steps: a reminder failure is only
    /// logged, and a failed write does not undo the reminder step.
    pub async fn toggle_event_membership(&self, event_id: &str) -> Result<MembershipChange, MembershipError> {
        let joined = self.membership.current().is_member(Relation::Events, event_id)?;
        if joined {
            let written = self.membership.leave(Relation::Events, event_id).await;
            if let Err(error) = self.reminders.cancel(event_id).await {
                warn!(event_id, %error, "failed to cancel event reminder");
            }
            written.map(|()| MembershipChange::Left)
        } else {
            let written = self.membership.join(Relation::Events, event_id).await;
            self.schedule_reminder(event_id).await;
            written.map(|()| MembershipChange::Joined)
        }
    }

    /// Joins or leaves a society.
    pub async fn toggle_society_membership(&self, society_id: &str) -> Result<MembershipChange, MembershipError> {
        if self.membership.current().is_member(Relation::Societies, society_id)? {
            self.membership.leave(Relation::Societies, society_id).await?;
            Ok(MembershipChange::Left)
        } else {
            self.membership.join(Relation::Societies, society_id).await?;
            Ok(MembershipChange::Joined)
        }
    }

    fn reminder_for(&self, event_id: &str) -> Option<EventReminder> {
        let events = self.events.borrow();
        let listing = events.find(event_id)?;
        Some(EventReminder::for_listing(listing, self.reminder_lead, Utc::now()))
    }

    async fn schedule_reminder(&self, event_id: &str) {
        let Some(reminder) = self.reminder_for(event_id) else {
            warn!(event_id, "event is not mirrored; no reminder scheduled");
            return;
        };
        if let Err(error) = self.reminders.schedule(reminder).await {
            warn!(event_id, %error, "failed to schedule event reminder");
        }
    }

    /// Stops both derived views.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for MembershipReconciler {
    fn drop(&mut self) {
        self.stop();
    }
}
