//! Local reminders for joined events.

use std::{
    collections::BTreeMap,
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::{errors::ReminderError, model::EventListing};

/// Default lead time between a reminder and the event it announces.
pub const DEFAULT_LEAD_MINUTES: i64 = 60;

#[derive(Debug, Clone, PartialEq)]
pub struct EventReminder {
    pub event_id: String,
    pub title: String,
    pub body: String,
    pub fire_at: DateTime<Utc>,
}

impl EventReminder {
    /// Reminder firing `lead` before the event, or at `now` if that instant has already passed.
    pub fn for_listing(listing: &EventListing, lead: Duration, now: DateTime<Utc>) -> Self {
        let event = &listing.event;
        let fire_at = (event.time - lead).max(now);
        let title = if event.name.is_empty() {
            "Upcoming event".to_string()
        } else {
            event.name.clone()
        };
        let mut body = format!("Starts {}", event.time.format("%a %d %b %H:%M UTC"));
        if !event.location.is_empty() {
            body.push_str(&format!(" at {}", event.location));
        }
        if let Some(society) = &listing.society_name {
            body.push_str(&format!(" ({society})"));
        }
        Self {
            event_id: event.id.clone(),
            title,
            body,
            fire_at,
        }
    }
}

#[async_trait]
pub trait ReminderScheduler: Send + Sync {
    /// Schedules `reminder`, replacing any reminder already scheduled for the same event.
    async fn schedule(&self, reminder: EventReminder) -> Result<(), ReminderError>;

    /// Cancels the reminder for `event_id`; cancelling an unknown reminder is not an error.
    async fn cancel(&self, event_id: &str) -> Result<(), ReminderError>;
}

/// Keeps scheduled reminders in memory.
#[derive(Default)]
pub struct MemoryReminders {
    scheduled: Mutex<BTreeMap<String, EventReminder>>,
    failing: AtomicBool,
}

impl MemoryReminders {
    pub fn new() -> Self {
        Self::default()
    }

    fn scheduled_map(&self) -> MutexGuard<'_, BTreeMap<String, EventReminder>> {
        self.scheduled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn scheduled(&self) -> Vec<EventReminder> {
        self.scheduled_map().values().cloned().collect()
    }

    pub fn get(&self, event_id: &str) -> Option<EventReminder> {
        self.scheduled_map().get(event_id).cloned()
    }

    /// Makes every call fail until switched off again.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), ReminderError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ReminderError::Unavailable {
                message: "injected reminder failure".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ReminderScheduler for MemoryReminders {
    async fn schedule(&self, reminder: EventReminder) -> Result<(), ReminderError> {
        self.check()?;
        self.scheduled_map().insert(reminder.event_id.clone(), reminder);
        Ok(())
    }

    async fn cancel(&self, event_id: &str) -> Result<(), ReminderError> {
        self.check()?;
        self.scheduled_map().remove(event_id);
        Ok(())
    }
}

/// Only logs reminders. Used by the CLI, which has nowhere to deliver them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReminders;

#[async_trait]
impl ReminderScheduler for LogReminders {
    async fn schedule(&self, reminder: EventReminder) -> Result<(), ReminderError> {
        info!(
            event_id = %reminder.event_id,
            fire_at = %reminder.fire_at,
            title = %reminder.title,
            "reminder scheduled"
        );
        Ok(())
    }

    async fn cancel(&self, event_id: &str) -> Result<(), ReminderError> {
        info!(event_id, "reminder cancelled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Event;
    use chrono::TimeZone;

    fn listing(time: DateTime<Utc>) -> EventListing {
        EventListing {
            event: Event {
                id: "E1".into(),
                name: "Orientation".into(),
                description: String::new(),
                fee: 0.0,
                time,
                location: "Main Hall".into(),
                background_image: None,
                society: "S1".into(),
            },
            society_name: Some("Chess".into()),
            society_logo: None,
        }
    }

    #[test]
    fn fires_lead_minutes_before_the_event() {
        let time = Utc.with_ymd_and_hms(2026, 10, 1, 10, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap();
        let reminder = EventReminder::for_listing(&listing(time), Duration::minutes(60), now);
        assert_eq!(reminder.fire_at, Utc.with_ymd_and_hms(2026, 10, 1, 9, 0, 0).unwrap());
        assert_eq!(reminder.title, "Orientation");
        assert!(reminder.body.contains("Main Hall"));
        assert!(reminder.body.contains("Chess"));
    }

    #[test]
    fn fires_immediately_when_lead_has_passed() {
        let time = Utc.with_ymd_and_hms(2026, 10, 1, 10, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 10, 1, 9, 30, 0).unwrap();
        let reminder = EventReminder::for_listing(&listing(time), Duration::minutes(60), now);
        assert_eq!(reminder.fire_at, now);
    }

    #[tokio::test]
    async fn memory_reminders_replace_and_cancel() {
        let reminders = MemoryReminders::new();
        let time = Utc.with_ymd_and_hms(2026, 10, 1, 10, 0, 0).unwrap();
        let reminder = EventReminder::for_listing(&listing(time), Duration::minutes(30), time);
        reminders.schedule(reminder.clone()).await.expect("schedule");
        reminders.schedule(reminder).await.expect("reschedule");
        assert_eq!(reminders.scheduled().len(), 1);

        reminders.cancel("E1").await.expect("cancel");
        reminders.cancel("E1").await.expect("cancel twice");
        assert!(reminders.get("E1").is_none());

        reminders.set_failing(true);
        assert!(reminders.cancel("E1").await.is_err());
    }
}
