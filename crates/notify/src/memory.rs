//! In-memory [`QueueStore`] and [`EventDirectory`].
//!
//! Mirrors the Postgres semantics: one pending entry per
//! `(event_id, notification_type)`, pending-gated status changes, and
//! cascade of queue entries when an event is removed. Useful for tests and
//! for running the engine without a database.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use keepdate_core::event_type::EventType;
use keepdate_core::plan::ReminderPreferences;
use keepdate_core::status::{state_machine, STATUS_FAILED, STATUS_PENDING, STATUS_SENT};
use keepdate_core::types::{DbId, Timestamp};
use keepdate_db::models::event::Event;
use keepdate_db::models::notification::{DueNotification, NewScheduledNotification, ScheduledNotification};
use tokio::sync::Mutex;

use crate::directory::EventDirectory;
use crate::error::NotifyError;
use crate::store::{QueueStore, ReplaceOutcome};

#[derive(Default)]
struct State {
    next_id: DbId,
    events: BTreeMap<DbId, Event>,
    preferences: HashMap<DbId, ReminderPreferences>,
    queue: BTreeMap<DbId, ScheduledNotification>,
}

impl State {
    fn next_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }

    fn upsert(&mut self, entries: &[NewScheduledNotification]) -> Vec<ScheduledNotification> {
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            let existing = self.queue.values_mut().find(|n| {
                n.status_id == STATUS_PENDING
                    && n.event_id == entry.event_id
                    && n.notification_type == entry.kind.as_str()
            });

            let row = match existing {
                Some(row) => {
                    row.user_id = entry.user_id;
                    row.scheduled_time = entry.scheduled_time;
                    row.occurrence_date = entry.occurrence_date;
                    row.clone()
                }
                None => {
                    let id = self.next_id();
                    let row = ScheduledNotification {
                        id,
                        user_id: entry.user_id,
                        event_id: entry.event_id,
                        notification_type: entry.kind.as_str().to_string(),
                        scheduled_time: entry.scheduled_time,
                        occurrence_date: entry.occurrence_date,
                        status_id: STATUS_PENDING,
                        sent_at: None,
                        error_message: None,
                        note: None,
                        created_at: Utc::now(),
                    };
                    self.queue.insert(id, row.clone());
                    row
                }
            };
            out.push(row);
        }
        out
    }

    fn clear_pending(&mut self, keep: impl Fn(&ScheduledNotification) -> bool) -> u64 {
        let before = self.queue.len();
        self.queue
            .retain(|_, n| n.status_id != STATUS_PENDING || keep(n));
        (before - self.queue.len()) as u64
    }

    /// Apply a status change if the state machine allows it.
    fn transition(&mut self, id: DbId, to: i16, apply: impl FnOnce(&mut ScheduledNotification)) -> bool {
        let Some(row) = self.queue.get_mut(&id) else {
            return false;
        };
        if let Err(reason) = state_machine::validate_transition(row.status_id, to) {
            tracing::debug!(notification_id = id, %reason, "Status change ignored");
            return false;
        }
        row.status_id = to;
        apply(row);
        true
    }
}

/// Shared in-memory storage. Cheap to wrap in an `Arc` and hand to both the
/// reconciler and the dispatcher.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new event and return it with its assigned id.
    pub async fn add_event(
        &self,
        user_id: DbId,
        title: &str,
        date: NaiveDate,
        event_type: EventType,
        recurring: bool,
    ) -> Event {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let event = Event {
            id: state.next_id(),
            user_id,
            title: title.to_string(),
            event_date: date,
            event_type: event_type.as_str().to_string(),
            recurring,
            description: None,
            created_at: now,
            updated_at: now,
        };
        state.events.insert(event.id, event.clone());
        event
    }

    /// Replace a stored event, keeping its id.
    pub async fn put_event(&self, event: Event) {
        self.state.lock().await.events.insert(event.id, event);
    }

    /// Remove an event and every queue entry pointing at it.
    pub async fn remove_event(&self, event_id: DbId) -> bool {
        let mut state = self.state.lock().await;
        state.queue.retain(|_, n| n.event_id != event_id);
        state.events.remove(&event_id).is_some()
    }

    pub async fn set_preferences(&self, user_id: DbId, prefs: ReminderPreferences) {
        self.state.lock().await.preferences.insert(user_id, prefs);
    }

    /// Every queue entry, in id order.
    pub async fn entries(&self) -> Vec<ScheduledNotification> {
        self.state.lock().await.queue.values().cloned().collect()
    }

    pub async fn pending_for_event(&self, event_id: DbId) -> Vec<ScheduledNotification> {
        self.state
            .lock()
            .await
            .queue
            .values()
            .filter(|n| n.event_id == event_id && n.status_id == STATUS_PENDING)
            .cloned()
            .collect()
    }

    pub async fn find_entry(&self, id: DbId) -> Option<ScheduledNotification> {
        self.state.lock().await.queue.get(&id).cloned()
    }
}

#[async_trait]
impl QueueStore for MemoryBackend {
    async fn insert(
        &self,
        entries: &[NewScheduledNotification],
    ) -> Result<Vec<ScheduledNotification>, NotifyError> {
        Ok(self.state.lock().await.upsert(entries))
    }

    async fn replace_pending_for_event(
        &self,
        event_id: DbId,
        entries: &[NewScheduledNotification],
    ) -> Result<ReplaceOutcome, NotifyError> {
        let mut state = self.state.lock().await;
        let cleared = state.clear_pending(|n| n.event_id != event_id);
        let scheduled = state.upsert(entries);
        Ok(ReplaceOutcome { cleared, scheduled })
    }

    async fn clear_pending_for_event(&self, event_id: DbId) -> Result<u64, NotifyError> {
        Ok(self.state.lock().await.clear_pending(|n| n.event_id != event_id))
    }

    async fn clear_pending_for_user(&self, user_id: DbId) -> Result<u64, NotifyError> {
        Ok(self.state.lock().await.clear_pending(|n| n.user_id != user_id))
    }

    async fn list_due(&self, now: Timestamp, limit: i64) -> Result<Vec<DueNotification>, NotifyError> {
        let state = self.state.lock().await;

        let mut due: Vec<DueNotification> = state
            .queue
            .values()
            .filter(|n| n.status_id == STATUS_PENDING && n.scheduled_time <= now)
            .filter_map(|n| {
                let event = state.events.get(&n.event_id)?;
                let delivery_enabled = state
                    .preferences
                    .get(&n.user_id)
                    .map_or(true, ReminderPreferences::delivery_enabled);
                Some(DueNotification {
                    id: n.id,
                    user_id: n.user_id,
                    event_id: n.event_id,
                    notification_type: n.notification_type.clone(),
                    scheduled_time: n.scheduled_time,
                    occurrence_date: n.occurrence_date,
                    event_title: event.title.clone(),
                    event_type: event.event_type.clone(),
                    delivery_enabled,
                })
            })
            .collect();

        due.sort_by_key(|d| (d.scheduled_time, d.id));
        due.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(due)
    }

    async fn mark_sent(&self, id: DbId, note: Option<&str>) -> Result<bool, NotifyError> {
        let mut state = self.state.lock().await;
        Ok(state.transition(id, STATUS_SENT, |row| {
            row.sent_at = Some(Utc::now());
            row.note = note.map(str::to_string);
        }))
    }

    async fn mark_failed(&self, id: DbId, error: &str) -> Result<bool, NotifyError> {
        let mut state = self.state.lock().await;
        Ok(state.transition(id, STATUS_FAILED, |row| {
            row.error_message = Some(error.to_string());
        }))
    }

    async fn pending_due_count(&self, user_id: Option<DbId>, now: Timestamp) -> Result<i64, NotifyError> {
        let state = self.state.lock().await;
        let count = state
            .queue
            .values()
            .filter(|n| n.status_id == STATUS_PENDING && n.scheduled_time <= now)
            .filter(|n| user_id.map_or(true, |u| n.user_id == u))
            .count();
        Ok(count as i64)
    }
}

#[async_trait]
impl EventDirectory for MemoryBackend {
    async fn get_event(&self, event_id: DbId) -> Result<Option<Event>, NotifyError> {
        Ok(self.state.lock().await.events.get(&event_id).cloned())
    }

    async fn list_events_for_user(&self, user_id: DbId) -> Result<Vec<Event>, NotifyError> {
        Ok(self
            .state
            .lock()
            .await
            .events
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn recurring_events_without_pending(&self) -> Result<Vec<Event>, NotifyError> {
        let state = self.state.lock().await;
        Ok(state
            .events
            .values()
            .filter(|e| e.recurring)
            .filter(|e| {
                !state
                    .queue
                    .values()
                    .any(|n| n.event_id == e.id && n.status_id == STATUS_PENDING)
            })
            .cloned()
            .collect())
    }

    async fn preferences_for_user(
        &self,
        user_id: DbId,
    ) -> Result<Option<ReminderPreferences>, NotifyError> {
        Ok(self.state.lock().await.preferences.get(&user_id).cloned())
    }
}
