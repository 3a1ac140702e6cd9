//! Queue-less reminder scheduling on in-process timers.
//!
//! [`LocalScheduler`] runs the same plan as the reconciler but arms a tokio
//! timer per planned reminder instead of writing to the queue. Nothing is
//! persisted and there is no coordination between instances: two schedulers
//! planning the same event will both deliver.
//!
//! Library-only: neither the API server nor the worker arms it. Embedders
//! that want same-session delivery without a queue construct it directly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use keepdate_core::message::{compose, MessageContext};
use keepdate_core::plan::{NotificationKind, ReminderPreferences};
use keepdate_core::types::DbId;
use keepdate_db::models::event::Event;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::delivery::Notifier;
use crate::error::NotifyError;
use crate::reconciler::{plan_for, ScheduleTarget};

/// Identity of one armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReminderKey {
    pub event_id: DbId,
    pub kind: NotificationKind,
}

struct Timer {
    /// Distinguishes a timer from its replacement under the same key, so a
    /// finished task never removes a newer timer.
    generation: u64,
    handle: JoinHandle<()>,
}

type Timers = Arc<Mutex<HashMap<ReminderKey, Timer>>>;

pub struct LocalScheduler {
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    timers: Timers,
    generation: AtomicU64,
}

impl LocalScheduler {
    pub fn new(notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>) -> Self {
        Self {
            notifier,
            clock,
            timers: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Replace all timers of `event` with a fresh plan.
    ///
    /// Must be called from within a tokio runtime. Returns the armed keys;
    /// nothing is armed when the notifier is unavailable or delivery is off.
    pub fn schedule_event(
        &self,
        event: &Event,
        prefs: &ReminderPreferences,
    ) -> Result<Vec<ReminderKey>, NotifyError> {
        self.cancel_event(event.id);

        if !self.notifier.is_supported() || !self.notifier.has_permission() {
            tracing::debug!(
                event_id = event.id,
                notifier = self.notifier.name(),
                "Notifier unavailable, no local reminders armed",
            );
            return Ok(Vec::new());
        }
        if !prefs.delivery_enabled() {
            return Ok(Vec::new());
        }

        let now = self.clock.now();
        let (occurrence, plan) = plan_for(&ScheduleTarget::from(event), prefs, now)?;

        let mut keys = Vec::with_capacity(plan.len());
        for planned in plan {
            let key = ReminderKey {
                event_id: event.id,
                kind: planned.kind,
            };
            let delay = (planned.scheduled_time - now).to_std().unwrap_or_default();
            let message = compose(MessageContext {
                notification_id: None,
                event_id: event.id,
                event_title: &event.title,
                event_type: &event.event_type,
                kind: planned.kind,
                occurrence_date: occurrence,
            });

            let generation = self.generation.fetch_add(1, Ordering::Relaxed);
            let notifier = Arc::clone(&self.notifier);
            let timers = Arc::clone(&self.timers);

            // Hold the map while spawning so the task cannot finish before its
            // entry exists.
            let mut armed = lock(&self.timers);
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                match notifier.send(&message).await {
                    Ok(()) => tracing::debug!(tag = %message.tag, "Local reminder delivered"),
                    Err(e) => tracing::warn!(tag = %message.tag, error = %e, "Local reminder failed"),
                }
                let mut timers = lock(&timers);
                if timers.get(&key).is_some_and(|t| t.generation == generation) {
                    timers.remove(&key);
                }
            });

            if let Some(old) = armed.insert(key, Timer { generation, handle }) {
                old.handle.abort();
            }
            drop(armed);
            keys.push(key);
        }

        tracing::debug!(event_id = event.id, armed = keys.len(), "Local reminders armed");
        Ok(keys)
    }

    /// Cancel everything and re-arm timers for `events`.
    ///
    /// Events that fail to plan are logged and skipped. Returns the number of
    /// armed timers.
    pub fn reschedule_all(&self, events: &[Event], prefs: &ReminderPreferences) -> usize {
        self.cancel_all();
        events
            .iter()
            .map(|event| match self.schedule_event(event, prefs) {
                Ok(keys) => keys.len(),
                Err(e) => {
                    tracing::warn!(event_id = event.id, error = %e, "Failed to arm local reminders");
                    0
                }
            })
            .sum()
    }

    /// Cancel one timer. Returns `false` if it was not armed.
    pub fn cancel(&self, key: ReminderKey) -> bool {
        match lock(&self.timers).remove(&key) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every timer of one event, returning how many were armed.
    pub fn cancel_event(&self, event_id: DbId) -> usize {
        let mut timers = lock(&self.timers);
        let keys: Vec<ReminderKey> = timers
            .keys()
            .filter(|k| k.event_id == event_id)
            .copied()
            .collect();
        for key in &keys {
            if let Some(timer) = timers.remove(key) {
                timer.handle.abort();
            }
        }
        keys.len()
    }

    pub fn cancel_all(&self) {
        for (_, timer) in lock(&self.timers).drain() {
            timer.handle.abort();
        }
    }

    /// Armed keys in `(event_id, kind)` order.
    pub fn scheduled_keys(&self) -> Vec<ReminderKey> {
        let mut keys: Vec<_> = lock(&self.timers).keys().copied().collect();
        keys.sort();
        keys
    }
}

impl Drop for LocalScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

fn lock(timers: &Timers) -> MutexGuard<'_, HashMap<ReminderKey, Timer>> {
    timers.lock().unwrap_or_else(|e| e.into_inner())
}
