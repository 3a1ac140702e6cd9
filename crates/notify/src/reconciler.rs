//! Scheduling reconciler.
//!
//! Keeps the pending queue consistent with the current event and the current
//! preferences. Every trigger rebuilds the whole plan for its scope: an
//! event's pending entries are replaced in one store call, never patched.
//!
//! | Trigger              | Action                                        |
//! |----------------------|-----------------------------------------------|
//! | event created        | plan with given or effective preferences      |
//! | date/recurring edit  | replace the event's pending entries           |
//! | event deleted        | clear the event's pending entries             |
//! | preferences changed  | replace pending entries for every user event  |
//! | rollover sweep       | plan recurring events with nothing pending    |

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use keepdate_core::error::CoreError;
use keepdate_core::plan::{build_plan, PlannedNotification, ReminderPreferences};
use keepdate_core::recurrence::occurrence_date;
use keepdate_core::types::{DbId, Timestamp};
use keepdate_db::models::event::Event;
use keepdate_db::models::notification::NewScheduledNotification;
use serde::Serialize;

use crate::clock::Clock;
use crate::directory::EventDirectory;
use crate::error::NotifyError;
use crate::store::QueueStore;

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// The parts of an event that decide when its reminders fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleTarget {
    pub user_id: DbId,
    pub event_id: DbId,
    pub base_date: NaiveDate,
    pub recurring: bool,
}

impl From<&Event> for ScheduleTarget {
    fn from(event: &Event) -> Self {
        Self {
            user_id: event.user_id,
            event_id: event.id,
            base_date: event.event_date,
            recurring: event.recurring,
        }
    }
}

/// What one event's reconcile produced.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleOutcome {
    pub event_id: DbId,
    pub occurrence_date: NaiveDate,
    /// Pending entries removed before the new plan went in.
    pub cleared: u64,
    pub planned: Vec<PlannedNotification>,
}

/// Totals from a full-user rescan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RescheduleSummary {
    pub events: usize,
    pub scheduled: usize,
    pub failed: usize,
}

/// Plan the reminders for `target` as seen at `now`.
///
/// "Today" for recurrence is `now`'s date in the user's timezone. A user
/// with push notifications off gets an empty plan.
pub fn plan_for(
    target: &ScheduleTarget,
    prefs: &ReminderPreferences,
    now: Timestamp,
) -> Result<(NaiveDate, Vec<PlannedNotification>), CoreError> {
    let tz = prefs.tz()?;
    let today = now.with_timezone(&tz).date_naive();
    let occurrence = occurrence_date(target.base_date, target.recurring, today);

    if !prefs.push_notifications_enabled {
        return Ok((occurrence, Vec::new()));
    }

    let plan = build_plan(occurrence, prefs, now)?;
    Ok((occurrence, plan))
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

pub struct Reconciler {
    store: Arc<dyn QueueStore>,
    directory: Arc<dyn EventDirectory>,
    clock: Arc<dyn Clock>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn QueueStore>,
        directory: Arc<dyn EventDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            directory,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.store
    }

    pub fn directory(&self) -> &Arc<dyn EventDirectory> {
        &self.directory
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// The user's saved preferences, or the defaults if none were saved.
    pub async fn effective_preferences(
        &self,
        user_id: DbId,
    ) -> Result<ReminderPreferences, NotifyError> {
        Ok(self
            .directory
            .preferences_for_user(user_id)
            .await?
            .unwrap_or_default())
    }

    /// Replace the pending entries of one event with a fresh plan.
    pub async fn schedule_notifications_for_event(
        &self,
        target: ScheduleTarget,
        prefs: &ReminderPreferences,
    ) -> Result<ScheduleOutcome, NotifyError> {
        let (occurrence, planned) = plan_for(&target, prefs, self.clock.now())?;

        let entries: Vec<NewScheduledNotification> = planned
            .iter()
            .map(|p| NewScheduledNotification::from_plan(target.user_id, target.event_id, p))
            .collect();

        let outcome = self
            .store
            .replace_pending_for_event(target.event_id, &entries)
            .await?;

        tracing::debug!(
            event_id = target.event_id,
            user_id = target.user_id,
            %occurrence,
            cleared = outcome.cleared,
            scheduled = outcome.scheduled.len(),
            "Reminders scheduled",
        );

        Ok(ScheduleOutcome {
            event_id: target.event_id,
            occurrence_date: occurrence,
            cleared: outcome.cleared,
            planned,
        })
    }

    /// Plan a freshly created event with `prefs`, or the owner's effective
    /// preferences when none are given.
    pub async fn on_event_created(
        &self,
        event: &Event,
        prefs: Option<&ReminderPreferences>,
    ) -> Result<ScheduleOutcome, NotifyError> {
        let prefs = match prefs {
            Some(p) => p.clone(),
            None => self.effective_preferences(event.user_id).await?,
        };
        self.schedule_notifications_for_event(event.into(), &prefs).await
    }

    /// Rebuild after an edit. Returns `None` when neither the date nor the
    /// recurring flag changed, since the plan would be identical.
    pub async fn on_event_updated(
        &self,
        before: &Event,
        after: &Event,
    ) -> Result<Option<ScheduleOutcome>, NotifyError> {
        if before.event_date == after.event_date && before.recurring == after.recurring {
            return Ok(None);
        }
        let prefs = self.effective_preferences(after.user_id).await?;
        self.schedule_notifications_for_event(after.into(), &prefs)
            .await
            .map(Some)
    }

    pub async fn on_event_deleted(&self, event_id: DbId) -> Result<u64, NotifyError> {
        self.clear_notifications_for_event(event_id).await
    }

    /// Drop every pending entry for an event. Sent and failed history stays.
    pub async fn clear_notifications_for_event(&self, event_id: DbId) -> Result<u64, NotifyError> {
        let cleared = self.store.clear_pending_for_event(event_id).await?;
        tracing::debug!(event_id, cleared, "Pending reminders cleared");
        Ok(cleared)
    }

    /// Look an event up and rebuild its plan with the owner's preferences.
    pub async fn schedule_for_event_id(&self, event_id: DbId) -> Result<ScheduleOutcome, NotifyError> {
        let event = self
            .directory
            .get_event(event_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Event",
                id: event_id,
            })?;
        self.on_event_created(&event, None).await
    }

    /// Rebuild the plan of every event a user owns.
    ///
    /// Events are handled independently: one failing is logged and counted,
    /// and the rest still get rescheduled. Failing to load the preferences or
    /// the event list aborts the whole rescan.
    pub async fn reschedule_all_for_user(&self, user_id: DbId) -> Result<RescheduleSummary, NotifyError> {
        let prefs = self.effective_preferences(user_id).await?;
        prefs.validate()?;
        let events = self.directory.list_events_for_user(user_id).await?;

        let mut summary = RescheduleSummary {
            events: events.len(),
            ..Default::default()
        };

        for event in &events {
            match self.schedule_notifications_for_event(event.into(), &prefs).await {
                Ok(outcome) => summary.scheduled += outcome.planned.len(),
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(
                        user_id,
                        event_id = event.id,
                        error = %e,
                        "Failed to reschedule event reminders",
                    );
                }
            }
        }

        tracing::info!(
            user_id,
            events = summary.events,
            scheduled = summary.scheduled,
            failed = summary.failed,
            "Rescheduled reminders for user",
        );
        Ok(summary)
    }

    /// Plan the next occurrence of every recurring event whose queue has run
    /// dry.
    ///
    /// Once an occurrence's last reminder is sent or failed nothing else
    /// touches the event until it is edited, so this sweep is what carries a
    /// birthday into the following year. While the occurrence is still today
    /// the plan comes out empty; the first sweep after the day ends plans the
    /// next one.
    pub async fn roll_over_recurring(&self) -> Result<RescheduleSummary, NotifyError> {
        let events = self.directory.recurring_events_without_pending().await?;
        let mut prefs_by_user: HashMap<DbId, ReminderPreferences> = HashMap::new();
        let mut summary = RescheduleSummary {
            events: events.len(),
            ..Default::default()
        };

        for event in &events {
            let prefs = match prefs_by_user.get(&event.user_id).cloned() {
                Some(p) => p,
                None => match self.effective_preferences(event.user_id).await {
                    Ok(p) => {
                        prefs_by_user.insert(event.user_id, p.clone());
                        p
                    }
                    Err(e) => {
                        summary.failed += 1;
                        tracing::warn!(event_id = event.id, error = %e, "Failed to load preferences for rollover");
                        continue;
                    }
                },
            };

            match self.schedule_notifications_for_event(event.into(), &prefs).await {
                Ok(outcome) => summary.scheduled += outcome.planned.len(),
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(
                        user_id = event.user_id,
                        event_id = event.id,
                        error = %e,
                        "Failed to roll over recurring event",
                    );
                }
            }
        }

        if summary.scheduled > 0 || summary.failed > 0 {
            tracing::info!(
                events = summary.events,
                scheduled = summary.scheduled,
                failed = summary.failed,
                "Rolled recurring events over to their next occurrence",
            );
        }
        Ok(summary)
    }
}
