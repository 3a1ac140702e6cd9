//! Notification preference and queue entry models.

use chrono::{NaiveDate, NaiveTime};
use keepdate_core::error::CoreError;
use keepdate_core::plan::{NotificationKind, PlannedNotification, ReminderPreferences};
use keepdate_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use crate::models::status::NotificationStatus;

/// A row from the `notification_preferences` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct NotificationPreferences {
    pub id: DbId,
    pub user_id: DbId,
    pub notify_week_before: bool,
    pub notify_day_before: bool,
    pub notify_same_day: bool,
    pub week_before_time: NaiveTime,
    pub day_before_time: NaiveTime,
    pub same_day_time: NaiveTime,
    pub push_notifications_enabled: bool,
    pub browser_push_enabled: bool,
    pub timezone: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl NotificationPreferences {
    pub fn to_reminder_preferences(&self) -> ReminderPreferences {
        ReminderPreferences {
            notify_week_before: self.notify_week_before,
            notify_day_before: self.notify_day_before,
            notify_same_day: self.notify_same_day,
            week_before_time: self.week_before_time.into(),
            day_before_time: self.day_before_time.into(),
            same_day_time: self.same_day_time.into(),
            push_notifications_enabled: self.push_notifications_enabled,
            browser_push_enabled: self.browser_push_enabled,
            timezone: self.timezone.clone(),
        }
    }
}

/// A row from the `scheduled_notifications` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ScheduledNotification {
    pub id: DbId,
    pub user_id: DbId,
    pub event_id: DbId,
    pub notification_type: String,
    pub scheduled_time: Timestamp,
    pub occurrence_date: NaiveDate,
    pub status_id: i16,
    pub sent_at: Option<Timestamp>,
    pub error_message: Option<String>,
    pub note: Option<String>,
    pub created_at: Timestamp,
}

impl ScheduledNotification {
    pub fn kind(&self) -> Result<NotificationKind, CoreError> {
        self.notification_type.parse()
    }

    pub fn status(&self) -> Option<NotificationStatus> {
        NotificationStatus::from_id(self.status_id)
    }
}

/// Insert DTO for a pending queue entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewScheduledNotification {
    pub user_id: DbId,
    pub event_id: DbId,
    pub kind: NotificationKind,
    pub scheduled_time: Timestamp,
    pub occurrence_date: NaiveDate,
}

impl NewScheduledNotification {
    pub fn from_plan(user_id: DbId, event_id: DbId, planned: &PlannedNotification) -> Self {
        Self {
            user_id,
            event_id,
            kind: planned.kind,
            scheduled_time: planned.scheduled_time,
            occurrence_date: planned.occurrence_date,
        }
    }
}

/// A pending entry whose time has come, joined with what delivery needs.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DueNotification {
    pub id: DbId,
    pub user_id: DbId,
    pub event_id: DbId,
    pub notification_type: String,
    pub scheduled_time: Timestamp,
    pub occurrence_date: NaiveDate,
    pub event_title: String,
    pub event_type: String,
    /// False when the owner switched push or browser push off. Users without
    /// a preference row get the defaults, which enable delivery.
    pub delivery_enabled: bool,
}

impl DueNotification {
    pub fn kind(&self) -> Result<NotificationKind, CoreError> {
        self.notification_type.parse()
    }
}
