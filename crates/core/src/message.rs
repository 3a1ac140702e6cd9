//! Title and body text for reminder notifications.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::json;

use crate::plan::NotificationKind;
use crate::types::DbId;

/// Everything a notifier needs to render one reminder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationMessage {
    pub title: String,
    pub body: String,
    /// Stable per (event, kind) so a client can collapse repeats.
    pub tag: String,
    pub metadata: serde_json::Value,
}

/// Reminder fields the message is composed from.
#[derive(Debug, Clone, Copy)]
pub struct MessageContext<'a> {
    /// Queue entry id; `None` for reminders fired from local timers.
    pub notification_id: Option<DbId>,
    pub event_id: DbId,
    pub event_title: &'a str,
    pub event_type: &'a str,
    pub kind: NotificationKind,
    pub occurrence_date: NaiveDate,
}

pub fn compose(ctx: MessageContext<'_>) -> NotificationMessage {
    let MessageContext {
        notification_id,
        event_id,
        event_title,
        event_type,
        kind,
        occurrence_date,
    } = ctx;

    let (title, body) = match kind {
        NotificationKind::WeekBefore => (
            format!("Upcoming {event_type}: {event_title}"),
            format!(
                "Your {event_type} is in one week ({})",
                occurrence_date.format("%B %-d, %Y")
            ),
        ),
        NotificationKind::DayBefore => (
            format!("Tomorrow: {event_title}"),
            format!("Don't forget about your {event_type} tomorrow!"),
        ),
        NotificationKind::SameDay => (
            format!("Today: {event_title}"),
            format!("Your {event_type} is today!"),
        ),
    };

    NotificationMessage {
        title,
        body,
        tag: format!("event-{event_id}-{kind}"),
        metadata: json!({
            "notification_id": notification_id,
            "event_id": event_id,
            "notification_type": kind.as_str(),
            "occurrence_date": occurrence_date,
        }),
    }
}
