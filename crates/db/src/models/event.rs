//! Event entity model and DTOs.

use chrono::NaiveDate;
use keepdate_core::event_type::EventType;
use keepdate_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::{Validate, ValidationError};

/// A row from the `events` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Event {
    pub id: DbId,
    pub user_id: DbId,
    pub title: String,
    /// Base occurrence; recurring events repeat on its month/day.
    #[serde(rename = "date")]
    pub event_date: NaiveDate,
    #[serde(rename = "type")]
    pub event_type: String,
    pub recurring: bool,
    pub description: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a new event.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateEvent {
    #[validate(length(min = 1, max = 200), custom(function = "not_blank"))]
    pub title: String,
    #[serde(rename = "date")]
    pub event_date: NaiveDate,
    #[serde(rename = "type", default = "default_event_type")]
    pub event_type: EventType,
    #[serde(default)]
    pub recurring: bool,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
}

/// DTO for patching an event. All fields optional.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateEvent {
    #[validate(length(min = 1, max = 200), custom(function = "not_blank"))]
    pub title: Option<String>,
    #[serde(rename = "date")]
    pub event_date: Option<NaiveDate>,
    #[serde(rename = "type")]
    pub event_type: Option<EventType>,
    pub recurring: Option<bool>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
}

impl UpdateEvent {
    /// Whether applying this patch to `current` moves any reminder.
    ///
    /// Only the date and the recurring flag feed the plan.
    pub fn changes_schedule(&self, current: &Event) -> bool {
        self.event_date.is_some_and(|d| d != current.event_date)
            || self.recurring.is_some_and(|r| r != current.recurring)
    }
}

fn default_event_type() -> EventType {
    EventType::Other
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn event() -> Event {
        Event {
            id: 1,
            user_id: 1,
            title: "Wedding anniversary".into(),
            event_date: NaiveDate::from_ymd_opt(2015, 9, 12).unwrap(),
            event_type: "anniversary".into(),
            recurring: true,
            description: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn title_only_patch_keeps_schedule() {
        let patch = UpdateEvent {
            title: Some("Our anniversary".into()),
            ..Default::default()
        };
        assert!(!patch.changes_schedule(&event()));
    }

    #[test]
    fn same_values_keep_schedule() {
        let patch = UpdateEvent {
            event_date: Some(NaiveDate::from_ymd_opt(2015, 9, 12).unwrap()),
            recurring: Some(true),
            ..Default::default()
        };
        assert!(!patch.changes_schedule(&event()));
    }

    #[test]
    fn date_or_recurring_change_moves_schedule() {
        let date_patch = UpdateEvent {
            event_date: Some(NaiveDate::from_ymd_opt(2015, 9, 13).unwrap()),
            ..Default::default()
        };
        let recurring_patch = UpdateEvent {
            recurring: Some(false),
            ..Default::default()
        };
        assert!(date_patch.changes_schedule(&event()));
        assert!(recurring_patch.changes_schedule(&event()));
    }

    #[test]
    fn create_dto_uses_wire_names_and_defaults() {
        let dto: CreateEvent =
            serde_json::from_str(r#"{"title": "Party", "date": "2025-12-31"}"#).unwrap();
        assert_eq!(dto.event_type, EventType::Other);
        assert!(!dto.recurring);
        assert!(dto.validate().is_ok());
    }

    #[test]
    fn blank_title_fails_validation() {
        let dto: CreateEvent =
            serde_json::from_str(r#"{"title": "   ", "date": "2025-12-31"}"#).unwrap();
        assert!(dto.validate().is_err());
    }
}
