//! Handlers for the `/events` resource.
//!
//! Events are scoped to the authenticated user. Every mutation is followed by
//! the matching reconciler hook. A scheduling failure does not fail the
//! request, since the event itself was saved; create and update report it
//! through `reminders_synced` so the client can surface it.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use keepdate_core::error::CoreError;
use keepdate_core::recurrence::{days_until, occurrence_date};
use keepdate_core::types::DbId;
use keepdate_core::upcoming::within_window;
use keepdate_db::models::event::{CreateEvent, Event, UpdateEvent};
use keepdate_db::repositories::EventRepo;
use keepdate_notify::ScheduleOutcome;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Largest accepted `upcoming_days` window.
const MAX_UPCOMING_DAYS: i64 = 366;

/// Query parameters for `GET /events`.
#[derive(Debug, Deserialize)]
pub struct EventListQuery {
    /// Only return events occurring within this many days, soonest first.
    pub upcoming_days: Option<i64>,
}

/// An event with its next occurrence as seen from the user's today.
#[derive(Debug, Serialize)]
pub struct EventView {
    #[serde(flatten)]
    pub event: Event,
    pub next_occurrence: NaiveDate,
    pub days_until: i64,
}

/// A created or edited event and what happened to its reminders.
#[derive(Debug, Serialize)]
pub struct SavedEvent {
    #[serde(flatten)]
    pub event: Event,
    /// `false` when rebuilding the reminders failed. The event is saved
    /// either way.
    pub reminders_synced: bool,
    /// The rebuilt plan. `null` on failure, or after an edit that did not
    /// touch the date or the recurring flag.
    pub reminders: Option<ScheduleOutcome>,
}

impl SavedEvent {
    fn scheduling_failed(event: Event) -> Self {
        Self {
            event,
            reminders_synced: false,
            reminders: None,
        }
    }
}

fn not_found(id: DbId) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "Event",
        id,
    })
}

/// GET /api/v1/events
///
/// Without `upcoming_days` all events are returned in base-date order.
pub async fn list(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<EventListQuery>,
) -> AppResult<Json<DataResponse<Vec<EventView>>>> {
    if let Some(days) = params.upcoming_days {
        if !(0..=MAX_UPCOMING_DAYS).contains(&days) {
            return Err(AppError::BadRequest(format!(
                "upcoming_days must be between 0 and {MAX_UPCOMING_DAYS}"
            )));
        }
    }

    let events = EventRepo::list_for_user(&state.pool, auth.user_id).await?;
    let tz = state
        .reconciler
        .effective_preferences(auth.user_id)
        .await?
        .tz()?;
    let now = state.reconciler.now().with_timezone(&tz);

    let views = match params.upcoming_days {
        Some(window) => within_window(events, window, &now, |e| (e.event_date, e.recurring))
            .into_iter()
            .map(|u| EventView {
                event: u.item,
                next_occurrence: u.next_occurrence,
                days_until: u.days_until,
            })
            .collect(),
        None => {
            let today = now.date_naive();
            events
                .into_iter()
                .map(|event| EventView {
                    next_occurrence: occurrence_date(event.event_date, event.recurring, today),
                    days_until: days_until(event.event_date, event.recurring, &now),
                    event,
                })
                .collect()
        }
    };

    Ok(Json(DataResponse { data: views }))
}

/// POST /api/v1/events
pub async fn create(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<CreateEvent>,
) -> AppResult<(StatusCode, Json<DataResponse<SavedEvent>>)> {
    input.validate()?;
    let event = EventRepo::create(&state.pool, auth.user_id, &input).await?;

    tracing::info!(event_id = event.id, user_id = auth.user_id, "Event created");

    let saved = match state.reconciler.on_event_created(&event, None).await {
        Ok(outcome) => SavedEvent {
            event,
            reminders_synced: true,
            reminders: Some(outcome),
        },
        Err(e) => {
            tracing::warn!(event_id = event.id, error = %e, "Failed to schedule reminders for new event");
            SavedEvent::scheduling_failed(event)
        }
    };

    Ok((StatusCode::CREATED, Json(DataResponse { data: saved })))
}

/// GET /api/v1/events/{id}
pub async fn get_by_id(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Event>>> {
    let event = EventRepo::find_for_user(&state.pool, auth.user_id, id)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(DataResponse { data: event }))
}

/// PUT /api/v1/events/{id}
///
/// Reminders are rebuilt only when the date or the recurring flag changed.
pub async fn update(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateEvent>,
) -> AppResult<Json<DataResponse<SavedEvent>>> {
    input.validate()?;

    let before = EventRepo::find_for_user(&state.pool, auth.user_id, id)
        .await?
        .ok_or_else(|| not_found(id))?;
    let after = EventRepo::update(&state.pool, auth.user_id, id, &input)
        .await?
        .ok_or_else(|| not_found(id))?;

    let saved = match state.reconciler.on_event_updated(&before, &after).await {
        Ok(reminders) => {
            if let Some(outcome) = &reminders {
                tracing::debug!(
                    event_id = id,
                    scheduled = outcome.planned.len(),
                    "Reminders rebuilt after edit",
                );
            }
            SavedEvent {
                event: after,
                reminders_synced: true,
                reminders,
            }
        }
        Err(e) => {
            tracing::warn!(event_id = id, error = %e, "Failed to reschedule edited event");
            SavedEvent::scheduling_failed(after)
        }
    };

    Ok(Json(DataResponse { data: saved }))
}

/// DELETE /api/v1/events/{id}
pub async fn delete(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    EventRepo::find_for_user(&state.pool, auth.user_id, id)
        .await?
        .ok_or_else(|| not_found(id))?;

    // Queue rows also go with the event through the FK cascade, so a failed
    // clear here leaves nothing behind once the delete succeeds.
    if let Err(e) = state.reconciler.on_event_deleted(id).await {
        tracing::warn!(event_id = id, error = %e, "Failed to clear reminders of deleted event");
    }

    if EventRepo::delete(&state.pool, auth.user_id, id).await? {
        tracing::info!(event_id = id, user_id = auth.user_id, "Event deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(id))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn event() -> Event {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        Event {
            id: 3,
            user_id: 1,
            title: "Mum".into(),
            event_date: NaiveDate::from_ymd_opt(1960, 3, 10).unwrap(),
            event_type: "birthday".into(),
            recurring: true,
            description: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn scheduling_failure_is_visible_in_the_body() {
        let json = serde_json::to_value(SavedEvent::scheduling_failed(event())).unwrap();

        assert_eq!(json["id"], 3);
        assert_eq!(json["title"], "Mum");
        assert_eq!(json["reminders_synced"], false);
        assert!(json["reminders"].is_null());
    }

    #[test]
    fn successful_schedule_carries_the_plan() {
        let saved = SavedEvent {
            event: event(),
            reminders_synced: true,
            reminders: Some(ScheduleOutcome {
                event_id: 3,
                occurrence_date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
                cleared: 0,
                planned: Vec::new(),
            }),
        };
        let json = serde_json::to_value(saved).unwrap();

        assert_eq!(json["reminders_synced"], true);
        assert_eq!(json["reminders"]["occurrence_date"], "2025-03-10");
    }
}
