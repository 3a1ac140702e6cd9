//! Handlers for the `/notifications` resource.
//!
//! All endpoints require authentication via [`AuthUser`].

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use keepdate_core::error::CoreError;
use keepdate_core::plan::{NotificationKind, ReminderPreferences};
use keepdate_core::types::DbId;
use keepdate_db::models::event::Event;
use keepdate_db::models::notification::ScheduledNotification;
use keepdate_db::models::status::NotificationStatus;
use keepdate_db::repositories::ScheduledNotificationRepo;
use keepdate_notify::{RescheduleSummary, ScheduleTarget, TickOutcome, TickReport};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Query / request / response types
// ---------------------------------------------------------------------------

/// Query parameters for `GET /notifications`.
#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    /// `pending`, `sent` or `failed`. All entries when absent.
    pub status: Option<NotificationStatus>,
}

#[derive(Debug, Serialize)]
pub struct DueCount {
    pub count: i64,
}

/// Result of an on-demand dispatch tick.
#[derive(Debug, Default, Serialize)]
pub struct ProcessResponse {
    pub processed: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
    /// True when a tick was already running and this request did nothing.
    pub already_running: bool,
}

impl From<TickReport> for ProcessResponse {
    fn from(report: TickReport) -> Self {
        Self {
            processed: report.processed,
            sent: report.sent,
            failed: report.failed,
            // Entries closed without delivery were not shown to the user either.
            skipped: report.skipped + report.suppressed,
            already_running: false,
        }
    }
}

/// Body of `POST /notifications/schedule`.
///
/// Every field is optional at the type level so a missing one is reported
/// as a 400 with its name rather than a generic body rejection.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    pub event_id: Option<DbId>,
    /// `YYYY-MM-DD` or an RFC 3339 timestamp (its UTC date is used).
    pub event_date: Option<String>,
    pub preferences: Option<serde_json::Value>,
    /// Defaults to the stored event's flag.
    pub recurring: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledEntry {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub scheduled_time: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
    pub success: bool,
    pub scheduled: usize,
    pub notifications: Vec<ScheduledEntry>,
}

#[derive(Debug, Serialize)]
pub struct ClearedCount {
    pub cleared: u64,
}

fn parse_event_date(raw: &str) -> Result<NaiveDate, AppError> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc).date_naive()))
        .map_err(|_| AppError::BadRequest(format!("Invalid eventDate '{raw}'")))
}

/// Load an event and check it belongs to `user_id`.
///
/// Someone else's event is reported as missing.
async fn owned_event(state: &AppState, user_id: DbId, event_id: DbId) -> AppResult<Event> {
    state
        .reconciler
        .directory()
        .get_event(event_id)
        .await?
        .filter(|e| e.user_id == user_id)
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Event",
            id: event_id,
        }))
}

// ---------------------------------------------------------------------------
// Queue inspection
// ---------------------------------------------------------------------------

/// GET /api/v1/notifications
///
/// List the authenticated user's queue entries, soonest first.
pub async fn list_notifications(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<NotificationQuery>,
) -> AppResult<Json<DataResponse<Vec<ScheduledNotification>>>> {
    let entries =
        ScheduledNotificationRepo::list_for_user(&state.pool, auth.user_id, params.status).await?;
    Ok(Json(DataResponse { data: entries }))
}

/// GET /api/v1/notifications/due-count
pub async fn due_count(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<DueCount>>> {
    let count = state.dispatcher.pending_due_count(Some(auth.user_id)).await?;
    Ok(Json(DataResponse {
        data: DueCount { count },
    }))
}

// ---------------------------------------------------------------------------
// Dispatch and scheduling
// ---------------------------------------------------------------------------

/// POST /api/v1/notifications/process
///
/// Run one dispatch tick now. The tick covers every due entry, not only the
/// caller's, exactly like a background tick.
pub async fn process_due(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<ProcessResponse>>> {
    let response = match state.dispatcher.tick().await? {
        TickOutcome::Completed(report) => {
            tracing::info!(
                user_id = auth.user_id,
                processed = report.processed,
                sent = report.sent,
                failed = report.failed,
                "On-demand dispatch tick finished",
            );
            ProcessResponse::from(report)
        }
        TickOutcome::AlreadyRunning => ProcessResponse {
            already_running: true,
            ..Default::default()
        },
    };
    Ok(Json(DataResponse { data: response }))
}

/// POST /api/v1/notifications/schedule
///
/// Replace the pending reminders of one event using the preferences in the
/// body. Returns the plan that was stored.
pub async fn schedule_event(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<ScheduleRequest>,
) -> AppResult<Json<ScheduleResponse>> {
    let event_id = input
        .event_id
        .ok_or_else(|| AppError::BadRequest("eventId is required".into()))?;
    let base_date = input
        .event_date
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("eventDate is required".into()))
        .and_then(parse_event_date)?;
    let prefs: ReminderPreferences = input
        .preferences
        .ok_or_else(|| AppError::BadRequest("preferences is required".into()))
        .and_then(|v| {
            serde_json::from_value(v)
                .map_err(|e| AppError::BadRequest(format!("Invalid preferences: {e}")))
        })?;
    prefs.validate()?;

    let event = owned_event(&state, auth.user_id, event_id).await?;
    let target = ScheduleTarget {
        user_id: auth.user_id,
        event_id,
        base_date,
        recurring: input.recurring.unwrap_or(event.recurring),
    };

    let outcome = state
        .reconciler
        .schedule_notifications_for_event(target, &prefs)
        .await?;

    let notifications: Vec<ScheduledEntry> = outcome
        .planned
        .iter()
        .map(|p| ScheduledEntry {
            kind: p.kind,
            scheduled_time: p.scheduled_time,
        })
        .collect();

    Ok(Json(ScheduleResponse {
        success: true,
        scheduled: notifications.len(),
        notifications,
    }))
}

/// POST /api/v1/notifications/reschedule
///
/// Rebuild the plan of every event the user owns.
pub async fn reschedule_all(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<RescheduleSummary>>> {
    let summary = state.reconciler.reschedule_all_for_user(auth.user_id).await?;
    Ok(Json(DataResponse { data: summary }))
}

/// DELETE /api/v1/notifications/events/{event_id}
///
/// Drop the event's pending reminders. Sent and failed history stays.
pub async fn clear_for_event(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(event_id): Path<DbId>,
) -> AppResult<Json<DataResponse<ClearedCount>>> {
    owned_event(&state, auth.user_id, event_id).await?;
    let cleared = state
        .reconciler
        .clear_notifications_for_event(event_id)
        .await?;
    Ok(Json(DataResponse {
        data: ClearedCount { cleared },
    }))
}
