//! Handlers for the `/preferences` resource.

use axum::extract::State;
use axum::Json;
use keepdate_core::plan::ReminderPreferences;
use keepdate_db::repositories::NotificationPreferencesRepo;
use keepdate_notify::RescheduleSummary;
use serde::Serialize;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Saved preferences plus the result of the rescan they triggered.
#[derive(Debug, Serialize)]
pub struct SavedPreferences {
    pub preferences: ReminderPreferences,
    /// `None` when the rescan failed; pending entries then keep the old plan
    /// until the next edit.
    pub rescheduled: Option<RescheduleSummary>,
}

/// GET /api/v1/preferences
///
/// Users who never saved preferences get the defaults.
pub async fn get(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<ReminderPreferences>>> {
    let prefs = state.reconciler.effective_preferences(auth.user_id).await?;
    Ok(Json(DataResponse { data: prefs }))
}

/// PUT /api/v1/preferences
///
/// Missing fields take their default values. Saving rebuilds the plan of
/// every event the user owns.
pub async fn replace(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<ReminderPreferences>,
) -> AppResult<Json<DataResponse<SavedPreferences>>> {
    input.validate()?;

    let row = NotificationPreferencesRepo::upsert(&state.pool, auth.user_id, &input).await?;
    tracing::info!(user_id = auth.user_id, timezone = %row.timezone, "Reminder preferences saved");

    let rescheduled = match state.reconciler.reschedule_all_for_user(auth.user_id).await {
        Ok(summary) => Some(summary),
        Err(e) => {
            tracing::warn!(user_id = auth.user_id, error = %e, "Rescan after preference change failed");
            None
        }
    };

    Ok(Json(DataResponse {
        data: SavedPreferences {
            preferences: row.to_reminder_preferences(),
            rescheduled,
        },
    }))
}
