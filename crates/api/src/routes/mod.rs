pub mod event;
pub mod health;
pub mod notification;
pub mod preferences;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /events                                  list (?upcoming_days), create
/// /events/{id}                             get, update, delete
///
/// /preferences                             get, replace (GET, PUT)
///
/// /notifications                           list queue (?status)
/// /notifications/due-count                 pending entries already due (GET)
/// /notifications/process                   run one dispatch tick (POST)
/// /notifications/schedule                  rebuild one event's plan (POST)
/// /notifications/reschedule                rebuild every event's plan (POST)
/// /notifications/events/{event_id}         clear pending for event (DELETE)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/events", event::router())
        .nest("/preferences", preferences::router())
        .nest("/notifications", notification::router())
}
