//! Route definitions for the `/notifications` resource.
//!
//! All endpoints require authentication.

use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers::notification;
use crate::state::AppState;

/// Routes mounted at `/notifications`.
///
/// ```text
/// GET    /                     -> list_notifications
/// GET    /due-count            -> due_count
/// POST   /process              -> process_due
/// POST   /schedule             -> schedule_event
/// POST   /reschedule           -> reschedule_all
/// DELETE /events/{event_id}    -> clear_for_event
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(notification::list_notifications))
        .route("/due-count", get(notification::due_count))
        .route("/process", post(notification::process_due))
        .route("/schedule", post(notification::schedule_event))
        .route("/reschedule", post(notification::reschedule_all))
        .route("/events/{event_id}", delete(notification::clear_for_event))
}
