//! Repository for the `events` table.
//!
//! Every query is scoped by `user_id` except [`EventRepo::find_by_id`], which
//! the scheduler uses when it only has an event id.

use sqlx::PgPool;
use keepdate_core::types::DbId;

use crate::models::event::{CreateEvent, Event, UpdateEvent};
use crate::models::status::NotificationStatus;

/// Column list for `events` queries.
const COLUMNS: &str =
    "id, user_id, title, event_date, event_type, recurring, description, created_at, updated_at";

/// Provides CRUD operations for events.
pub struct EventRepo;

impl EventRepo {
    /// Insert a new event, returning the created row.
    pub async fn create(
        pool: &PgPool,
        user_id: DbId,
        input: &CreateEvent,
    ) -> Result<Event, sqlx::Error> {
        let query = format!(
            "INSERT INTO events (user_id, title, event_date, event_type, recurring, description) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Event>(&query)
            .bind(user_id)
            .bind(input.title.trim())
            .bind(input.event_date)
            .bind(input.event_type.as_str())
            .bind(input.recurring)
            .bind(&input.description)
            .fetch_one(pool)
            .await
    }

    /// Find an event by ID regardless of owner.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Event>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM events WHERE id = $1");
        sqlx::query_as::<_, Event>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find an event owned by `user_id`.
    pub async fn find_for_user(
        pool: &PgPool,
        user_id: DbId,
        id: DbId,
    ) -> Result<Option<Event>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM events WHERE id = $1 AND user_id = $2");
        sqlx::query_as::<_, Event>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// List a user's events ordered by base date.
    pub async fn list_for_user(pool: &PgPool, user_id: DbId) -> Result<Vec<Event>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM events WHERE user_id = $1 ORDER BY event_date, id"
        );
        sqlx::query_as::<_, Event>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Recurring events, across all users, that have no pending queue entry.
    ///
    /// These are the events whose current occurrence has been fully handled
    /// and that still need next year's reminders planned.
    pub async fn list_recurring_without_pending(pool: &PgPool) -> Result<Vec<Event>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM events e \
             WHERE e.recurring \
               AND NOT EXISTS ( \
                   SELECT 1 FROM scheduled_notifications n \
                   WHERE n.event_id = e.id AND n.status_id = $1) \
             ORDER BY e.id"
        );
        sqlx::query_as::<_, Event>(&query)
            .bind(NotificationStatus::Pending.id())
            .fetch_all(pool)
            .await
    }

    /// Apply a patch. Only non-`None` fields are updated.
    ///
    /// Returns `None` if the event does not exist or belongs to someone else.
    pub async fn update(
        pool: &PgPool,
        user_id: DbId,
        id: DbId,
        input: &UpdateEvent,
    ) -> Result<Option<Event>, sqlx::Error> {
        let query = format!(
            "UPDATE events SET \
                title = COALESCE($3, title), \
                event_date = COALESCE($4, event_date), \
                event_type = COALESCE($5, event_type), \
                recurring = COALESCE($6, recurring), \
                description = COALESCE($7, description), \
                updated_at = NOW() \
             WHERE id = $1 AND user_id = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Event>(&query)
            .bind(id)
            .bind(user_id)
            .bind(input.title.as_deref().map(str::trim))
            .bind(input.event_date)
            .bind(input.event_type.map(|t| t.as_str()))
            .bind(input.recurring)
            .bind(&input.description)
            .fetch_optional(pool)
            .await
    }

    /// Delete an event. Queue entries go with it via `ON DELETE CASCADE`.
    ///
    /// Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, user_id: DbId, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
