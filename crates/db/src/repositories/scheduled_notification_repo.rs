//! Repository for the `scheduled_notifications` queue.
//!
//! Pending rows are unique per `(event_id, notification_type)` through the
//! partial index `uq_scheduled_notifications_pending`. Inserts are upserts on
//! that key, and every status change is gated on the row still being pending,
//! so a second writer racing on the same entry changes nothing.

use chrono::NaiveDate;
use sqlx::{PgConnection, PgPool};
use keepdate_core::types::{DbId, Timestamp};

use crate::models::notification::{DueNotification, NewScheduledNotification, ScheduledNotification};
use crate::models::status::NotificationStatus;

/// Column list for `scheduled_notifications` queries.
const COLUMNS: &str = "id, user_id, event_id, notification_type, scheduled_time, \
    occurrence_date, status_id, sent_at, error_message, note, created_at";

/// Queue operations used by the reconciler and the dispatcher.
pub struct ScheduledNotificationRepo;

impl ScheduledNotificationRepo {
    /// Upsert a batch of pending entries in one statement.
    ///
    /// An existing pending row for the same `(event_id, notification_type)`
    /// takes the new time instead of gaining a sibling.
    pub async fn upsert_pending(
        pool: &PgPool,
        entries: &[NewScheduledNotification],
    ) -> Result<Vec<ScheduledNotification>, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        Self::upsert_pending_on(&mut conn, entries).await
    }

    /// Delete pending entries for one event, returning how many went.
    ///
    /// Sent and failed rows are history and stay.
    pub async fn delete_pending_for_event(pool: &PgPool, event_id: DbId) -> Result<u64, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        Self::delete_pending_for_event_on(&mut conn, event_id).await
    }

    /// Delete every pending entry a user owns.
    pub async fn delete_pending_for_user(pool: &PgPool, user_id: DbId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM scheduled_notifications WHERE user_id = $1 AND status_id = $2",
        )
        .bind(user_id)
        .bind(NotificationStatus::Pending.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Clear and rebuild an event's pending entries in one transaction.
    ///
    /// Returns the number of cleared rows and the rows now pending.
    pub async fn replace_pending_for_event(
        pool: &PgPool,
        event_id: DbId,
        entries: &[NewScheduledNotification],
    ) -> Result<(u64, Vec<ScheduledNotification>), sqlx::Error> {
        let mut tx = pool.begin().await?;

        let cleared = Self::delete_pending_for_event_on(&mut tx, event_id).await?;
        let inserted = Self::upsert_pending_on(&mut tx, entries).await?;

        tx.commit().await?;
        Ok((cleared, inserted))
    }

    /// Pending entries with `scheduled_time <= now`, oldest first.
    ///
    /// Joined with the event (title, type) and the owner's delivery switch.
    pub async fn list_due(
        pool: &PgPool,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<DueNotification>, sqlx::Error> {
        sqlx::query_as::<_, DueNotification>(
            "SELECT n.id, n.user_id, n.event_id, n.notification_type, n.scheduled_time, \
                    n.occurrence_date, e.title AS event_title, e.event_type, \
                    COALESCE(p.push_notifications_enabled AND p.browser_push_enabled, true) \
                        AS delivery_enabled \
             FROM scheduled_notifications n \
             JOIN events e ON e.id = n.event_id \
             LEFT JOIN notification_preferences p ON p.user_id = n.user_id \
             WHERE n.status_id = $1 AND n.scheduled_time <= $2 \
             ORDER BY n.scheduled_time, n.id \
             LIMIT $3",
        )
        .bind(NotificationStatus::Pending.id())
        .bind(now)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Transition pending -> sent. `note` records why nothing was delivered.
    ///
    /// Returns `false` if the entry was no longer pending.
    pub async fn mark_sent(pool: &PgPool, id: DbId, note: Option<&str>) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE scheduled_notifications SET status_id = $2, sent_at = NOW(), note = $3 \
             WHERE id = $1 AND status_id = $4",
        )
        .bind(id)
        .bind(NotificationStatus::Sent.id())
        .bind(note)
        .bind(NotificationStatus::Pending.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Transition pending -> failed, recording the delivery error.
    ///
    /// Returns `false` if the entry was no longer pending.
    pub async fn mark_failed(pool: &PgPool, id: DbId, error: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE scheduled_notifications SET status_id = $2, error_message = $3 \
             WHERE id = $1 AND status_id = $4",
        )
        .bind(id)
        .bind(NotificationStatus::Failed.id())
        .bind(error)
        .bind(NotificationStatus::Pending.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Count pending entries already due, optionally for one user.
    pub async fn pending_due_count(
        pool: &PgPool,
        user_id: Option<DbId>,
        now: Timestamp,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM scheduled_notifications \
             WHERE status_id = $1 AND scheduled_time <= $2 \
               AND ($3::BIGINT IS NULL OR user_id = $3)",
        )
        .bind(NotificationStatus::Pending.id())
        .bind(now)
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    /// A user's queue, optionally filtered by status, soonest first.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: DbId,
        status: Option<NotificationStatus>,
    ) -> Result<Vec<ScheduledNotification>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM scheduled_notifications \
             WHERE user_id = $1 AND ($2::SMALLINT IS NULL OR status_id = $2) \
             ORDER BY scheduled_time, id"
        );
        sqlx::query_as::<_, ScheduledNotification>(&query)
            .bind(user_id)
            .bind(status.map(NotificationStatus::id))
            .fetch_all(pool)
            .await
    }

    /// Pending entries for one event, soonest first.
    pub async fn list_pending_for_event(
        pool: &PgPool,
        event_id: DbId,
    ) -> Result<Vec<ScheduledNotification>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM scheduled_notifications \
             WHERE event_id = $1 AND status_id = $2 \
             ORDER BY scheduled_time"
        );
        sqlx::query_as::<_, ScheduledNotification>(&query)
            .bind(event_id)
            .bind(NotificationStatus::Pending.id())
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<ScheduledNotification>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM scheduled_notifications WHERE id = $1");
        sqlx::query_as::<_, ScheduledNotification>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // Connection-level helpers shared by the pool and transaction paths
    // -----------------------------------------------------------------------

    async fn upsert_pending_on(
        conn: &mut PgConnection,
        entries: &[NewScheduledNotification],
    ) -> Result<Vec<ScheduledNotification>, sqlx::Error> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let user_ids: Vec<DbId> = entries.iter().map(|e| e.user_id).collect();
        let event_ids: Vec<DbId> = entries.iter().map(|e| e.event_id).collect();
        let kinds: Vec<&str> = entries.iter().map(|e| e.kind.as_str()).collect();
        let times: Vec<Timestamp> = entries.iter().map(|e| e.scheduled_time).collect();
        let dates: Vec<NaiveDate> = entries.iter().map(|e| e.occurrence_date).collect();

        let query = format!(
            "INSERT INTO scheduled_notifications \
                (user_id, event_id, notification_type, scheduled_time, occurrence_date) \
             SELECT * FROM UNNEST($1::BIGINT[], $2::BIGINT[], $3::TEXT[], \
                                  $4::TIMESTAMPTZ[], $5::DATE[]) \
             ON CONFLICT (event_id, notification_type) WHERE status_id = 1 DO UPDATE SET \
                user_id = EXCLUDED.user_id, \
                scheduled_time = EXCLUDED.scheduled_time, \
                occurrence_date = EXCLUDED.occurrence_date \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ScheduledNotification>(&query)
            .bind(&user_ids)
            .bind(&event_ids)
            .bind(&kinds)
            .bind(&times)
            .bind(&dates)
            .fetch_all(&mut *conn)
            .await
    }

    async fn delete_pending_for_event_on(
        conn: &mut PgConnection,
        event_id: DbId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM scheduled_notifications WHERE event_id = $1 AND status_id = $2",
        )
        .bind(event_id)
        .bind(NotificationStatus::Pending.id())
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }
}
