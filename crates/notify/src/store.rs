//! Queue store seam between the engine and persistence.
//!
//! Every transition out of pending is conditional on the entry still being
//! pending. `mark_sent`/`mark_failed` return `false` when another worker got
//! there first; that return value, not any in-process flag, is what keeps an
//! entry from being delivered twice.

use async_trait::async_trait;
use keepdate_core::types::{DbId, Timestamp};
use keepdate_db::models::notification::{DueNotification, NewScheduledNotification, ScheduledNotification};
use keepdate_db::repositories::ScheduledNotificationRepo;
use keepdate_db::DbPool;

use crate::error::NotifyError;

/// Result of replacing an event's pending entries.
#[derive(Debug, Clone, Default)]
pub struct ReplaceOutcome {
    pub cleared: u64,
    pub scheduled: Vec<ScheduledNotification>,
}

#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Upsert pending entries keyed by `(event_id, notification_type)`.
    async fn insert(
        &self,
        entries: &[NewScheduledNotification],
    ) -> Result<Vec<ScheduledNotification>, NotifyError>;

    /// Atomically clear an event's pending entries and insert `entries`.
    async fn replace_pending_for_event(
        &self,
        event_id: DbId,
        entries: &[NewScheduledNotification],
    ) -> Result<ReplaceOutcome, NotifyError>;

    async fn clear_pending_for_event(&self, event_id: DbId) -> Result<u64, NotifyError>;

    async fn clear_pending_for_user(&self, user_id: DbId) -> Result<u64, NotifyError>;

    /// Pending entries with `scheduled_time <= now`, oldest first.
    async fn list_due(&self, now: Timestamp, limit: i64) -> Result<Vec<DueNotification>, NotifyError>;

    async fn mark_sent(&self, id: DbId, note: Option<&str>) -> Result<bool, NotifyError>;

    async fn mark_failed(&self, id: DbId, error: &str) -> Result<bool, NotifyError>;

    async fn pending_due_count(&self, user_id: Option<DbId>, now: Timestamp) -> Result<i64, NotifyError>;
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

/// [`QueueStore`] backed by the `scheduled_notifications` table.
#[derive(Clone)]
pub struct PgQueueStore {
    pool: DbPool,
}

impl PgQueueStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueueStore for PgQueueStore {
    async fn insert(
        &self,
        entries: &[NewScheduledNotification],
    ) -> Result<Vec<ScheduledNotification>, NotifyError> {
        Ok(ScheduledNotificationRepo::upsert_pending(&self.pool, entries).await?)
    }

    async fn replace_pending_for_event(
        &self,
        event_id: DbId,
        entries: &[NewScheduledNotification],
    ) -> Result<ReplaceOutcome, NotifyError> {
        let (cleared, scheduled) =
            ScheduledNotificationRepo::replace_pending_for_event(&self.pool, event_id, entries).await?;
        Ok(ReplaceOutcome { cleared, scheduled })
    }

    async fn clear_pending_for_event(&self, event_id: DbId) -> Result<u64, NotifyError> {
        Ok(ScheduledNotificationRepo::delete_pending_for_event(&self.pool, event_id).await?)
    }

    async fn clear_pending_for_user(&self, user_id: DbId) -> Result<u64, NotifyError> {
        Ok(ScheduledNotificationRepo::delete_pending_for_user(&self.pool, user_id).await?)
    }

    async fn list_due(&self, now: Timestamp, limit: i64) -> Result<Vec<DueNotification>, NotifyError> {
        Ok(ScheduledNotificationRepo::list_due(&self.pool, now, limit).await?)
    }

    async fn mark_sent(&self, id: DbId, note: Option<&str>) -> Result<bool, NotifyError> {
        Ok(ScheduledNotificationRepo::mark_sent(&self.pool, id, note).await?)
    }

    async fn mark_failed(&self, id: DbId, error: &str) -> Result<bool, NotifyError> {
        Ok(ScheduledNotificationRepo::mark_failed(&self.pool, id, error).await?)
    }

    async fn pending_due_count(&self, user_id: Option<DbId>, now: Timestamp) -> Result<i64, NotifyError> {
        Ok(ScheduledNotificationRepo::pending_due_count(&self.pool, user_id, now).await?)
    }
}
