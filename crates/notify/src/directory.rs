//! Read access to events and preferences owned by other parts of the system.

use async_trait::async_trait;
use keepdate_core::plan::ReminderPreferences;
use keepdate_core::types::DbId;
use keepdate_db::models::event::Event;
use keepdate_db::repositories::{EventRepo, NotificationPreferencesRepo};
use keepdate_db::DbPool;

use crate::error::NotifyError;

#[async_trait]
pub trait EventDirectory: Send + Sync {
    async fn get_event(&self, event_id: DbId) -> Result<Option<Event>, NotifyError>;

    async fn list_events_for_user(&self, user_id: DbId) -> Result<Vec<Event>, NotifyError>;

    /// Recurring events of every user with nothing pending in the queue.
    async fn recurring_events_without_pending(&self) -> Result<Vec<Event>, NotifyError>;

    /// The user's saved preferences, or `None` if they never saved any.
    async fn preferences_for_user(
        &self,
        user_id: DbId,
    ) -> Result<Option<ReminderPreferences>, NotifyError>;
}

/// [`EventDirectory`] over the `events` and `notification_preferences` tables.
#[derive(Clone)]
pub struct PgEventDirectory {
    pool: DbPool,
}

impl PgEventDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventDirectory for PgEventDirectory {
    async fn get_event(&self, event_id: DbId) -> Result<Option<Event>, NotifyError> {
        Ok(EventRepo::find_by_id(&self.pool, event_id).await?)
    }

    async fn list_events_for_user(&self, user_id: DbId) -> Result<Vec<Event>, NotifyError> {
        Ok(EventRepo::list_for_user(&self.pool, user_id).await?)
    }

    async fn recurring_events_without_pending(&self) -> Result<Vec<Event>, NotifyError> {
        Ok(EventRepo::list_recurring_without_pending(&self.pool).await?)
    }

    async fn preferences_for_user(
        &self,
        user_id: DbId,
    ) -> Result<Option<ReminderPreferences>, NotifyError> {
        let row = NotificationPreferencesRepo::get_for_user(&self.pool, user_id).await?;
        Ok(row.map(|p| p.to_reminder_preferences()))
    }
}
