//! Repository for the `notification_preferences` table.

use sqlx::PgPool;
use keepdate_core::plan::ReminderPreferences;
use keepdate_core::types::DbId;

use crate::models::notification::NotificationPreferences;

/// Column list for `notification_preferences` queries.
const COLUMNS: &str = "id, user_id, notify_week_before, notify_day_before, notify_same_day, \
    week_before_time, day_before_time, same_day_time, push_notifications_enabled, \
    browser_push_enabled, timezone, created_at, updated_at";

/// Reads and upserts the single preference row per user.
pub struct NotificationPreferencesRepo;

impl NotificationPreferencesRepo {
    /// Get the user's preferences, or `None` if they never saved any.
    pub async fn get_for_user(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Option<NotificationPreferences>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM notification_preferences WHERE user_id = $1");
        sqlx::query_as::<_, NotificationPreferences>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Insert or replace the user's preferences.
    ///
    /// Uses `INSERT ... ON CONFLICT (user_id) DO UPDATE` so a user never has
    /// more than one row.
    pub async fn upsert(
        pool: &PgPool,
        user_id: DbId,
        prefs: &ReminderPreferences,
    ) -> Result<NotificationPreferences, sqlx::Error> {
        let query = format!(
            "INSERT INTO notification_preferences \
                (user_id, notify_week_before, notify_day_before, notify_same_day, \
                 week_before_time, day_before_time, same_day_time, \
                 push_notifications_enabled, browser_push_enabled, timezone) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (user_id) DO UPDATE SET \
                notify_week_before = EXCLUDED.notify_week_before, \
                notify_day_before = EXCLUDED.notify_day_before, \
                notify_same_day = EXCLUDED.notify_same_day, \
                week_before_time = EXCLUDED.week_before_time, \
                day_before_time = EXCLUDED.day_before_time, \
                same_day_time = EXCLUDED.same_day_time, \
                push_notifications_enabled = EXCLUDED.push_notifications_enabled, \
                browser_push_enabled = EXCLUDED.browser_push_enabled, \
                timezone = EXCLUDED.timezone, \
                updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, NotificationPreferences>(&query)
            .bind(user_id)
            .bind(prefs.notify_week_before)
            .bind(prefs.notify_day_before)
            .bind(prefs.notify_same_day)
            .bind(prefs.week_before_time.as_naive())
            .bind(prefs.day_before_time.as_naive())
            .bind(prefs.same_day_time.as_naive())
            .bind(prefs.push_notifications_enabled)
            .bind(prefs.browser_push_enabled)
            .bind(&prefs.timezone)
            .fetch_one(pool)
            .await
    }
}
