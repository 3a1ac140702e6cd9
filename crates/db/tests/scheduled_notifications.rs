//! Queue repository tests against a real Postgres.
//!
//! Run with `DATABASE_URL` pointing at a server the test user may create
//! databases on, then `cargo test -p keepdate-db -- --ignored`.

use chrono::{Duration, NaiveDate, Utc};
use keepdate_core::event_type::EventType;
use keepdate_core::plan::{NotificationKind, ReminderPreferences};
use keepdate_db::models::event::CreateEvent;
use keepdate_db::models::notification::NewScheduledNotification;
use keepdate_db::models::status::NotificationStatus;
use keepdate_db::repositories::{EventRepo, NotificationPreferencesRepo, ScheduledNotificationRepo};
use sqlx::PgPool;

const USER: i64 = 42;

async fn seed_event(pool: &PgPool) -> i64 {
    let input = CreateEvent {
        title: "Grandpa's birthday".into(),
        event_date: NaiveDate::from_ymd_opt(1950, 8, 1).unwrap(),
        event_type: EventType::Birthday,
        recurring: true,
        description: None,
    };
    EventRepo::create(pool, USER, &input).await.unwrap().id
}

fn entry(event_id: i64, kind: NotificationKind, offset: Duration) -> NewScheduledNotification {
    NewScheduledNotification {
        user_id: USER,
        event_id,
        kind,
        scheduled_time: Utc::now() + offset,
        occurrence_date: NaiveDate::from_ymd_opt(2030, 8, 1).unwrap(),
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn upsert_keeps_one_pending_row_per_kind(pool: PgPool) {
    let event_id = seed_event(&pool).await;

    let first = entry(event_id, NotificationKind::DayBefore, Duration::hours(5));
    let second = entry(event_id, NotificationKind::DayBefore, Duration::hours(9));

    ScheduledNotificationRepo::upsert_pending(&pool, &[first]).await.unwrap();
    ScheduledNotificationRepo::upsert_pending(&pool, &[second.clone()]).await.unwrap();

    let pending = ScheduledNotificationRepo::list_pending_for_event(&pool, event_id)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(
        pending[0].scheduled_time.timestamp(),
        second.scheduled_time.timestamp()
    );
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn replace_clears_pending_but_keeps_history(pool: PgPool) {
    let event_id = seed_event(&pool).await;

    let rows = ScheduledNotificationRepo::upsert_pending(
        &pool,
        &[
            entry(event_id, NotificationKind::DayBefore, Duration::hours(-1)),
            entry(event_id, NotificationKind::SameDay, Duration::hours(3)),
        ],
    )
    .await
    .unwrap();
    let sent_id = rows
        .iter()
        .find(|r| r.notification_type == "day_before")
        .unwrap()
        .id;
    assert!(ScheduledNotificationRepo::mark_sent(&pool, sent_id, None).await.unwrap());

    let (cleared, inserted) = ScheduledNotificationRepo::replace_pending_for_event(
        &pool,
        event_id,
        &[entry(event_id, NotificationKind::WeekBefore, Duration::days(2))],
    )
    .await
    .unwrap();

    assert_eq!(cleared, 1);
    assert_eq!(inserted.len(), 1);

    let history = ScheduledNotificationRepo::list_for_user(&pool, USER, Some(NotificationStatus::Sent))
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, sent_id);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn status_changes_only_apply_to_pending_rows(pool: PgPool) {
    let event_id = seed_event(&pool).await;
    let rows = ScheduledNotificationRepo::upsert_pending(
        &pool,
        &[entry(event_id, NotificationKind::SameDay, Duration::minutes(-5))],
    )
    .await
    .unwrap();
    let id = rows[0].id;

    assert!(ScheduledNotificationRepo::mark_failed(&pool, id, "gateway timeout").await.unwrap());
    assert!(!ScheduledNotificationRepo::mark_sent(&pool, id, None).await.unwrap());
    assert!(!ScheduledNotificationRepo::mark_failed(&pool, id, "again").await.unwrap());

    let row = ScheduledNotificationRepo::find_by_id(&pool, id).await.unwrap().unwrap();
    assert_eq!(row.status(), Some(NotificationStatus::Failed));
    assert_eq!(row.error_message.as_deref(), Some("gateway timeout"));
    assert!(row.sent_at.is_none());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn due_listing_joins_event_and_delivery_switch(pool: PgPool) {
    let event_id = seed_event(&pool).await;
    ScheduledNotificationRepo::upsert_pending(
        &pool,
        &[
            entry(event_id, NotificationKind::DayBefore, Duration::minutes(-1)),
            entry(event_id, NotificationKind::SameDay, Duration::hours(1)),
        ],
    )
    .await
    .unwrap();

    let due = ScheduledNotificationRepo::list_due(&pool, Utc::now(), 100).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].event_title, "Grandpa's birthday");
    assert_eq!(due[0].event_type, "birthday");
    assert!(due[0].delivery_enabled, "no preference row means defaults");

    let prefs = ReminderPreferences {
        push_notifications_enabled: false,
        ..Default::default()
    };
    NotificationPreferencesRepo::upsert(&pool, USER, &prefs).await.unwrap();

    let due = ScheduledNotificationRepo::list_due(&pool, Utc::now(), 100).await.unwrap();
    assert!(!due[0].delivery_enabled);

    let count = ScheduledNotificationRepo::pending_due_count(&pool, Some(USER), Utc::now())
        .await
        .unwrap();
    assert_eq!(count, 1);
    let other = ScheduledNotificationRepo::pending_due_count(&pool, Some(USER + 1), Utc::now())
        .await
        .unwrap();
    assert_eq!(other, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn recurring_events_without_pending_rows_are_listed(pool: PgPool) {
    let recurring = seed_event(&pool).await;
    let one_off = EventRepo::create(
        &pool,
        USER,
        &CreateEvent {
            title: "Dentist".into(),
            event_date: NaiveDate::from_ymd_opt(2030, 1, 15).unwrap(),
            event_type: EventType::Other,
            recurring: false,
            description: None,
        },
    )
    .await
    .unwrap()
    .id;

    let rows = ScheduledNotificationRepo::upsert_pending(
        &pool,
        &[entry(recurring, NotificationKind::DayBefore, Duration::minutes(-1))],
    )
    .await
    .unwrap();
    assert!(EventRepo::list_recurring_without_pending(&pool).await.unwrap().is_empty());

    ScheduledNotificationRepo::mark_sent(&pool, rows[0].id, None).await.unwrap();
    let listed = EventRepo::list_recurring_without_pending(&pool).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, recurring);
    assert!(listed.iter().all(|e| e.id != one_off));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn deleting_event_cascades_to_queue(pool: PgPool) {
    let event_id = seed_event(&pool).await;
    ScheduledNotificationRepo::upsert_pending(
        &pool,
        &[entry(event_id, NotificationKind::DayBefore, Duration::hours(1))],
    )
    .await
    .unwrap();

    assert!(EventRepo::delete(&pool, USER, event_id).await.unwrap());
    let rows = ScheduledNotificationRepo::list_for_user(&pool, USER, None).await.unwrap();
    assert!(rows.is_empty());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn preferences_upsert_keeps_single_row(pool: PgPool) {
    let mut prefs = ReminderPreferences::default();
    NotificationPreferencesRepo::upsert(&pool, USER, &prefs).await.unwrap();

    prefs.timezone = "Europe/Berlin".into();
    prefs.notify_same_day = true;
    let saved = NotificationPreferencesRepo::upsert(&pool, USER, &prefs).await.unwrap();

    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM notification_preferences WHERE user_id = $1")
            .bind(USER)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(count, 1);
    assert_eq!(saved.to_reminder_preferences(), prefs);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn bootstrap_seeds_statuses(pool: PgPool) {
    keepdate_db::health_check(&pool).await.unwrap();

    let names: Vec<String> =
        sqlx::query_scalar("SELECT name FROM notification_statuses ORDER BY id")
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(names, vec!["pending", "sent", "failed"]);
}
