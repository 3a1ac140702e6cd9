//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that accept
//! `&PgPool` as the first argument.

pub mod event_repo;
pub mod notification_preferences_repo;
pub mod scheduled_notification_repo;

pub use event_repo::EventRepo;
pub use notification_preferences_repo::NotificationPreferencesRepo;
pub use scheduled_notification_repo::ScheduledNotificationRepo;
