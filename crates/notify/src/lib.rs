//! Reminder scheduling and delivery engine.
//!
//! - [`Reconciler`] keeps the pending queue in step with events and
//!   preferences.
//! - [`Dispatcher`] polls for due entries and hands them to a [`Notifier`].
//! - [`LocalScheduler`] is the queue-less variant that fires reminders from
//!   in-process timers.
//!
//! Storage is reached through the [`QueueStore`] and [`EventDirectory`]
//! traits, implemented for Postgres and in memory.

pub mod clock;
pub mod config;
pub mod delivery;
pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod local;
pub mod memory;
pub mod reconciler;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::DispatcherConfig;
pub use delivery::{build_notifier, DeliveryConfig, DeliveryError, LogNotifier, Notifier, WebhookNotifier};
pub use directory::{EventDirectory, PgEventDirectory};
pub use dispatcher::{Dispatcher, TickOutcome, TickReport};
pub use error::NotifyError;
pub use local::{LocalScheduler, ReminderKey};
pub use memory::MemoryBackend;
pub use reconciler::{Reconciler, RescheduleSummary, ScheduleOutcome, ScheduleTarget};
pub use store::{PgQueueStore, QueueStore, ReplaceOutcome};
