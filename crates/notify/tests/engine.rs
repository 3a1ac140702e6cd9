//! End-to-end flow over the in-memory backend: plan, dispatch, edit, rescan.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use keepdate_core::event_type::EventType;
use keepdate_core::message::NotificationMessage;
use keepdate_core::plan::ReminderPreferences;
use keepdate_core::status::{STATUS_FAILED, STATUS_PENDING, STATUS_SENT};
use keepdate_notify::{
    DeliveryError, Dispatcher, DispatcherConfig, FixedClock, MemoryBackend, Notifier, Reconciler,
    TickOutcome, TickReport,
};

#[derive(Default)]
struct Inbox {
    titles: Mutex<Vec<String>>,
    reject: Mutex<bool>,
}

#[async_trait]
impl Notifier for Inbox {
    fn name(&self) -> &'static str {
        "inbox"
    }

    fn is_supported(&self) -> bool {
        true
    }

    fn has_permission(&self) -> bool {
        true
    }

    async fn request_permission(&self) -> bool {
        true
    }

    async fn send(&self, message: &NotificationMessage) -> Result<(), DeliveryError> {
        if *self.reject.lock().unwrap() {
            return Err(DeliveryError::Rejected("inbox full".into()));
        }
        self.titles.lock().unwrap().push(message.title.clone());
        Ok(())
    }
}

struct Harness {
    backend: Arc<MemoryBackend>,
    clock: Arc<FixedClock>,
    inbox: Arc<Inbox>,
    reconciler: Reconciler,
    dispatcher: Dispatcher,
}

fn harness() -> Harness {
    let backend = Arc::new(MemoryBackend::new());
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap(),
    ));
    let inbox = Arc::new(Inbox::default());
    let reconciler = Reconciler::new(backend.clone(), backend.clone(), clock.clone());
    let dispatcher = Dispatcher::new(
        backend.clone(),
        inbox.clone(),
        clock.clone(),
        DispatcherConfig::default(),
    );
    Harness {
        backend,
        clock,
        inbox,
        reconciler,
        dispatcher,
    }
}

async fn tick(d: &Dispatcher) -> TickReport {
    match d.tick().await.unwrap() {
        TickOutcome::Completed(r) => r,
        TickOutcome::AlreadyRunning => panic!("unexpected overlap"),
    }
}

#[tokio::test]
async fn reminder_is_delivered_once_when_due() {
    let h = harness();
    let event = h
        .backend
        .add_event(1, "Dad", NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(), EventType::Birthday, false)
        .await;
    h.reconciler.on_event_created(&event, None).await.unwrap();

    // Nothing is due before 2025-03-09 20:00.
    h.clock.set(Utc.with_ymd_and_hms(2025, 3, 9, 19, 59, 0).unwrap());
    assert_eq!(tick(&h.dispatcher).await.processed, 0);

    h.clock.set(Utc.with_ymd_and_hms(2025, 3, 9, 20, 0, 0).unwrap());
    assert_eq!(h.dispatcher.pending_due_count(Some(1)).await.unwrap(), 1);
    let report = tick(&h.dispatcher).await;
    assert_eq!(report.sent, 1);
    assert_eq!(*h.inbox.titles.lock().unwrap(), vec!["Tomorrow: Dad"]);

    h.clock.advance(Duration::hours(1));
    assert_eq!(tick(&h.dispatcher).await.processed, 0);
    assert_eq!(h.inbox.titles.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn failed_send_is_not_retried() {
    let h = harness();
    let event = h
        .backend
        .add_event(1, "Dad", NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(), EventType::Birthday, false)
        .await;
    h.reconciler.on_event_created(&event, None).await.unwrap();
    *h.inbox.reject.lock().unwrap() = true;

    h.clock.set(Utc.with_ymd_and_hms(2025, 3, 9, 21, 0, 0).unwrap());
    assert_eq!(tick(&h.dispatcher).await.failed, 1);

    let entries = h.backend.entries().await;
    assert_eq!(entries[0].status_id, STATUS_FAILED);
    assert_eq!(entries[0].error_message.as_deref(), Some("Notification rejected: inbox full"));

    *h.inbox.reject.lock().unwrap() = false;
    assert_eq!(tick(&h.dispatcher).await.processed, 0);
}

#[tokio::test]
async fn recurring_event_is_replanned_for_next_year_after_delivery() {
    let h = harness();
    let event = h
        .backend
        .add_event(1, "Us", NaiveDate::from_ymd_opt(2010, 3, 10).unwrap(), EventType::Anniversary, true)
        .await;
    h.reconciler.on_event_created(&event, None).await.unwrap();

    h.clock.set(Utc.with_ymd_and_hms(2025, 3, 9, 20, 30, 0).unwrap());
    assert_eq!(tick(&h.dispatcher).await.sent, 1);

    // The next rescan after the anniversary plans 2026.
    h.clock.set(Utc.with_ymd_and_hms(2025, 3, 11, 0, 0, 0).unwrap());
    h.reconciler.reschedule_all_for_user(1).await.unwrap();

    let pending = h.backend.pending_for_event(event.id).await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].occurrence_date, NaiveDate::from_ymd_opt(2026, 3, 10).unwrap());
    assert_eq!(pending[0].status_id, STATUS_PENDING);

    let history: Vec<_> = h
        .backend
        .entries()
        .await
        .into_iter()
        .filter(|n| n.status_id == STATUS_SENT)
        .collect();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn moving_an_event_never_leaves_stale_reminders() {
    let h = harness();
    let before = h
        .backend
        .add_event(1, "Trip", NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(), EventType::Other, false)
        .await;
    h.reconciler.on_event_created(&before, None).await.unwrap();

    let mut after = before.clone();
    after.event_date = NaiveDate::from_ymd_opt(2025, 3, 5).unwrap();
    h.backend.put_event(after.clone()).await;
    h.reconciler.on_event_updated(&before, &after).await.unwrap();

    // At the old slot nothing fires; the new slot already fired.
    h.clock.set(Utc.with_ymd_and_hms(2025, 3, 9, 20, 0, 0).unwrap());
    let report = tick(&h.dispatcher).await;
    assert_eq!(report.processed, 1);
    let pending = h.backend.pending_for_event(before.id).await;
    assert!(pending.is_empty());
    assert_eq!(
        h.backend.entries().await[0].scheduled_time,
        Utc.with_ymd_and_hms(2025, 3, 4, 20, 0, 0).unwrap()
    );
}

#[tokio::test]
async fn turning_delivery_off_drains_backlog_without_sending() {
    let h = harness();
    let event = h
        .backend
        .add_event(1, "Dad", NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(), EventType::Birthday, false)
        .await;
    h.reconciler.on_event_created(&event, None).await.unwrap();

    // Delivery switched off after scheduling, without a rescan.
    h.backend
        .set_preferences(
            1,
            ReminderPreferences {
                browser_push_enabled: false,
                ..Default::default()
            },
        )
        .await;

    h.clock.set(Utc.with_ymd_and_hms(2025, 3, 9, 22, 0, 0).unwrap());
    let report = tick(&h.dispatcher).await;
    assert_eq!(report.suppressed, 1);
    assert!(h.inbox.titles.lock().unwrap().is_empty());
    assert_eq!(h.dispatcher.pending_due_count(None).await.unwrap(), 0);
}
