//! Due-notification dispatcher.
//!
//! Polls the queue every `interval` (first tick immediately on start) and
//! hands each due entry to the [`Notifier`]. Entries are processed one after
//! another; an error on one is logged and the tick moves on.
//!
//! Overlapping ticks are dropped, not queued. The in-process flag only saves
//! redundant work. Exactly-one-success per entry comes from the store's
//! pending-gated `mark_sent`/`mark_failed`, which also holds across processes.
//!
//! With a [`Reconciler`] attached, a tick also runs the recurring-event
//! rollover sweep once every `rollover_interval`, measured on the injected
//! clock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use keepdate_core::message::{compose, MessageContext};
use keepdate_core::status::NOTE_DELIVERY_DISABLED;
use keepdate_core::types::Timestamp;
use keepdate_db::models::notification::DueNotification;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::config::DispatcherConfig;
use crate::delivery::Notifier;
use crate::error::NotifyError;
use crate::reconciler::Reconciler;
use crate::store::QueueStore;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Per-tick counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Due entries examined.
    pub processed: usize,
    pub sent: usize,
    pub failed: usize,
    /// Left pending because the notifier is unavailable or lacks permission.
    pub skipped: usize,
    /// Closed as sent without delivery because the owner disabled delivery.
    pub suppressed: usize,
    /// Entries another worker finished first.
    pub conflicts: usize,
    /// Entries whose processing hit a store error.
    pub errors: usize,
    /// Entries planned for the next occurrence of recurring events.
    pub rolled_over: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Completed(TickReport),
    /// Another tick was still running; nothing was done.
    AlreadyRunning,
}

enum EntryResult {
    Sent,
    Failed,
    Skipped,
    Suppressed,
    Conflict,
}

/// Clears the running flag when a tick ends, including by panic.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub struct Dispatcher {
    store: Arc<dyn QueueStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: DispatcherConfig,
    rollover: Option<Arc<Reconciler>>,
    last_rollover: Mutex<Option<Timestamp>>,
    running: AtomicBool,
    lifecycle: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn QueueStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            config,
            rollover: None,
            last_rollover: Mutex::new(None),
            running: AtomicBool::new(false),
            lifecycle: Mutex::new(None),
        }
    }

    /// Run the recurring-event rollover sweep from this dispatcher's ticks.
    pub fn with_rollover(mut self, reconciler: Arc<Reconciler>) -> Self {
        self.rollover = Some(reconciler);
        self
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Spawn the poll loop. Returns `false` if it is already running.
    pub async fn start(self: &Arc<Self>) -> bool {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.is_some() {
            tracing::warn!("Dispatcher already started");
            return false;
        }

        let cancel = CancellationToken::new();
        let this = Arc::clone(self);
        let token = cancel.clone();
        let handle = tokio::spawn(async move { this.run(token).await });
        *lifecycle = Some((cancel, handle));
        true
    }

    /// Stop the poll loop and wait for it to exit. An in-flight tick is
    /// allowed to finish. Returns `false` if it was not running.
    pub async fn stop(&self) -> bool {
        let Some((cancel, handle)) = self.lifecycle.lock().await.take() else {
            return false;
        };
        cancel.cancel();
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Dispatcher task ended abnormally");
        }
        true
    }

    pub async fn is_started(&self) -> bool {
        self.lifecycle.lock().await.is_some()
    }

    /// Run the poll loop until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            batch_limit = self.config.batch_limit,
            notifier = self.notifier.name(),
            "Reminder dispatcher started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Reminder dispatcher shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(TickOutcome::Completed(report)) if report.processed > 0 => {
                            tracing::info!(
                                processed = report.processed,
                                sent = report.sent,
                                failed = report.failed,
                                skipped = report.skipped,
                                suppressed = report.suppressed,
                                conflicts = report.conflicts,
                                errors = report.errors,
                                rolled_over = report.rolled_over,
                                "Dispatch tick finished",
                            );
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "Dispatch tick failed"),
                    }
                }
            }
        }
    }

    /// Run one tick now. Also used for on-demand processing.
    ///
    /// Only a failure to list the due entries is returned as an error;
    /// per-entry failures are counted in the report.
    pub async fn tick(&self) -> Result<TickOutcome, NotifyError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            tracing::debug!("Dispatch tick skipped, previous tick still running");
            return Ok(TickOutcome::AlreadyRunning);
        }
        let _guard = RunningGuard(&self.running);

        let due = self
            .store
            .list_due(self.clock.now(), self.config.batch_limit)
            .await?;

        let mut report = TickReport {
            processed: due.len(),
            ..Default::default()
        };

        for entry in &due {
            match self.process_entry(entry).await {
                Ok(EntryResult::Sent) => report.sent += 1,
                Ok(EntryResult::Failed) => report.failed += 1,
                Ok(EntryResult::Skipped) => report.skipped += 1,
                Ok(EntryResult::Suppressed) => report.suppressed += 1,
                Ok(EntryResult::Conflict) => report.conflicts += 1,
                Err(e) => {
                    report.errors += 1;
                    tracing::error!(
                        notification_id = entry.id,
                        event_id = entry.event_id,
                        error = %e,
                        "Failed to process due reminder",
                    );
                }
            }
        }

        if let Some(reconciler) = &self.rollover {
            if self.rollover_due().await {
                match reconciler.roll_over_recurring().await {
                    Ok(summary) => report.rolled_over = summary.scheduled,
                    Err(e) => tracing::error!(error = %e, "Recurring rollover sweep failed"),
                }
            }
        }

        Ok(TickOutcome::Completed(report))
    }

    /// Claim the rollover slot if `rollover_interval` has passed since the
    /// last sweep.
    async fn rollover_due(&self) -> bool {
        let now = self.clock.now();
        let mut last = self.last_rollover.lock().await;
        let due = match *last {
            None => true,
            Some(prev) => (now - prev)
                .to_std()
                .is_ok_and(|elapsed| elapsed >= self.config.rollover_interval),
        };
        if due {
            *last = Some(now);
        }
        due
    }

    /// Number of pending entries already due, optionally for one user.
    pub async fn pending_due_count(&self, user_id: Option<i64>) -> Result<i64, NotifyError> {
        self.store.pending_due_count(user_id, self.clock.now()).await
    }

    async fn process_entry(&self, entry: &DueNotification) -> Result<EntryResult, NotifyError> {
        if !entry.delivery_enabled {
            let closed = self
                .store
                .mark_sent(entry.id, Some(NOTE_DELIVERY_DISABLED))
                .await?;
            return Ok(if closed {
                EntryResult::Suppressed
            } else {
                EntryResult::Conflict
            });
        }

        if !self.notifier.is_supported() || !self.notifier.has_permission() {
            tracing::debug!(
                notification_id = entry.id,
                notifier = self.notifier.name(),
                "Notifier unavailable, leaving reminder pending",
            );
            return Ok(EntryResult::Skipped);
        }

        let kind = match entry.kind() {
            Ok(kind) => kind,
            Err(e) => {
                let closed = self.store.mark_failed(entry.id, &e.to_string()).await?;
                return Ok(if closed {
                    EntryResult::Failed
                } else {
                    EntryResult::Conflict
                });
            }
        };

        let message = compose(MessageContext {
            notification_id: Some(entry.id),
            event_id: entry.event_id,
            event_title: &entry.event_title,
            event_type: &entry.event_type,
            kind,
            occurrence_date: entry.occurrence_date,
        });

        let (closed, result) = match self.notifier.send(&message).await {
            Ok(()) => (self.store.mark_sent(entry.id, None).await?, EntryResult::Sent),
            Err(e) => {
                tracing::warn!(
                    notification_id = entry.id,
                    event_id = entry.event_id,
                    error = %e,
                    "Reminder delivery failed",
                );
                (
                    self.store.mark_failed(entry.id, &e.to_string()).await?,
                    EntryResult::Failed,
                )
            }
        };

        if !closed {
            tracing::warn!(
                notification_id = entry.id,
                "Reminder was no longer pending when its status was recorded",
            );
            return Ok(EntryResult::Conflict);
        }
        Ok(result)
    }
}
