use async_trait::async_trait;
use keepdate_core::message::NotificationMessage;

use super::{DeliveryError, Notifier};

/// Writes reminders to the log. Used when no push gateway is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
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
        tracing::info!(
            tag = %message.tag,
            title = %message.title,
            body = %message.body,
            "Reminder",
        );
        Ok(())
    }
}
