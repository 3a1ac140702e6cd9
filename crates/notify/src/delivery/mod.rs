//! Delivery channels.
//!
//! A [`Notifier`] is the only thing the dispatcher and local scheduler know
//! about delivery. [`build_notifier`] picks the push gateway when one is
//! configured and falls back to logging otherwise.

pub mod log;
pub mod webhook;

use std::sync::Arc;

use async_trait::async_trait;
use keepdate_core::message::NotificationMessage;

pub use log::LogNotifier;
pub use webhook::WebhookNotifier;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The HTTP request failed (network, DNS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The gateway answered with a non-2xx status.
    #[error("Push gateway returned HTTP {0}")]
    HttpStatus(u16),

    #[error("Notification permission not granted")]
    PermissionDenied,

    /// The channel accepted the request but refused the message.
    #[error("Notification rejected: {0}")]
    Rejected(String),
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// A channel that can show a reminder to the user.
///
/// `send` reports success or failure only; there are no delivery receipts.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short channel name for logs.
    fn name(&self) -> &'static str;

    fn is_supported(&self) -> bool;

    fn has_permission(&self) -> bool;

    /// Ask for (or re-establish) permission to deliver.
    async fn request_permission(&self) -> bool;

    async fn send(&self, message: &NotificationMessage) -> Result<(), DeliveryError>;
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Delivery settings loaded from environment variables.
#[derive(Debug, Clone, Default)]
pub struct DeliveryConfig {
    pub gateway_url: Option<String>,
    pub gateway_token: Option<String>,
}

impl DeliveryConfig {
    /// | Env var              | Default |
    /// |----------------------|---------|
    /// | `PUSH_GATEWAY_URL`   | unset, reminders are only logged |
    /// | `PUSH_GATEWAY_TOKEN` | unset   |
    pub fn from_env() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            gateway_url: non_empty("PUSH_GATEWAY_URL"),
            gateway_token: non_empty("PUSH_GATEWAY_TOKEN"),
        }
    }
}

/// Build the notifier described by `config`.
pub fn build_notifier(config: &DeliveryConfig) -> Result<Arc<dyn Notifier>, DeliveryError> {
    match &config.gateway_url {
        Some(url) => {
            tracing::info!(url = %url, "Delivering reminders through push gateway");
            Ok(Arc::new(WebhookNotifier::new(
                url.clone(),
                config.gateway_token.clone(),
            )?))
        }
        None => {
            tracing::warn!("PUSH_GATEWAY_URL not set, reminders will only be logged");
            Ok(Arc::new(LogNotifier))
        }
    }
}
