//! Push gateway delivery with exponential-backoff retry.
//!
//! [`WebhookNotifier`] POSTs each reminder as JSON to a push gateway. Failed
//! attempts are retried with backoff (1 s, 2 s) inside a single `send` call.
//! A 401, 403 or 410 from the gateway means the subscription is gone: the
//! permission flag is cleared and no further attempts are made until
//! [`Notifier::request_permission`] is called.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use keepdate_core::message::NotificationMessage;
use reqwest::StatusCode;

use super::{DeliveryError, Notifier};

/// Retry delays (exponential backoff: 1s, 2s).
const RETRY_DELAYS: [Duration; 2] = [Duration::from_secs(1), Duration::from_secs(2)];

/// HTTP request timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
    permitted: AtomicBool,
    retry_delays: Vec<Duration>,
}

impl WebhookNotifier {
    /// Create a notifier for `url`, sending `token` as a bearer token if set.
    pub fn new(url: String, token: Option<String>) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            url,
            token,
            permitted: AtomicBool::new(true),
            retry_delays: RETRY_DELAYS.to_vec(),
        })
    }

    /// Override the backoff schedule.
    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    /// Execute a single POST request and check the response status.
    async fn try_send(&self, payload: &serde_json::Value) -> Result<(), DeliveryError> {
        let mut request = self.client.post(&self.url).json(payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if revokes_permission(status) {
            self.permitted.store(false, Ordering::SeqCst);
            return Err(DeliveryError::PermissionDenied);
        }
        Err(DeliveryError::HttpStatus(status.as_u16()))
    }
}

fn revokes_permission(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::GONE
    )
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn is_supported(&self) -> bool {
        true
    }

    fn has_permission(&self) -> bool {
        self.permitted.load(Ordering::SeqCst)
    }

    /// Re-arm delivery after the gateway revoked it. The next `send` finds
    /// out whether the gateway agrees.
    async fn request_permission(&self) -> bool {
        self.permitted.store(true, Ordering::SeqCst);
        true
    }

    async fn send(&self, message: &NotificationMessage) -> Result<(), DeliveryError> {
        if !self.has_permission() {
            return Err(DeliveryError::PermissionDenied);
        }

        let payload = serde_json::json!({
            "title": message.title,
            "body": message.body,
            "tag": message.tag,
            "metadata": message.metadata,
        });

        for (attempt, delay) in self.retry_delays.iter().enumerate() {
            match self.try_send(&payload).await {
                Ok(()) => return Ok(()),
                Err(DeliveryError::PermissionDenied) => {
                    tracing::warn!(url = %self.url, tag = %message.tag, "Push gateway revoked permission");
                    return Err(DeliveryError::PermissionDenied);
                }
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        url = %self.url,
                        error = %e,
                        "Push delivery attempt failed, retrying"
                    );
                    tokio::time::sleep(*delay).await;
                }
            }
        }

        // Final attempt after the last backoff.
        self.try_send(&payload).await.inspect_err(|e| {
            tracing::error!(url = %self.url, error = %e, "Push delivery failed after all retries");
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Mutex};

    use assert_matches::assert_matches;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::post;
    use axum::{Json, Router};

    use super::*;

    #[derive(Clone)]
    struct Gateway {
        calls: Arc<AtomicUsize>,
        /// Status returned per call; the last one repeats.
        script: Arc<Vec<u16>>,
        last_auth: Arc<Mutex<Option<String>>>,
        last_body: Arc<Mutex<Option<serde_json::Value>>>,
    }

    async fn handle(
        State(gw): State<Gateway>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> AxumStatus {
        let n = gw.calls.fetch_add(1, Ordering::SeqCst);
        *gw.last_auth.lock().unwrap() = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        *gw.last_body.lock().unwrap() = Some(body);
        let code = gw.script[n.min(gw.script.len() - 1)];
        AxumStatus::from_u16(code).unwrap()
    }

    async fn spawn_gateway(script: Vec<u16>) -> (String, Gateway) {
        let gw = Gateway {
            calls: Arc::new(AtomicUsize::new(0)),
            script: Arc::new(script),
            last_auth: Arc::new(Mutex::new(None)),
            last_body: Arc::new(Mutex::new(None)),
        };
        let app = Router::new().route("/push", post(handle)).with_state(gw.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/push"), gw)
    }

    fn message() -> NotificationMessage {
        NotificationMessage {
            title: "Tomorrow: Dentist".into(),
            body: "Don't forget about your other tomorrow!".into(),
            tag: "event-3-day_before".into(),
            metadata: serde_json::json!({ "event_id": 3 }),
        }
    }

    fn notifier(url: String, token: Option<&str>) -> WebhookNotifier {
        WebhookNotifier::new(url, token.map(str::to_string))
            .unwrap()
            .with_retry_delays(vec![Duration::ZERO, Duration::ZERO])
    }

    #[tokio::test]
    async fn posts_message_with_bearer_token() {
        let (url, gw) = spawn_gateway(vec![200]).await;
        let notifier = notifier(url, Some("s3cret"));

        notifier.send(&message()).await.unwrap();

        assert_eq!(gw.calls.load(Ordering::SeqCst), 1);
        assert_eq!(gw.last_auth.lock().unwrap().as_deref(), Some("Bearer s3cret"));
        let body = gw.last_body.lock().unwrap().clone().unwrap();
        assert_eq!(body["title"], "Tomorrow: Dentist");
        assert_eq!(body["tag"], "event-3-day_before");
        assert_eq!(body["metadata"]["event_id"], 3);
    }

    #[tokio::test]
    async fn retries_server_errors_then_succeeds() {
        let (url, gw) = spawn_gateway(vec![503, 500, 200]).await;
        notifier(url, None).send(&message()).await.unwrap();
        assert_eq!(gw.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_all_retries() {
        let (url, gw) = spawn_gateway(vec![502]).await;
        let result = notifier(url, None).send(&message()).await;
        assert_matches!(result, Err(DeliveryError::HttpStatus(502)));
        assert_eq!(gw.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gone_revokes_permission_without_retrying() {
        let (url, gw) = spawn_gateway(vec![410]).await;
        let notifier = notifier(url, None);

        let result = notifier.send(&message()).await;
        assert_matches!(result, Err(DeliveryError::PermissionDenied));
        assert!(!notifier.has_permission());
        assert_eq!(gw.calls.load(Ordering::SeqCst), 1);

        // No request is made while permission is revoked.
        let _ = notifier.send(&message()).await;
        assert_eq!(gw.calls.load(Ordering::SeqCst), 1);

        assert!(notifier.request_permission().await);
        assert!(notifier.has_permission());
    }

    #[test]
    fn revoking_statuses() {
        assert!(revokes_permission(StatusCode::UNAUTHORIZED));
        assert!(revokes_permission(StatusCode::FORBIDDEN));
        assert!(revokes_permission(StatusCode::GONE));
        assert!(!revokes_permission(StatusCode::INTERNAL_SERVER_ERROR));
    }
}
