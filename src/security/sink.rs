//! Best-effort forwarding of audit records to an external monitoring endpoint.
//!
//! `forward` never blocks the caller and never reports failure: the HTTP
//! sink spawns the request on the current tokio runtime, bounds it with a
//! timeout and only logs the outcome.

use super::audit::{LoginAttempt, SecurityEvent};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_FORWARD_TIMEOUT: Duration = Duration::from_secs(3);

/// One record as it goes over the wire: the bare JSON of the event or attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AuditRecord {
    Event(SecurityEvent),
    LoginAttempt(LoginAttempt),
}

impl AuditRecord {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Event(_) => "security_event",
            Self::LoginAttempt(_) => "login_attempt",
        }
    }
}

pub trait AuditSink: Send + Sync {
    fn forward(&self, record: AuditRecord);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn forward(&self, _record: AuditRecord) {}
}

/// POSTs each record as JSON to a configured endpoint.
#[derive(Clone, Debug)]
pub struct HttpAuditSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAuditSink {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl AuditSink for HttpAuditSink {
    fn forward(&self, record: AuditRecord) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(kind = record.kind(), "no async runtime, audit record not forwarded");
            return;
        };

        let client = self.client.clone();
        let endpoint = self.endpoint.clone();

        runtime.spawn(async move {
            let kind = record.kind();
            match client.post(&endpoint).json(&record).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(kind, "audit record forwarded");
                }
                Ok(response) => {
                    warn!(kind, status = %response.status(), "security log endpoint rejected record");
                }
                Err(err) => {
                    warn!(kind, "failed to forward audit record: {err}");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    async fn capture(
        State(tx): State<mpsc::UnboundedSender<serde_json::Value>>,
        Json(body): Json<serde_json::Value>,
    ) -> StatusCode {
        let _ = tx.send(body);
        StatusCode::ACCEPTED
    }

    #[tokio::test]
    async fn http_sink_posts_json_record() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let app = Router::new().route("/security-log", post(capture)).with_state(tx);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let sink = HttpAuditSink::new(
            format!("http://{addr}/security-log"),
            DEFAULT_FORWARD_TIMEOUT,
        )
        .unwrap();

        let mut event = SecurityEvent::new("admin.login", "/admin", true);
        event.source_address = "10.0.0.1".to_string();
        sink.forward(AuditRecord::Event(event));

        let body = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(body["action"], "admin.login");
        assert_eq!(body["sourceAddress"], "10.0.0.1");
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn http_sink_swallows_delivery_failure() {
        // Nothing listens on the discard port; the spawned request just fails.
        let sink = HttpAuditSink::new("http://127.0.0.1:9/", Duration::from_millis(200)).unwrap();
        sink.forward(AuditRecord::LoginAttempt(LoginAttempt::new(
            "a@skyship.dev",
            "10.0.0.1",
            false,
        )));
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    #[test]
    fn http_sink_outside_runtime_is_a_no_op() {
        let sink = HttpAuditSink::new("http://127.0.0.1:9/", DEFAULT_FORWARD_TIMEOUT).unwrap();
        sink.forward(AuditRecord::Event(SecurityEvent::new("x", "y", false)));
    }
}
