//! `HttpEdgeCommAdapter` — `POST /edge/events` ingestion, `GET /healthz`,
//! and an optional outbound phase-publish sink (spec §6 HTTP transport).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use sitelink_core::{Phase, RawEdgePayload};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::adapter::{EdgeCommAdapter, EventCallback};
use crate::error::AdapterError;

fn now_epoch() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs_f64()
}

#[derive(Clone)]
struct AppState {
    on_event: EventCallback,
    last_phase: std::sync::Arc<Mutex<Option<String>>>,
}

async fn ingest_handler(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> axum::response::Response {
    let raw: RawEdgePayload = match serde_json::from_slice(&body) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "malformed edge event body");
            return (StatusCode::BAD_REQUEST, Json(json!({"ok": false, "reason": "malformed json"})))
                .into_response();
        }
    };
    let received_at = now_epoch();
    let event = raw.into_event(received_at);
    let ok = (state.on_event)(event);
    if !ok {
        return (StatusCode::OK, Json(json!({"ok": false, "reason": "rejected"}))).into_response();
    }
    (StatusCode::OK, Json(json!({"ok": true}))).into_response()
}

async fn healthz_handler(State(state): State<AppState>) -> impl IntoResponse {
    let phase = state.last_phase.lock().expect("healthz lock poisoned").clone();
    Json(json!({"status": "ok", "phase": phase}))
}

/// HTTP transport: listens on `host:port`, serves `/edge/events` and
/// `/healthz`. `phase_publish_url`, if set, receives an outbound POST on
/// every `publish_phase` call; otherwise phase publish is recorded locally
/// (visible via `/healthz`) and always reports success.
pub struct HttpEdgeCommAdapter {
    host: String,
    port: u16,
    phase_publish_url: Option<String>,
    client: reqwest::Client,
    started: AtomicBool,
    stopped: AtomicBool,
    shutdown: std::sync::Arc<Notify>,
    server_task: Mutex<Option<JoinHandle<()>>>,
    last_phase: std::sync::Arc<Mutex<Option<String>>>,
    bound_addr: Mutex<Option<std::net::SocketAddr>>,
}

impl HttpEdgeCommAdapter {
    pub fn new(host: impl Into<String>, port: u16, phase_publish_url: Option<String>) -> Self {
        Self {
            host: host.into(),
            port,
            phase_publish_url,
            client: reqwest::Client::new(),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            shutdown: std::sync::Arc::new(Notify::new()),
            server_task: Mutex::new(None),
            last_phase: std::sync::Arc::new(Mutex::new(None)),
            bound_addr: Mutex::new(None),
        }
    }

    /// The address actually bound after `start_event_ingestion`, useful when
    /// constructed with port `0` (tests, ephemeral ports).
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        *self.bound_addr.lock().expect("bound addr lock poisoned")
    }
}

#[async_trait]
impl EdgeCommAdapter for HttpEdgeCommAdapter {
    async fn start_event_ingestion(&self, on_event: EventCallback) -> Result<(), AdapterError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(AdapterError::AlreadyStarted);
        }

        let state = AppState {
            on_event,
            last_phase: self.last_phase.clone(),
        };
        let app = Router::new()
            .route("/edge/events", post(ingest_handler))
            .route("/healthz", get(healthz_handler))
            .with_state(state);

        let listener = TcpListener::bind((self.host.as_str(), self.port))
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))?;
        let addr = listener
            .local_addr()
            .map_err(|e| AdapterError::Transport(e.to_string()))?;
        *self.bound_addr.lock().expect("bound addr lock poisoned") = Some(addr);
        info!(%addr, "http edge comm adapter listening");

        let shutdown = self.shutdown.clone();
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.notified().await })
                .await;
            if let Err(e) = result {
                warn!(error = %e, "http edge comm adapter server exited with error");
            }
        });
        *self.server_task.lock().expect("server task lock poisoned") = Some(task);
        Ok(())
    }

    async fn publish_phase(&self, phase: &Phase, timestamp: f64) -> bool {
        *self.last_phase.lock().expect("last phase lock poisoned") = Some(phase.as_str().to_string());

        let Some(url) = &self.phase_publish_url else {
            return true;
        };

        let body = json!({"phase": phase.as_str(), "timestamp": timestamp, "service": "sitelinkd"});
        match self.client.post(url).json(&body).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!(error = %e, url, "phase publish POST failed");
                false
            }
        }
    }

    async fn stop(&self) -> Result<(), AdapterError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shutdown.notify_waiters();
        if let Some(task) = self.server_task.lock().expect("server task lock poisoned").take() {
            let _ = task.await;
        }
        info!("http edge comm adapter stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn accepted_event_returns_ok_true() {
        let adapter = HttpEdgeCommAdapter::new("127.0.0.1", 0, None);
        adapter
            .start_event_ingestion(Arc::new(|_event| true))
            .await
            .unwrap();
        let addr = adapter.local_addr().unwrap();

        let resp = reqwest::Client::new()
            .post(format!("http://{addr}/edge/events"))
            .json(&serde_json::json!({"camera_id": "cam01", "timestamp": 100.0, "detections": []}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["ok"], true);

        adapter.stop().await.unwrap();
    }

    #[tokio::test]
    async fn malformed_body_returns_400() {
        let adapter = HttpEdgeCommAdapter::new("127.0.0.1", 0, None);
        adapter
            .start_event_ingestion(Arc::new(|_event| true))
            .await
            .unwrap();
        let addr = adapter.local_addr().unwrap();

        let resp = reqwest::Client::new()
            .post(format!("http://{addr}/edge/events"))
            .body("not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        adapter.stop().await.unwrap();
    }

    #[tokio::test]
    async fn second_start_call_fails_with_already_started() {
        let adapter = HttpEdgeCommAdapter::new("127.0.0.1", 0, None);
        adapter
            .start_event_ingestion(Arc::new(|_event| true))
            .await
            .unwrap();
        let err = adapter
            .start_event_ingestion(Arc::new(|_event| true))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::AlreadyStarted));
        adapter.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let adapter = HttpEdgeCommAdapter::new("127.0.0.1", 0, None);
        adapter
            .start_event_ingestion(Arc::new(|_event| true))
            .await
            .unwrap();
        adapter.stop().await.unwrap();
        adapter.stop().await.unwrap();
    }

    #[tokio::test]
    async fn publish_phase_without_url_succeeds_and_updates_healthz() {
        let adapter = HttpEdgeCommAdapter::new("127.0.0.1", 0, None);
        adapter
            .start_event_ingestion(Arc::new(|_event| true))
            .await
            .unwrap();
        let addr = adapter.local_addr().unwrap();

        let ok = adapter.publish_phase(&Phase::new("working"), 123.0).await;
        assert!(ok);

        let resp = reqwest::Client::new()
            .get(format!("http://{addr}/healthz"))
            .send()
            .await
            .unwrap();
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["phase"], "working");

        adapter.stop().await.unwrap();
    }
}
