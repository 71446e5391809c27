//! Ingress HTTP server.
//!
//! Endpoints:
//! - `GET /`: liveness banner
//! - `GET /health`: lifecycle state and dependency states
//! - `POST /handle`: submission ingress

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::deadline::Deadline;
use crate::dispatch::Dispatcher;
use crate::envelope::DispatchOutcome;
use crate::lifecycle::{HealthReport, Lifecycle};

/// Source of the `/health` report.
#[async_trait]
pub trait HealthSource: Send + Sync {
    async fn health(&self) -> HealthReport;
}

#[async_trait]
impl HealthSource for Lifecycle {
    async fn health(&self) -> HealthReport {
        Lifecycle::health(self).await
    }
}

/// Shared state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    /// Deadline given to each request at entry.
    pub request_timeout: Duration,
    pub health: Arc<dyn HealthSource>,
}

/// Build the axum router (separated for testing).
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/handle", post(handle))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve `app` on `listener` until `shutdown` resolves, then let in-flight
/// requests finish.
pub async fn serve<S>(listener: TcpListener, app: Router, shutdown: S) -> std::io::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    info!(address = ?listener.local_addr()?, "Ingress listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

// ============================================================================
// Handlers
// ============================================================================

async fn home() -> Json<Value> {
    Json(json!({
        "message": "Courier gateway",
        "status": "running",
    }))
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = state.health.health().await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

async fn handle(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> DispatchOutcome {
    // Deadline is fixed here and travels unchanged to the adapter.
    let deadline = Deadline::after(state.request_timeout);

    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            debug!(status = %rejection.status(), "Request body rejected");
            return DispatchOutcome::failed(rejection.status(), rejection.body_text(), None);
        }
    };

    state.dispatcher.handle_body(&body, deadline).await
}
