//! Ingress router tests against in-memory adapters.
//!
//! Run with: cargo test --test gateway

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::Router;
use http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use courier::adapters::mock::MockAdapters;
use courier::adapters::AdapterError;
use courier::connector::{ResourceError, ResourceState};
use courier::dispatch::Dispatcher;
use courier::lifecycle::{HealthReport, LifecycleState, ResourceHealth};
use courier::server::{router, AppState, HealthSource};

struct Serving;

#[async_trait]
impl HealthSource for Serving {
    async fn health(&self) -> HealthReport {
        HealthReport {
            state: LifecycleState::Serving,
            resources: vec![ResourceHealth {
                name: "rabbitmq".to_string(),
                state: ResourceState::Open,
            }],
        }
    }
}

fn gateway(mocks: &MockAdapters) -> Router {
    gateway_with_timeout(mocks, Duration::from_secs(5))
}

fn gateway_with_timeout(mocks: &MockAdapters, request_timeout: Duration) -> Router {
    router(
        AppState {
            dispatcher: Dispatcher::new(mocks.adapters()),
            request_timeout,
            health: Arc::new(Serving),
        },
        1024 * 1024,
    )
}

async fn submit(app: Router, body: Value) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("POST")
        .uri("/handle")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

// ============================================================================
// Routing
// ============================================================================

#[tokio::test]
async fn test_auth_returns_downstream_identity() {
    let mocks = MockAdapters::new();

    let (status, body) = submit(
        gateway(&mocks),
        json!({"action": "auth", "auth": {"email": "a@b.com", "password": "x"}}),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["error"], false);
    assert_eq!(body["message"], "Authenticated!");
    assert_eq!(body["data"]["user"]["email"], "a@b.com");
    assert_eq!(mocks.calls(), [1, 0, 0, 0]);
}

#[tokio::test]
async fn test_log_goes_to_broker_and_logdirect_to_logger() {
    let mocks = MockAdapters::new();
    let entry = json!({"name": "user-action", "data": "clicked"});

    let (status, body) = submit(gateway(&mocks), json!({"action": "log", "log": entry})).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["message"], "logged via RabbitMQ");

    let (status, body) =
        submit(gateway(&mocks), json!({"action": "logdirect", "log": entry})).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["message"], "logged");

    assert_eq!(mocks.calls(), [0, 1, 1, 0]);
    assert_eq!(mocks.events.published().await[0].name, "user-action");
    assert_eq!(mocks.logs.recorded().await[0].data, "clicked");
}

#[tokio::test]
async fn test_payloads_for_other_actions_are_ignored() {
    let mocks = MockAdapters::new();

    let (status, _) = submit(
        gateway(&mocks),
        json!({
            "action": "log",
            "auth": {"email": "a@b.com", "password": "x"},
            "log": {"name": "n", "data": "d"},
            "mail": {"to": "c@d.com", "subject": "s", "message": "m"}
        }),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(mocks.calls(), [0, 1, 0, 0]);
}

#[tokio::test]
async fn test_single_recipient_mail() {
    let mocks = MockAdapters::new();

    let (status, body) = submit(
        gateway(&mocks),
        json!({"action": "mail", "mail": {"to": "user@example.com", "subject": "Hi", "message": "There"}}),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["message"], "Message sent to user@example.com");
    assert_eq!(mocks.mail.sent().await[0].to, "user@example.com");
}

#[tokio::test]
async fn test_batch_mail_partial_failure() {
    let mocks = MockAdapters::new();
    mocks.mail.bounce("b@x.com").await;

    let (status, body) = submit(
        gateway(&mocks),
        json!({"action": "mail", "mail": {
            "to": ["a@x.com", "b@x.com", "c@x.com"],
            "subject": "Hi",
            "message": "There"
        }}),
    )
    .await;

    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(body["error"], true);
    assert_eq!(body["message"], "Sent to 2 recipients, 1 failed");
    assert_eq!(body["data"]["failed"], json!(["b@x.com"]));
    assert_eq!(body["data"]["total_sent"], 2);
    assert_eq!(mocks.mail.calls(), 3);
}

// ============================================================================
// Validation
// ============================================================================

#[tokio::test]
async fn test_unknown_action_lists_valid_actions() {
    let mocks = MockAdapters::new();

    let (status, body) = submit(gateway(&mocks), json!({"action": "bogus"})).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], true);
    assert_eq!(
        body["message"],
        "invalid action 'bogus'. Valid actions: auth, log, logdirect, mail"
    );
    assert_eq!(
        body["data"]["valid_actions"],
        json!(["auth", "log", "logdirect", "mail"])
    );
    assert_eq!(mocks.calls(), [0, 0, 0, 0]);
}

#[tokio::test]
async fn test_validation_failures_never_reach_adapters() {
    let cases = [
        (json!({}), "action is required"),
        (json!({"action": "auth"}), "auth payload is required"),
        (
            json!({"action": "auth", "auth": {"email": "nope", "password": "x"}}),
            "invalid email format",
        ),
        (
            json!({"action": "log", "log": {"name": "  ", "data": "d"}}),
            "log name is required",
        ),
        (
            json!({"action": "mail", "mail": {"to": ["ok@x.com", "bad"], "subject": "s", "message": "m"}}),
            "invalid recipient email format",
        ),
    ];

    for (request, expected) in cases {
        let mocks = MockAdapters::new();
        let (status, body) = submit(gateway(&mocks), request.clone()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", request);
        let message = body["message"].as_str().unwrap();
        assert!(
            message.starts_with(expected),
            "{} -> {}",
            request,
            message
        );
        assert_eq!(mocks.calls(), [0, 0, 0, 0], "{}", request);
    }
}

// ============================================================================
// Downstream failures
// ============================================================================

#[tokio::test]
async fn test_rejected_credentials_are_401() {
    let mocks = MockAdapters::new();
    mocks
        .auth
        .set_failure(Some(AdapterError::Unauthenticated))
        .await;

    let (status, body) = submit(
        gateway(&mocks),
        json!({"action": "auth", "auth": {"email": "a@b.com", "password": "wrong"}}),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "invalid credentials");
}

#[tokio::test]
async fn test_downstream_failure_statuses() {
    let cases = [
        (
            AdapterError::Status {
                service: "logger".to_string(),
                status: 500,
            },
            StatusCode::BAD_GATEWAY,
        ),
        (
            AdapterError::TimedOut("logger".to_string()),
            StatusCode::GATEWAY_TIMEOUT,
        ),
        (
            AdapterError::Closed(ResourceError::ServiceClosed("logger".to_string())),
            StatusCode::SERVICE_UNAVAILABLE,
        ),
    ];

    for (failure, expected) in cases {
        let mocks = MockAdapters::new();
        mocks.logs.set_failure(Some(failure.clone())).await;

        let (status, body) = submit(
            gateway(&mocks),
            json!({"action": "logdirect", "log": {"name": "n", "data": "d"}}),
        )
        .await;

        assert_eq!(status, expected, "{:?}", failure);
        assert_eq!(body["error"], true);
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_downstream_hits_request_deadline() {
    let mocks = MockAdapters::new();
    mocks.events.set_delay(Duration::from_secs(60)).await;

    let (status, body) = submit(
        gateway_with_timeout(&mocks, Duration::from_secs(2)),
        json!({"action": "log", "log": {"name": "n", "data": "d"}}),
    )
    .await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["message"], "log request exceeded its deadline");
    assert!(mocks.events.published().await.is_empty());
}
