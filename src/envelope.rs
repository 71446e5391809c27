//! Response envelope.
//!
//! Every reply on the ingress endpoint is `{error, message, data?}` with the
//! HTTP status carrying the outcome class. `DispatchOutcome` is the in-process
//! form; it converts to and from the wire without losing the
//! `succeeded`/`http_status`/`message` triple.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON body written to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonResponse {
    pub error: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Result of dispatching one request. Built once, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub succeeded: bool,
    pub http_status: u16,
    pub message: String,
    pub data: Option<Value>,
}

impl DispatchOutcome {
    /// Successful dispatch (`202 Accepted`).
    pub fn accepted(message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            succeeded: true,
            http_status: StatusCode::ACCEPTED.as_u16(),
            message: message.into(),
            data,
        }
    }

    /// Failed dispatch with an explicit status.
    pub fn failed(status: StatusCode, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            succeeded: false,
            http_status: status.as_u16(),
            message: message.into(),
            data,
        }
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Wire body for this outcome.
    pub fn envelope(&self) -> JsonResponse {
        JsonResponse {
            error: !self.succeeded,
            message: self.message.clone(),
            data: self.data.clone(),
        }
    }

    /// Rebuild an outcome from a status code and wire body.
    pub fn from_wire(status: u16, body: JsonResponse) -> Self {
        Self {
            succeeded: !body.error,
            http_status: status,
            message: body.message,
            data: body.data,
        }
    }
}

impl IntoResponse for DispatchOutcome {
    fn into_response(self) -> Response {
        (self.status(), Json(self.envelope())).into_response()
    }
}
