//! Dispatcher: one validated submission, one adapter call, one outcome.
//!
//! The route is a static match on the `Submission` variant. The request
//! deadline bounds the whole route; when it fires the outcome is a timeout,
//! never a retry.

use axum::http::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::adapters::{AdapterError, Adapters, BatchReport, MailMessage};
use crate::deadline::Deadline;
use crate::envelope::DispatchOutcome;
use crate::submission::{
    action_examples, request_format_example, validate, MailPayload, RawSubmission, Submission,
    ValidationError,
};

/// Failure taxonomy of a single request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("invalid JSON: {0}")]
    MalformedBody(String),

    #[error("invalid credentials")]
    AuthRejected,

    #[error("{0}")]
    DownstreamUnavailable(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    ServiceClosed(String),

    /// Batch send where at least one recipient failed.
    #[error("Sent to {} recipients, {} failed", .0.sent.len(), .0.failed.len())]
    PartialFailure(BatchReport),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// HTTP status for this failure class.
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::Validation(_) | DispatchError::MalformedBody(_) => {
                StatusCode::BAD_REQUEST
            }
            DispatchError::AuthRejected => StatusCode::UNAUTHORIZED,
            DispatchError::DownstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            DispatchError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            DispatchError::ServiceClosed(_) => StatusCode::SERVICE_UNAVAILABLE,
            // Nothing delivered is a downstream failure, not a partial one
            DispatchError::PartialFailure(report) if report.sent.is_empty() => {
                StatusCode::BAD_GATEWAY
            }
            DispatchError::PartialFailure(_) => StatusCode::PARTIAL_CONTENT,
            DispatchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Data attached to the error envelope.
    fn data(&self) -> Option<Value> {
        match self {
            DispatchError::Validation(_) => Some(action_examples()),
            DispatchError::MalformedBody(_) => Some(request_format_example()),
            DispatchError::PartialFailure(report) => Some(batch_data(report)),
            _ => None,
        }
    }
}

impl From<AdapterError> for DispatchError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Unauthenticated => DispatchError::AuthRejected,
            AdapterError::Closed(e) => DispatchError::ServiceClosed(e.to_string()),
            e @ (AdapterError::DeadlineExceeded(_) | AdapterError::TimedOut(_)) => {
                DispatchError::Timeout(e.to_string())
            }
            e @ (AdapterError::Status { .. }
            | AdapterError::Transport { .. }
            | AdapterError::Publish(_)) => DispatchError::DownstreamUnavailable(e.to_string()),
        }
    }
}

impl From<DispatchError> for DispatchOutcome {
    fn from(err: DispatchError) -> Self {
        DispatchOutcome::failed(err.status(), err.to_string(), err.data())
    }
}

fn batch_data(report: &BatchReport) -> Value {
    json!({
        "sent": report.sent,
        "failed": report.failed,
        "total_sent": report.sent.len(),
        "total_failed": report.failed.len(),
    })
}

/// Routes submissions to adapters.
#[derive(Clone)]
pub struct Dispatcher {
    adapters: Adapters,
}

impl Dispatcher {
    pub fn new(adapters: Adapters) -> Self {
        Self { adapters }
    }

    /// Parse, validate and dispatch a raw request body.
    pub async fn handle_body(&self, body: &[u8], deadline: Deadline) -> DispatchOutcome {
        let raw = match RawSubmission::from_slice(body) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(error = %e, "Malformed request body");
                return DispatchError::MalformedBody(e.to_string()).into();
            }
        };

        match validate(raw) {
            Ok(submission) => self.dispatch(deadline, submission).await,
            Err(e) => {
                debug!(error = %e, "Submission rejected");
                DispatchError::from(e).into()
            }
        }
    }

    /// Dispatch a validated submission to exactly one adapter.
    pub async fn dispatch(&self, deadline: Deadline, submission: Submission) -> DispatchOutcome {
        let action = submission.action();

        let result = tokio::time::timeout_at(deadline.instant(), self.route(submission, deadline))
            .await
            .unwrap_or_else(|_| {
                Err(DispatchError::Timeout(format!(
                    "{} request exceeded its deadline",
                    action
                )))
            });

        match result {
            Ok(outcome) => {
                info!(action = %action, status = outcome.http_status, "Request dispatched");
                outcome
            }
            Err(e) => {
                warn!(action = %action, status = e.status().as_u16(), error = %e, "Dispatch failed");
                e.into()
            }
        }
    }

    async fn route(
        &self,
        submission: Submission,
        deadline: Deadline,
    ) -> Result<DispatchOutcome, DispatchError> {
        match submission {
            Submission::Auth(credentials) => {
                let response = self
                    .adapters
                    .auth
                    .authenticate(&credentials, deadline)
                    .await?;
                let data = serde_json::to_value(&response)
                    .map_err(|e| DispatchError::Internal(e.to_string()))?;
                Ok(DispatchOutcome::accepted("Authenticated!", Some(data)))
            }
            Submission::Log(entry) => {
                self.adapters.events.publish(&entry, deadline).await?;
                Ok(DispatchOutcome::accepted("logged via RabbitMQ", None))
            }
            Submission::LogDirect(entry) => {
                self.adapters.logs.record(&entry, deadline).await?;
                Ok(DispatchOutcome::accepted("logged", None))
            }
            Submission::Mail(mail) => self.send_mail(&mail, deadline).await,
        }
    }

    async fn send_mail(
        &self,
        mail: &MailPayload,
        deadline: Deadline,
    ) -> Result<DispatchOutcome, DispatchError> {
        if !mail.is_batch() {
            let to = mail
                .to
                .first()
                .ok_or_else(|| DispatchError::Internal("mail without recipient".to_string()))?;
            self.adapters
                .mail
                .send(&MailMessage::to_recipient(mail, to), deadline)
                .await?;
            return Ok(DispatchOutcome::accepted(
                format!("Message sent to {}", to),
                None,
            ));
        }

        let report = self.adapters.mail.send_batch(mail, deadline).await;
        if !report.is_complete() {
            return Err(DispatchError::PartialFailure(report));
        }
        Ok(DispatchOutcome::accepted(
            format!("Sent to {} recipients, 0 failed", report.sent.len()),
            Some(batch_data(&report)),
        ))
    }
}
