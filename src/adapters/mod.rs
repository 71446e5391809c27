//! Downstream adapters.
//!
//! One trait per external capability. Each operation takes the request's
//! `Deadline`, checks it before touching the network, and bounds the remote
//! call by it. Adapters never retry on their own.

mod auth;
mod event;
mod http;
mod log;
mod mail;
pub mod mock;

#[cfg(test)]
mod test_support;

pub use auth::HttpAuthAdapter;
pub use event::{BrokerEventAdapter, BrokerTransport, LOG_ROUTING_KEY};
pub use http::HttpDownstream;
pub use log::HttpLogAdapter;
pub use mail::HttpMailAdapter;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::config::ServicesConfig;
use crate::connector::ResourceError;
use crate::deadline::Deadline;
use crate::submission::{AuthPayload, LogPayload, MailPayload};

/// Errors from a downstream call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    /// The downstream rejected the credentials.
    #[error("invalid credentials")]
    Unauthenticated,

    #[error("{service} service returned status {status}")]
    Status { service: String, status: u16 },

    #[error("{service} service unreachable: {message}")]
    Transport { service: String, message: String },

    /// Deadline had already passed before the call started.
    #[error("request cancelled before calling {0} service: deadline exceeded")]
    DeadlineExceeded(String),

    #[error("{0} service timed out")]
    TimedOut(String),

    #[error(transparent)]
    Closed(#[from] ResourceError),

    #[error("failed to publish event: {0}")]
    Publish(String),
}

/// Result of a successful credential check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// One mail to one recipient, as sent to the mail service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub to: String,
    pub subject: String,
    pub message: String,
}

impl MailMessage {
    /// The message of `mail` addressed to a single recipient.
    pub fn to_recipient(mail: &MailPayload, to: &str) -> Self {
        Self {
            from: mail.from.clone(),
            to: to.to_string(),
            subject: mail.subject.clone(),
            message: mail.message.clone(),
        }
    }
}

/// Per-recipient outcome of a batch send.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub sent: Vec<String>,
    pub failed: Vec<String>,
}

impl BatchReport {
    /// True only when every recipient succeeded.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[async_trait]
pub trait AuthAdapter: Send + Sync {
    async fn authenticate(
        &self,
        payload: &AuthPayload,
        deadline: Deadline,
    ) -> Result<AuthResponse, AdapterError>;
}

/// Asynchronous publish of a log entry onto the broker.
#[async_trait]
pub trait EventAdapter: Send + Sync {
    async fn publish(&self, payload: &LogPayload, deadline: Deadline) -> Result<(), AdapterError>;
}

/// Synchronous write of a log entry to the logging service.
#[async_trait]
pub trait LogAdapter: Send + Sync {
    async fn record(&self, payload: &LogPayload, deadline: Deadline) -> Result<(), AdapterError>;
}

#[async_trait]
pub trait MailAdapter: Send + Sync {
    async fn send(&self, message: &MailMessage, deadline: Deadline) -> Result<(), AdapterError>;

    /// Send `mail` to every recipient in turn, collecting which succeeded.
    async fn send_batch(&self, mail: &MailPayload, deadline: Deadline) -> BatchReport {
        let mut report = BatchReport::default();
        for to in &mail.to {
            let message = MailMessage::to_recipient(mail, to);
            match self.send(&message, deadline).await {
                Ok(()) => report.sent.push(to.clone()),
                Err(e) => {
                    warn!(recipient = %to, error = %e, "Batch mail send failed");
                    report.failed.push(to.clone());
                }
            }
        }
        report
    }
}

/// The adapters a dispatcher routes to, injected at construction.
#[derive(Clone)]
pub struct Adapters {
    pub auth: Arc<dyn AuthAdapter>,
    pub events: Arc<dyn EventAdapter>,
    pub logs: Arc<dyn LogAdapter>,
    pub mail: Arc<dyn MailAdapter>,
}

impl Adapters {
    /// HTTP adapters for the configured services plus the given event adapter.
    pub fn from_config(
        services: &ServicesConfig,
        events: Arc<dyn EventAdapter>,
    ) -> Result<Self, AdapterError> {
        Ok(Self {
            auth: Arc::new(HttpAuthAdapter::new(services.auth.clone())?),
            events,
            logs: Arc::new(HttpLogAdapter::new(services.log.clone())?),
            mail: Arc::new(HttpMailAdapter::new(services.mail.clone())?),
        })
    }
}
