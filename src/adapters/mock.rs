//! In-memory adapters and broker transport for testing.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    AdapterError, Adapters, AuthAdapter, AuthResponse, BrokerTransport, EventAdapter, LogAdapter,
    MailAdapter, MailMessage,
};
use crate::connector::Releasable;
use crate::deadline::Deadline;
use crate::submission::{AuthPayload, LogPayload};

/// Call counter plus scripted failure and latency, shared by every mock.
#[derive(Default)]
struct Script {
    calls: AtomicUsize,
    failure: RwLock<Option<AdapterError>>,
    delay: RwLock<Option<Duration>>,
}

impl Script {
    async fn run(&self, service: &str, deadline: Deadline) -> Result<(), AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if deadline.is_expired() {
            return Err(AdapterError::DeadlineExceeded(service.to_string()));
        }
        if let Some(delay) = *self.delay.read().await {
            tokio::time::sleep(delay).await;
        }
        match self.failure.read().await.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

macro_rules! scripted {
    ($mock:ty) => {
        impl $mock {
            pub fn calls(&self) -> usize {
                self.script.calls.load(Ordering::SeqCst)
            }

            /// Fail every following call with `err` (or succeed again with `None`).
            pub async fn set_failure(&self, err: Option<AdapterError>) {
                *self.script.failure.write().await = err;
            }

            /// Delay every following call.
            pub async fn set_delay(&self, delay: Duration) {
                *self.script.delay.write().await = Some(delay);
            }
        }
    };
}

/// Mock auth adapter. Accepts any credentials unless scripted to fail.
#[derive(Default)]
pub struct MockAuthAdapter {
    script: Script,
}

impl MockAuthAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

scripted!(MockAuthAdapter);

#[async_trait]
impl AuthAdapter for MockAuthAdapter {
    async fn authenticate(
        &self,
        payload: &AuthPayload,
        deadline: Deadline,
    ) -> Result<AuthResponse, AdapterError> {
        self.script.run("authentication", deadline).await?;
        Ok(AuthResponse {
            valid: true,
            user: Some(serde_json::json!({ "email": payload.email })),
            token: None,
        })
    }
}

/// Mock event adapter recording published entries.
#[derive(Default)]
pub struct MockEventAdapter {
    script: Script,
    published: RwLock<Vec<LogPayload>>,
}

impl MockEventAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn published(&self) -> Vec<LogPayload> {
        self.published.read().await.clone()
    }
}

scripted!(MockEventAdapter);

#[async_trait]
impl EventAdapter for MockEventAdapter {
    async fn publish(&self, payload: &LogPayload, deadline: Deadline) -> Result<(), AdapterError> {
        self.script.run("broker", deadline).await?;
        self.published.write().await.push(payload.clone());
        Ok(())
    }
}

/// Mock log adapter recording entries.
#[derive(Default)]
pub struct MockLogAdapter {
    script: Script,
    recorded: RwLock<Vec<LogPayload>>,
}

impl MockLogAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn recorded(&self) -> Vec<LogPayload> {
        self.recorded.read().await.clone()
    }
}

scripted!(MockLogAdapter);

#[async_trait]
impl LogAdapter for MockLogAdapter {
    async fn record(&self, payload: &LogPayload, deadline: Deadline) -> Result<(), AdapterError> {
        self.script.run("logger", deadline).await?;
        self.recorded.write().await.push(payload.clone());
        Ok(())
    }
}

/// Mock mail adapter. Recipients marked as bouncing fail with a 500.
#[derive(Default)]
pub struct MockMailAdapter {
    script: Script,
    bouncing: RwLock<HashSet<String>>,
    sent: RwLock<Vec<MailMessage>>,
}

impl MockMailAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn bounce(&self, recipient: impl Into<String>) {
        self.bouncing.write().await.insert(recipient.into());
    }

    pub async fn sent(&self) -> Vec<MailMessage> {
        self.sent.read().await.clone()
    }
}

scripted!(MockMailAdapter);

#[async_trait]
impl MailAdapter for MockMailAdapter {
    async fn send(&self, message: &MailMessage, deadline: Deadline) -> Result<(), AdapterError> {
        self.script.run("mailer", deadline).await?;
        if self.bouncing.read().await.contains(&message.to) {
            return Err(AdapterError::Status {
                service: "mailer".to_string(),
                status: 500,
            });
        }
        self.sent.write().await.push(message.clone());
        Ok(())
    }
}

/// One mock per channel, with typed access for assertions.
#[derive(Clone, Default)]
pub struct MockAdapters {
    pub auth: Arc<MockAuthAdapter>,
    pub events: Arc<MockEventAdapter>,
    pub logs: Arc<MockLogAdapter>,
    pub mail: Arc<MockMailAdapter>,
}

impl MockAdapters {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bundle to hand to a dispatcher.
    pub fn adapters(&self) -> Adapters {
        Adapters {
            auth: self.auth.clone(),
            events: self.events.clone(),
            logs: self.logs.clone(),
            mail: self.mail.clone(),
        }
    }

    /// Calls per channel: auth, events, logs, mail.
    pub fn calls(&self) -> [usize; 4] {
        [
            self.auth.calls(),
            self.events.calls(),
            self.logs.calls(),
            self.mail.calls(),
        ]
    }
}

/// A message handed to `MockTransport::publish`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub exchange: String,
    pub routing_key: String,
    pub body: Vec<u8>,
}

#[derive(Default)]
struct TransportState {
    published: RwLock<Vec<PublishedMessage>>,
    publish_calls: AtomicUsize,
    releases: AtomicUsize,
    fail_on_publish: AtomicBool,
}

/// Broker transport that keeps published messages in memory.
///
/// Clones share state, so a test can keep one clone while the handle owns
/// another.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<TransportState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_publish(&self, fail: bool) {
        self.state.fail_on_publish.store(fail, Ordering::SeqCst);
    }

    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.state.published.read().await.clone()
    }

    pub fn publish_calls(&self) -> usize {
        self.state.publish_calls.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.state.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Releasable for MockTransport {
    async fn release(&self) -> Result<(), String> {
        self.state.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl BrokerTransport for MockTransport {
    async fn publish(&self, exchange: &str, routing_key: &str, body: Vec<u8>) -> Result<(), String> {
        self.state.publish_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_on_publish.load(Ordering::SeqCst) {
            return Err("Mock publish failure".to_string());
        }
        self.state.published.write().await.push(PublishedMessage {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            body,
        });
        Ok(())
    }
}
