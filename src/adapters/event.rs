//! Broker publish adapter.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{AdapterError, EventAdapter};
use crate::connector::{ConnectionHandle, Releasable};
use crate::deadline::Deadline;
use crate::submission::LogPayload;

/// Routing key for log entries published by the gateway.
pub const LOG_ROUTING_KEY: &str = "log.INFO";

const BROKER: &str = "broker";

/// Wire-level publish onto a broker exchange.
#[async_trait]
pub trait BrokerTransport: Releasable {
    async fn publish(&self, exchange: &str, routing_key: &str, body: Vec<u8>) -> Result<(), String>;
}

/// Publishes log entries as JSON onto a topic exchange.
///
/// The broker handle stays borrowed for the whole publish, so a concurrent
/// release waits for it; a publish after release fails with `ServiceClosed`
/// without reaching the transport.
pub struct BrokerEventAdapter<T> {
    handle: Arc<ConnectionHandle<T>>,
    exchange: String,
    routing_key: String,
}

impl<T: BrokerTransport> BrokerEventAdapter<T> {
    pub fn new(handle: Arc<ConnectionHandle<T>>, exchange: impl Into<String>) -> Self {
        Self {
            handle,
            exchange: exchange.into(),
            routing_key: LOG_ROUTING_KEY.to_string(),
        }
    }

    pub fn with_routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_key = routing_key.into();
        self
    }
}

#[async_trait]
impl<T: BrokerTransport + 'static> EventAdapter for BrokerEventAdapter<T> {
    async fn publish(&self, payload: &LogPayload, deadline: Deadline) -> Result<(), AdapterError> {
        let transport = self.handle.borrow().await?;

        if deadline.is_expired() {
            return Err(AdapterError::DeadlineExceeded(BROKER.to_string()));
        }

        let body = serde_json::to_vec(payload).map_err(|e| AdapterError::Publish(e.to_string()))?;

        tokio::time::timeout_at(
            deadline.instant(),
            transport.publish(&self.exchange, &self.routing_key, body),
        )
        .await
        .map_err(|_| AdapterError::TimedOut(BROKER.to_string()))?
        .map_err(AdapterError::Publish)?;

        debug!(
            exchange = %self.exchange,
            routing_key = %self.routing_key,
            name = %payload.name,
            "Log event published"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::adapters::mock::MockTransport;
    use crate::connector::ResourceError;

    fn entry() -> LogPayload {
        LogPayload {
            name: "user-action".to_string(),
            data: "logged in".to_string(),
        }
    }

    struct Fixture {
        handle: Arc<ConnectionHandle<MockTransport>>,
        transport: MockTransport,
        adapter: BrokerEventAdapter<MockTransport>,
    }

    fn fixture() -> Fixture {
        let transport = MockTransport::new();
        let handle = Arc::new(ConnectionHandle::new("rabbitmq", transport.clone()));
        let adapter = BrokerEventAdapter::new(handle.clone(), "logs_topic");
        Fixture {
            handle,
            transport,
            adapter,
        }
    }

    #[tokio::test]
    async fn test_publishes_json_with_log_routing_key() {
        let f = fixture();

        f.adapter
            .publish(&entry(), Deadline::after(Duration::from_secs(5)))
            .await
            .unwrap();

        let published = f.transport.published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].exchange, "logs_topic");
        assert_eq!(published[0].routing_key, "log.INFO");
        let body: LogPayload = serde_json::from_slice(&published[0].body).unwrap();
        assert_eq!(body, entry());
    }

    #[tokio::test]
    async fn test_publish_after_close_never_reaches_transport() {
        let f = fixture();
        f.handle.close().await.unwrap();

        let err = f
            .adapter
            .publish(&entry(), Deadline::after(Duration::from_secs(5)))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            AdapterError::Closed(ResourceError::ServiceClosed("rabbitmq".to_string()))
        );
        assert_eq!(err.to_string(), "rabbitmq service is closed");
        assert_eq!(f.transport.publish_calls(), 0);
        assert_eq!(f.transport.releases(), 1);
    }

    #[tokio::test]
    async fn test_expired_deadline_is_cancelled_before_publish() {
        let f = fixture();

        let err = f
            .adapter
            .publish(&entry(), Deadline::after(Duration::ZERO))
            .await
            .unwrap_err();

        assert_eq!(err, AdapterError::DeadlineExceeded("broker".to_string()));
        assert_eq!(f.transport.publish_calls(), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_surfaces() {
        let f = fixture();
        f.transport.set_fail_on_publish(true).await;

        let err = f
            .adapter
            .publish(&entry(), Deadline::after(Duration::from_secs(5)))
            .await
            .unwrap_err();

        assert!(matches!(err, AdapterError::Publish(_)));
        assert_eq!(f.transport.publish_calls(), 1);
    }

    #[tokio::test]
    async fn test_custom_routing_key() {
        let f = fixture();
        let adapter = BrokerEventAdapter::new(f.handle.clone(), "logs_topic")
            .with_routing_key("log.ERROR");

        adapter
            .publish(&entry(), Deadline::after(Duration::from_secs(5)))
            .await
            .unwrap();

        assert_eq!(f.transport.published().await[0].routing_key, "log.ERROR");
    }
}
