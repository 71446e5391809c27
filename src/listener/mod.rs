//! Log relay: consumes log events from the broker and forwards them to the
//! logging service.
//!
//! Malformed messages are rejected without requeue. Forward failures are
//! nacked with requeue so another attempt happens once the logging service
//! recovers. Losing the consumer stream triggers a reconnect with
//! exponential backoff; a released broker handle ends the relay.

use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicConsumeOptions, BasicNackOptions, BasicRejectOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::Consumer;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::adapters::{AdapterError, LogAdapter};
use crate::config::ListenerConfig;
use crate::connector::amqp::{declare_exchange, AmqpBroker};
use crate::connector::{ConnectionHandle, ResourceError};
use crate::deadline::Deadline;
use crate::submission::LogPayload;

const CONSUMER_TAG: &str = "courier-listener";

/// Errors from relaying one message or setting up the consumer.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("malformed log message: {0}")]
    Malformed(String),

    #[error(transparent)]
    Forward(#[from] AdapterError),

    #[error(transparent)]
    Closed(#[from] ResourceError),

    #[error("consumer setup failed: {0}")]
    Setup(String),
}

/// Decode a delivery body and forward it to the logging service.
pub async fn forward_delivery(
    logs: &dyn LogAdapter,
    body: &[u8],
    timeout: Duration,
) -> Result<(), RelayError> {
    let entry: LogPayload =
        serde_json::from_slice(body).map_err(|e| RelayError::Malformed(e.to_string()))?;
    if entry.name.trim().is_empty() {
        return Err(RelayError::Malformed("log name is required".to_string()));
    }

    logs.record(&entry, Deadline::after(timeout)).await?;
    Ok(())
}

pub struct LogRelay {
    broker: Arc<ConnectionHandle<AmqpBroker>>,
    logs: Arc<dyn LogAdapter>,
    exchange: String,
    queue: String,
    binding_keys: Vec<String>,
    forward_timeout: Duration,
}

impl LogRelay {
    pub fn new(
        broker: Arc<ConnectionHandle<AmqpBroker>>,
        logs: Arc<dyn LogAdapter>,
        exchange: impl Into<String>,
        config: &ListenerConfig,
        forward_timeout: Duration,
    ) -> Self {
        Self {
            broker,
            logs,
            exchange: exchange.into(),
            queue: config.queue.clone(),
            binding_keys: config.binding_keys.clone(),
            forward_timeout,
        }
    }

    /// Consume until `shutdown` is cancelled or the broker is released.
    pub async fn run(&self, shutdown: CancellationToken) {
        let backoff_builder = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(30))
            .with_jitter();
        let mut backoff = backoff_builder.build();

        loop {
            let setup = tokio::select! {
                _ = shutdown.cancelled() => break,
                setup = self.setup_consumer() => setup,
            };

            match setup {
                Ok(mut consumer) => {
                    backoff = backoff_builder.build();
                    info!(exchange = %self.exchange, keys = ?self.binding_keys, "Relay consuming");

                    loop {
                        tokio::select! {
                            _ = shutdown.cancelled() => {
                                info!("Relay stopping");
                                return;
                            }
                            next = consumer.next() => match next {
                                Some(Ok(delivery)) => self.process_delivery(delivery).await,
                                Some(Err(e)) => {
                                    error!(error = %e, "Consumer delivery error, will reconnect");
                                    break;
                                }
                                None => {
                                    info!("Consumer stream ended, reconnecting");
                                    break;
                                }
                            }
                        }
                    }
                }
                Err(RelayError::Closed(e)) => {
                    info!(reason = %e, "Broker released, relay stopping");
                    return;
                }
                Err(e) => {
                    error!(error = %e, "Failed to set up consumer, retrying after backoff");
                }
            }

            let delay = backoff.next().unwrap_or(Duration::from_secs(30));
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("Relay stopped");
    }

    async fn setup_consumer(&self) -> Result<Consumer, RelayError> {
        let broker = self.broker.borrow().await?;
        let channel = broker.channel().await.map_err(RelayError::Setup)?;

        declare_exchange(&channel, &self.exchange)
            .await
            .map_err(|e| RelayError::Setup(format!("Failed to declare exchange: {}", e)))?;

        // A named queue survives restarts; an unnamed one belongs to this
        // connection only.
        let named = !self.queue.is_empty();
        let queue = channel
            .queue_declare(
                &self.queue,
                QueueDeclareOptions {
                    durable: named,
                    exclusive: !named,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| RelayError::Setup(format!("Failed to declare queue: {}", e)))?;
        let queue_name = queue.name().as_str().to_string();

        for key in &self.binding_keys {
            channel
                .queue_bind(
                    &queue_name,
                    &self.exchange,
                    key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| RelayError::Setup(format!("Failed to bind queue: {}", e)))?;
            debug!(queue = %queue_name, routing_key = %key, "Bound queue to exchange");
        }

        channel
            .basic_consume(
                &queue_name,
                CONSUMER_TAG,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| RelayError::Setup(format!("Failed to start consumer: {}", e)))
    }

    async fn process_delivery(&self, delivery: Delivery) {
        match forward_delivery(self.logs.as_ref(), &delivery.data, self.forward_timeout).await {
            Ok(()) => {
                debug!(routing_key = %delivery.routing_key, "Log event relayed");
                if let Err(e) = delivery.ack(Default::default()).await {
                    error!(error = %e, "Failed to ack message");
                }
            }
            Err(RelayError::Malformed(reason)) => {
                warn!(routing_key = %delivery.routing_key, reason = %reason, "Rejecting malformed log event");
                if let Err(e) = delivery
                    .reject(BasicRejectOptions { requeue: false })
                    .await
                {
                    error!(error = %e, "Failed to reject message");
                }
            }
            Err(e) => {
                warn!(routing_key = %delivery.routing_key, error = %e, "Relay failed, requeueing");
                let requeue = BasicNackOptions {
                    requeue: true,
                    ..Default::default()
                };
                if let Err(e) = delivery.nack(requeue).await {
                    error!(error = %e, "Failed to nack message");
                }
            }
        }
    }
}
