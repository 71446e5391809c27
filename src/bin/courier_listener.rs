//! courier-listener: broker-to-logger relay
//!
//! Consumes `log.*` events from the `logs_topic` exchange and forwards each
//! one to the logging service.
//!
//! The broker connection is retried with quadratic backoff
//! (`listener.connection_retry` attempts, `listener.backoff_unit_secs` unit);
//! running out of attempts stops the process.

use std::sync::Arc;

use tracing::{error, info};

use courier::adapters::HttpLogAdapter;
use courier::config::Config;
use courier::connector::amqp::AmqpTarget;
use courier::connector::TokioSleeper;
use courier::lifecycle::{Lifecycle, LifecycleSettings};
use courier::listener::LogRelay;
use courier::utils::bootstrap::{init_tracing, parse_config_path};

type BoxError = Box<dyn std::error::Error>;

const CONNECTION_NAME: &str = "courier-listener";

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    init_tracing();

    info!("Starting courier-listener");

    let config_path = parse_config_path(std::env::args());
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let lifecycle = Lifecycle::new(LifecycleSettings::from_config(&config.server));

    let relay = match boot(&config, &lifecycle).await {
        Ok(relay) => relay,
        Err(e) => {
            error!("Startup failed: {}", e);
            lifecycle.abort().await;
            return Err(e);
        }
    };

    let token = lifecycle.token();
    lifecycle
        .run(move |_shutdown| async move {
            relay.run(token).await;
            Ok::<(), std::convert::Infallible>(())
        })
        .await?;

    info!("courier-listener stopped");
    Ok(())
}

async fn boot(config: &Config, lifecycle: &Lifecycle) -> Result<LogRelay, BoxError> {
    let amqp = &config.messaging.amqp;

    info!(broker = %amqp.display_address(), "Connecting to broker");
    let target = AmqpTarget::from_config(amqp).with_connection_name(CONNECTION_NAME);
    let broker = lifecycle
        .acquire(&target, &config.listener.retry_policy(), &TokioSleeper)
        .await?;

    let log_service = config.services.log.clone();
    let forward_timeout = log_service.timeout();
    let logs = Arc::new(HttpLogAdapter::new(log_service)?);

    Ok(LogRelay::new(
        broker,
        logs,
        amqp.exchange.clone(),
        &config.listener,
        forward_timeout,
    ))
}
