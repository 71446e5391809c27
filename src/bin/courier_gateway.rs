//! courier-gateway: inter-service request gateway
//!
//! Accepts submissions on `POST /handle` and routes each one to the matching
//! downstream: authentication, logging, mail, or the broker.
//!
//! ## Architecture
//! ```text
//! [Client] -> [courier-gateway] -> [authentication-service]
//!                    |          -> [logger-service]
//!                    |          -> [mailer-service]
//!                    v
//!              [RabbitMQ logs_topic] -> [courier-listener] -> [logger-service]
//! ```
//!
//! ## Configuration
//! - `config.yaml`, `--config <path>` or `COURIER_CONFIG`
//! - `COURIER__*` overrides, e.g. `COURIER__SERVER__PORT=8080`
//! - `BROKER_PORT`, `RABBITMQ_HOST`, `AUTH_SERVICE_URL`, `SERVICE_TIMEOUT`
//!   and the other deployment variables
//! - `COURIER_LOG`: tracing filter (default: info)

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use courier::adapters::{Adapters, BrokerEventAdapter};
use courier::config::Config;
use courier::connector::amqp::AmqpTarget;
use courier::connector::TokioSleeper;
use courier::dispatch::Dispatcher;
use courier::lifecycle::{Lifecycle, LifecycleSettings};
use courier::server::{self, AppState};
use courier::utils::bootstrap::{init_tracing, parse_config_path};

type BoxError = Box<dyn std::error::Error>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    init_tracing();

    info!("Starting courier-gateway");

    let config_path = parse_config_path(std::env::args());
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let lifecycle = Lifecycle::new(LifecycleSettings::from_config(&config.server));

    let (state, listener) = match boot(&config, &lifecycle).await {
        Ok(booted) => booted,
        Err(e) => {
            error!("Startup failed: {}", e);
            lifecycle.abort().await;
            return Err(e);
        }
    };

    let app = server::router(state, config.server.max_body_bytes);
    lifecycle
        .run(move |shutdown| server::serve(listener, app, shutdown))
        .await?;

    info!("courier-gateway stopped");
    Ok(())
}

/// Acquire every dependency, wire the adapters, and bind the ingress port.
async fn boot(config: &Config, lifecycle: &Lifecycle) -> Result<(AppState, TcpListener), BoxError> {
    let sleeper = TokioSleeper;
    let amqp = &config.messaging.amqp;

    info!(broker = %amqp.display_address(), "Connecting to broker");
    let broker = lifecycle
        .acquire(&AmqpTarget::from_config(amqp), &amqp.retry_policy(), &sleeper)
        .await?;

    #[cfg(feature = "postgres")]
    if let Some(url) = &config.storage.postgres_url {
        use courier::connector::postgres::PostgresTarget;
        lifecycle
            .acquire(
                &PostgresTarget::new(url.clone()),
                &config.storage.retry_policy(),
                &sleeper,
            )
            .await?;
    }

    #[cfg(feature = "mongodb")]
    if let Some(url) = &config.storage.mongodb_url {
        use courier::connector::mongodb::MongoTarget;
        lifecycle
            .acquire(
                &MongoTarget::new(url.clone(), config.storage.mongodb_database.clone()),
                &config.storage.retry_policy(),
                &sleeper,
            )
            .await?;
    }

    let events = Arc::new(BrokerEventAdapter::new(broker, amqp.exchange.clone()));
    let adapters = Adapters::from_config(&config.services, events)?;

    for descriptor in config.services.all() {
        info!(
            service = %descriptor.name,
            address = %descriptor.base_address,
            timeout = ?descriptor.timeout(),
            "Downstream configured"
        );
    }

    let address = config.server.bind_address();
    let listener = TcpListener::bind(&address).await?;

    let state = AppState {
        dispatcher: Dispatcher::new(adapters),
        request_timeout: config.server.request_timeout(),
        health: Arc::new(lifecycle.clone()),
    };
    Ok((state, listener))
}
