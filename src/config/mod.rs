//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod listener;
mod messaging;
mod server;
mod services;
mod storage;

pub use listener::ListenerConfig;
pub use messaging::{AmqpConfig, MessagingConfig};
pub use server::{ServerConfig, DEFAULT_MAX_BODY_BYTES};
pub use services::{DownstreamDescriptor, ServicesConfig};
pub use storage::StorageConfig;

use std::time::Duration;

use serde::Deserialize;

use services::SERVICE_DEFAULTS;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "COURIER_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "COURIER";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "COURIER_LOG";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ingress server configuration.
    pub server: ServerConfig,
    /// Downstream HTTP services.
    pub services: ServicesConfig,
    /// Message broker configuration.
    pub messaging: MessagingConfig,
    /// Optional stores owned by the process.
    pub storage: StorageConfig,
    /// Log relay configuration.
    pub listener: ListenerConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    /// 5. Flat legacy variables (`BROKER_PORT`, `RABBITMQ_HOST`, ...)
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, File, FileFormat};

        let mut builder = ConfigLib::builder();

        // Partially specified service sections keep their name and address
        for (key, name, base) in SERVICE_DEFAULTS {
            builder = builder
                .set_default(format!("services.{key}.name"), name)?
                .set_default(format!("services.{key}.base_address"), base)?;
        }

        builder = builder
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let loaded = builder.add_source(environment()).build()?;

        let mut config: Config = loaded.try_deserialize()?;
        config.apply_legacy_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply the flat environment variables of older deployments.
    ///
    /// Unparseable numeric values are ignored, keeping the previous value.
    pub fn apply_legacy_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("BROKER_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Some(host) = lookup("BROKER_HOST") {
            self.server.host = host;
        }

        if let Some(url) = lookup("AUTH_SERVICE_URL") {
            self.services.auth.base_address = url;
        }
        if let Some(url) = lookup("LOG_SERVICE_URL") {
            self.services.log.base_address = url;
        }
        if let Some(url) = lookup("MAIL_SERVICE_URL") {
            self.services.mail.base_address = url;
        }
        if let Some(timeout) = lookup("SERVICE_TIMEOUT").and_then(|v| parse_duration(&v)) {
            for descriptor in self.services.all_mut() {
                descriptor.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            }
        }
        if let Some(retries) = lookup("SERVICE_RETRYCOUNT").and_then(|v| v.parse().ok()) {
            for descriptor in self.services.all_mut() {
                descriptor.max_retries = retries;
            }
        }

        let amqp = &mut self.messaging.amqp;
        if let Some(host) = lookup("RABBITMQ_HOST") {
            amqp.host = host;
        }
        if let Some(port) = lookup("RABBITMQ_PORT").and_then(|v| v.parse().ok()) {
            amqp.port = port;
        }
        if let Some(user) = lookup("RABBITMQ_USER") {
            amqp.user = user;
        }
        if let Some(password) = lookup("RABBITMQ_PASS") {
            amqp.password = password;
        }
        if let Some(vhost) = lookup("RABBITMQ_VHOST") {
            amqp.vhost = vhost;
        }
        if let Some(name) = lookup("RABBITMQ_CONNECTION_NAME") {
            amqp.connection_name = name;
        }
        if let Some(retry) = lookup("RABBITMQ_CONNECTION_RETRY").and_then(|v| v.parse().ok()) {
            amqp.connection_retry = retry;
        }

        if let Some(url) = lookup("POSTGRES_URL") {
            self.storage.postgres_url = Some(url);
        }
        if let Some(url) = lookup("MONGO_URL") {
            self.storage.mongodb_url = Some(url);
        }
        if let Some(database) = lookup("MONGO_DATABASE") {
            self.storage.mongodb_database = database;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must not be 0".to_string()));
        }
        if self.messaging.amqp.port == 0 {
            return Err(ConfigError::Invalid(
                "messaging.amqp.port must not be 0".to_string(),
            ));
        }
        for descriptor in self.services.all() {
            if descriptor.base_address.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "base address for service '{}' is empty",
                    descriptor.name
                )));
            }
        }
        Ok(())
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self::default()
    }
}

/// `COURIER__<SECTION>__<KEY>` variables, e.g. `COURIER__SERVER__PORT=8080`.
fn environment() -> ::config::Environment {
    ::config::Environment::with_prefix(CONFIG_ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}

/// Parse `30s`, `500ms`, `2m`, `1h`, or a bare number of seconds.
///
/// Returns `None` for anything unparseable, including values that overflow.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Some(ms) = value.strip_suffix("ms") {
        return ms.trim().parse().ok().map(Duration::from_millis);
    }
    if let Some(secs) = value.strip_suffix('s') {
        return secs.trim().parse().ok().map(Duration::from_secs);
    }
    if let Some(mins) = value.strip_suffix('m') {
        return mins
            .trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs);
    }
    if let Some(hours) = value.strip_suffix('h') {
        return hours
            .trim()
            .parse::<u64>()
            .ok()
            .and_then(|h| h.checked_mul(3600))
            .map(Duration::from_secs);
    }
    value.parse().ok().map(Duration::from_secs)
}
