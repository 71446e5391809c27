//! Storage dependency configuration.
//!
//! A store is declared (acquired at boot, reported by `/health`, released on
//! shutdown) only when its URL is set.

use std::time::Duration;

use serde::Deserialize;

use crate::connector::RetryPolicy;

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// PostgreSQL connection URI.
    pub postgres_url: Option<String>,
    /// MongoDB connection URI.
    pub mongodb_url: Option<String>,
    /// Database pinged by the MongoDB probe.
    pub mongodb_database: String,
    pub connection_retry: u32,
    pub retry_interval_secs: u64,
    /// Upper bound on one connect + probe attempt.
    pub connect_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            postgres_url: None,
            mongodb_url: None,
            mongodb_database: "logs".to_string(),
            connection_retry: 5,
            retry_interval_secs: 2,
            connect_timeout_secs: 10,
        }
    }
}

impl StorageConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.connection_retry,
            Duration::from_secs(self.retry_interval_secs),
        )
        .with_attempt_timeout(Duration::from_secs(self.connect_timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_default() {
        let storage = StorageConfig::default();
        assert!(storage.postgres_url.is_none());
        assert!(storage.mongodb_url.is_none());
        assert_eq!(storage.mongodb_database, "logs");
        assert_eq!(storage.retry_policy().max_attempts(), 5);
        assert_eq!(
            storage.retry_policy().attempt_timeout(),
            Duration::from_secs(10)
        );
    }
}
