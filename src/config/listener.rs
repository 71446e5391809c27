//! Log relay listener configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::connector::RetryPolicy;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Queue to consume from. Empty means a server-named exclusive queue.
    pub queue: String,
    /// Routing keys bound to the queue.
    pub binding_keys: Vec<String>,
    pub connection_retry: u32,
    /// Bootstrap backoff is `unit * attempt^2`.
    pub backoff_unit_secs: u64,
    /// Upper bound on one connect + handshake attempt.
    pub connect_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            queue: String::new(),
            binding_keys: vec![
                "log.INFO".to_string(),
                "log.WARNING".to_string(),
                "log.ERROR".to_string(),
            ],
            connection_retry: 5,
            backoff_unit_secs: 1,
            connect_timeout_secs: 10,
        }
    }
}

impl ListenerConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::quadratic(
            self.connection_retry,
            Duration::from_secs(self.backoff_unit_secs),
        )
        .with_attempt_timeout(Duration::from_secs(self.connect_timeout_secs))
    }
}
