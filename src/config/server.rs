//! Ingress server configuration.

use std::time::Duration;

use serde::Deserialize;

/// Default request body cap: 1 MiB.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port for the ingress endpoint.
    pub port: u16,
    /// Deadline attached to every inbound request.
    pub request_timeout_secs: u64,
    /// Time in-flight requests get to finish once draining starts.
    pub shutdown_grace_secs: u64,
    /// Upper bound on releasing a single dependency.
    pub release_timeout_secs: u64,
    /// Request body size cap.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 80,
            request_timeout_secs: 30,
            shutdown_grace_secs: 10,
            release_timeout_secs: 5,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn release_timeout(&self) -> Duration {
        Duration::from_secs(self.release_timeout_secs)
    }
}
