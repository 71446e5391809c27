//! Downstream service descriptors.

use std::time::Duration;

use serde::Deserialize;

/// Static description of one downstream HTTP service.
///
/// Read once at startup and shared read-only for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DownstreamDescriptor {
    /// Name used in logs and error messages.
    pub name: String,
    /// Base URL; endpoint paths are appended to it.
    pub base_address: String,
    /// Fixed per-call timeout, further bounded by the request deadline.
    pub timeout_ms: u64,
    /// Retry budget advertised to the adapter. The dispatcher never retries.
    pub max_retries: u32,
    /// Bearer credential sent with each call.
    pub credential: Option<String>,
}

impl Default for DownstreamDescriptor {
    fn default() -> Self {
        Self {
            name: String::new(),
            base_address: String::new(),
            timeout_ms: 30_000,
            max_retries: 5,
            credential: None,
        }
    }
}

impl DownstreamDescriptor {
    pub fn new(name: impl Into<String>, base_address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_address: base_address.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Full URL of an endpoint under the base address.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_address.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Defaults for each service: config key, display name, base address.
pub(crate) const SERVICE_DEFAULTS: [(&str, &str, &str); 3] = [
    ("auth", "authentication", "http://authentication-service"),
    ("log", "logger", "http://logger-service/api/v1"),
    ("mail", "mailer", "http://mailer-service/api/v1"),
];

/// The three downstream HTTP services.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub auth: DownstreamDescriptor,
    pub log: DownstreamDescriptor,
    pub mail: DownstreamDescriptor,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        let [auth, log, mail] =
            SERVICE_DEFAULTS.map(|(_, name, base)| DownstreamDescriptor::new(name, base));
        Self { auth, log, mail }
    }
}

impl ServicesConfig {
    pub fn all(&self) -> [&DownstreamDescriptor; 3] {
        [&self.auth, &self.log, &self.mail]
    }

    pub(crate) fn all_mut(&mut self) -> [&mut DownstreamDescriptor; 3] {
        [&mut self.auth, &mut self.log, &mut self.mail]
    }
}
