//! Resilient connector: bounded retry bootstrap for external dependencies.
//!
//! A `Dependency` knows how to open a connection and how to probe it. `connect`
//! runs connect + probe under a `RetryPolicy`, sleeping through an injectable
//! `Sleeper` between attempts, and hands back a `ConnectionHandle` once the
//! probe passes. Running out of attempts is reported, never retried further.

mod handle;

#[cfg(feature = "amqp")]
pub mod amqp;
#[cfg(feature = "mongodb")]
pub mod mongodb;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use handle::{
    ConnectionHandle, HandleGuard, ManagedResource, Releasable, ResourceError, ResourceState,
};

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::{error, info, warn};

// ============================================================================
// Retry policy
// ============================================================================

/// Delay shape between connection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every failure.
    Fixed(Duration),
    /// `unit * n^2` after the n-th failure, capped at `max`.
    Quadratic { unit: Duration, max: Duration },
}

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
    attempt_timeout: Duration,
}

/// Upper bound on one connect + probe attempt unless overridden.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

impl RetryPolicy {
    /// Policy with at least one attempt.
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    /// Bound each connect + probe attempt. An attempt that runs out of time
    /// counts as a failed attempt.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::new(max_attempts, Backoff::Fixed(delay))
    }

    pub fn quadratic(max_attempts: u32, unit: Duration) -> Self {
        Self::new(
            max_attempts,
            Backoff::Quadratic {
                unit,
                max: Duration::from_secs(60),
            },
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Delay after the given failed attempt (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Quadratic { unit, max } => {
                let squared = attempt.saturating_mul(attempt);
                unit.saturating_mul(squared).min(max)
            }
        }
    }
}

// ============================================================================
// Clock
// ============================================================================

/// Source of backoff sleeps.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, delay: Duration) -> BoxFuture<'static, ()>;
}

/// Real-time sleeper backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, delay: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(delay))
    }
}

/// Sleeper that returns immediately and records the requested delays.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<Duration> {
        self.delays.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, delay: Duration) -> BoxFuture<'static, ()> {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push(delay);
        }
        Box::pin(async {})
    }
}

// ============================================================================
// Dependencies
// ============================================================================

/// An external dependency that can be connected to and probed.
#[async_trait]
pub trait Dependency: Send + Sync {
    type Handle: Releasable + 'static;

    /// Human-readable name for logs and health output.
    fn name(&self) -> &str;

    /// Open a connection.
    async fn connect(&self) -> Result<Self::Handle, String>;

    /// Liveness check (ping/handshake) on a freshly opened connection.
    async fn probe(&self, handle: &Self::Handle) -> Result<(), String>;
}

/// Errors from the resilient connector.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    #[error("failed to connect to {name} after {attempts} attempts: {last_error}")]
    BootstrapExhausted {
        name: String,
        attempts: u32,
        last_error: String,
    },
}

/// Acquire a live handle to `target`, retrying under `policy`.
///
/// A connection counts as established only after its probe succeeds. A probe
/// failure releases the half-open connection and is retried like a connect
/// failure. So is an attempt that outlives `policy.attempt_timeout()`.
pub async fn connect<D: Dependency>(
    target: &D,
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
) -> Result<ConnectionHandle<D::Handle>, ConnectError> {
    let name = target.name();
    let max = policy.max_attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let outcome = tokio::time::timeout(policy.attempt_timeout(), try_connect(target))
            .await
            .unwrap_or_else(|_| {
                Err(format!(
                    "attempt timed out after {:?}",
                    policy.attempt_timeout()
                ))
            });
        match outcome {
            Ok(handle) => {
                info!(dependency = %name, attempt, "Connected");
                return Ok(ConnectionHandle::new(name, handle));
            }
            Err(e) if attempt < max => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    dependency = %name,
                    attempt,
                    max_attempts = max,
                    error = %e,
                    delay = ?delay,
                    "Connection failed, retrying"
                );
                sleeper.sleep(delay).await;
            }
            Err(e) => {
                error!(
                    dependency = %name,
                    attempts = max,
                    error = %e,
                    "Connection attempts exhausted"
                );
                return Err(ConnectError::BootstrapExhausted {
                    name: name.to_string(),
                    attempts: max,
                    last_error: e,
                });
            }
        }
    }
}

async fn try_connect<D: Dependency>(target: &D) -> Result<D::Handle, String> {
    let handle = target.connect().await?;
    if let Err(e) = target.probe(&handle).await {
        if let Err(release_err) = handle.release().await {
            warn!(dependency = %target.name(), error = %release_err, "Failed to release unprobed connection");
        }
        return Err(format!("probe failed: {}", e));
    }
    Ok(handle)
}
