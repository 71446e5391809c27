//! Lifecycle coordinator.
//!
//! `Booting -> Serving -> Draining -> Stopped`.
//!
//! Dependencies are acquired during `Booting` through the resilient
//! connector, in declaration order. `run` moves to `Serving` and hands the
//! server a shutdown future. A termination signal (or `shutdown()`) cancels
//! the root token: the server stops accepting, in-flight requests get the
//! grace period, and once `Stopped` every dependency is released in reverse
//! acquisition order, each under its own timeout.

mod signal;

pub use signal::wait_for_signal;

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::connector::{
    self, ConnectError, ConnectionHandle, Dependency, ManagedResource, ResourceState, RetryPolicy,
    Sleeper,
};

/// Process lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Booting,
    Serving,
    Draining,
    Stopped,
}

/// Errors from the lifecycle coordinator.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Bootstrap(#[from] ConnectError),

    #[error("server error: {0}")]
    Server(String),

    #[error("cannot {action} while {state:?}")]
    InvalidState {
        action: &'static str,
        state: LifecycleState,
    },
}

/// Shutdown timing.
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    /// Time in-flight work gets once draining starts.
    pub grace: Duration,
    /// Upper bound on each dependency release.
    pub release_timeout: Duration,
    /// Install SIGINT/SIGTERM handlers in `run`.
    pub listen_for_signals: bool,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(10),
            release_timeout: Duration::from_secs(5),
            listen_for_signals: true,
        }
    }
}

impl LifecycleSettings {
    pub fn from_config(server: &ServerConfig) -> Self {
        Self {
            grace: server.shutdown_grace(),
            release_timeout: server.release_timeout(),
            listen_for_signals: true,
        }
    }
}

/// Health of one declared dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceHealth {
    pub name: String,
    pub state: ResourceState,
}

/// Snapshot for the health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub state: LifecycleState,
    pub resources: Vec<ResourceHealth>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.state == LifecycleState::Serving
            && self
                .resources
                .iter()
                .all(|r| r.state == ResourceState::Open)
    }
}

/// Owns process startup and shutdown. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Lifecycle {
    settings: LifecycleSettings,
    state: Arc<watch::Sender<LifecycleState>>,
    token: CancellationToken,
    resources: Arc<Mutex<Vec<Arc<dyn ManagedResource>>>>,
}

impl Lifecycle {
    pub fn new(settings: LifecycleSettings) -> Self {
        let (state, _) = watch::channel(LifecycleState::Booting);
        Self {
            settings,
            state: Arc::new(state),
            token: CancellationToken::new(),
            resources: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Token cancelled when draining starts.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Acquire a dependency and take ownership of its handle.
    ///
    /// Exhausting the retry policy is fatal to startup.
    pub async fn acquire<D: Dependency>(
        &self,
        target: &D,
        policy: &RetryPolicy,
        sleeper: &dyn Sleeper,
    ) -> Result<Arc<ConnectionHandle<D::Handle>>, LifecycleError> {
        self.expect_state(LifecycleState::Booting, "acquire dependencies")?;

        let handle = Arc::new(connector::connect(target, policy, sleeper).await?);
        self.track(handle.clone()).await;
        Ok(handle)
    }

    /// Take ownership of an already-open resource.
    pub async fn track(&self, resource: Arc<dyn ManagedResource>) {
        info!(resource = %resource.name(), "Dependency acquired");
        self.resources.lock().await.push(resource);
    }

    /// Start draining. Returns false if draining had already started.
    pub fn shutdown(&self) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        self.token.cancel();
        true
    }

    /// React to a termination signal. A signal arriving after draining began
    /// is ignored.
    pub fn handle_signal(&self) -> bool {
        if self.shutdown() {
            info!("Termination signal received, draining");
            true
        } else {
            info!("Shutdown already in progress, ignoring signal");
            false
        }
    }

    /// Serve until shutdown, then drain and release.
    ///
    /// `serve` receives a future that resolves when draining starts and must
    /// stop accepting new work at that point. If it is still running after
    /// the grace period it is aborted.
    pub async fn run<F, Fut, E>(&self, serve: F) -> Result<(), LifecycleError>
    where
        F: FnOnce(WaitForCancellationFutureOwned) -> Fut,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.expect_state(LifecycleState::Booting, "start serving")?;
        self.transition(LifecycleState::Serving);

        let signals = self.settings.listen_for_signals.then(|| {
            let lifecycle = self.clone();
            tokio::spawn(async move {
                loop {
                    wait_for_signal().await;
                    lifecycle.handle_signal();
                }
            })
        });

        let mut server = tokio::spawn(serve(self.token.clone().cancelled_owned()));

        let early_exit = tokio::select! {
            joined = &mut server => Some(joined),
            _ = self.token.cancelled() => None,
        };

        let outcome = match early_exit {
            Some(joined) => {
                warn!("Server stopped before shutdown was requested");
                self.token.cancel();
                self.transition(LifecycleState::Draining);
                flatten(joined)
            }
            None => {
                self.transition(LifecycleState::Draining);
                match tokio::time::timeout(self.settings.grace, &mut server).await {
                    Ok(joined) => flatten(joined),
                    Err(_) => {
                        warn!(grace = ?self.settings.grace, "Grace period elapsed, aborting in-flight work");
                        server.abort();
                        Ok(())
                    }
                }
            }
        };

        self.transition(LifecycleState::Stopped);
        self.release_all().await;

        if let Some(signals) = signals {
            signals.abort();
        }

        outcome
    }

    /// Stop after a failed boot, releasing whatever was acquired.
    pub async fn abort(&self) {
        self.token.cancel();
        self.transition(LifecycleState::Stopped);
        self.release_all().await;
    }

    pub async fn health(&self) -> HealthReport {
        let resources = self.resources.lock().await.clone();
        let mut report = HealthReport {
            state: self.state(),
            resources: Vec::with_capacity(resources.len()),
        };
        for resource in resources {
            report.resources.push(ResourceHealth {
                name: resource.name().to_string(),
                state: resource.state().await,
            });
        }
        report
    }

    /// Release in reverse acquisition order. Errors and timeouts are logged
    /// and never stop the remaining releases.
    async fn release_all(&self) {
        let resources = self.resources.lock().await.clone();
        let timeout = self.settings.release_timeout;

        for resource in resources.iter().rev() {
            let name = resource.name();
            match tokio::time::timeout(timeout, resource.release()).await {
                Ok(Ok(true)) => info!(resource = %name, "Dependency released"),
                Ok(Ok(false)) => {}
                Ok(Err(e)) => error!(resource = %name, error = %e, "Dependency release failed"),
                Err(_) => error!(resource = %name, timeout = ?timeout, "Dependency release timed out"),
            }
        }
    }

    fn expect_state(
        &self,
        expected: LifecycleState,
        action: &'static str,
    ) -> Result<(), LifecycleError> {
        let state = self.state();
        if state != expected {
            return Err(LifecycleError::InvalidState { action, state });
        }
        Ok(())
    }

    fn transition(&self, next: LifecycleState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!(from = ?previous, to = ?next, "Lifecycle transition");
        }
    }
}

fn flatten<E: Display>(
    joined: Result<Result<(), E>, tokio::task::JoinError>,
) -> Result<(), LifecycleError> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(LifecycleError::Server(e.to_string())),
        Err(e) => Err(LifecycleError::Server(e.to_string())),
    }
}
