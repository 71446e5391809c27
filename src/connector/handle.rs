//! Shared dependency handle with an explicit open/closing/closed state.
//!
//! Borrowers take the state lock shared and keep it for the duration of the
//! borrow; release takes it exclusively to flip `Open -> Closing`, so a release
//! waits for in-flight borrows and no borrower ever sees a half-closed handle.
//! Any borrow after that point fails with `ResourceError::ServiceClosed`.

use std::ops::Deref;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::debug;

/// Lifecycle of a shared dependency handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceState {
    Open,
    Closing,
    Closed,
}

/// Errors from borrowing a handle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResourceError {
    #[error("{0} service is closed")]
    ServiceClosed(String),
}

/// A live connection that can be shut down.
#[async_trait]
pub trait Releasable: Send + Sync {
    async fn release(&self) -> Result<(), String>;
}

/// Type-erased view of a handle, used by the lifecycle coordinator and the
/// health endpoint.
#[async_trait]
pub trait ManagedResource: Send + Sync {
    fn name(&self) -> &str;

    async fn state(&self) -> ResourceState;

    /// Release the underlying connection.
    ///
    /// Returns `Ok(false)` when the handle was already closing or closed.
    async fn release(&self) -> Result<bool, String>;
}

/// Handle to a live dependency, owned by the lifecycle coordinator and
/// borrowed by adapters.
pub struct ConnectionHandle<T> {
    name: String,
    state: RwLock<ResourceState>,
    inner: T,
}

/// Borrow of an open handle. Holds the shared state lock until dropped.
pub struct HandleGuard<'a, T> {
    _state: RwLockReadGuard<'a, ResourceState>,
    inner: &'a T,
}

impl<T> Deref for HandleGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.inner
    }
}

impl<T: Releasable> ConnectionHandle<T> {
    pub fn new(name: impl Into<String>, inner: T) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(ResourceState::Open),
            inner,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Borrow the connection if it is still open.
    pub async fn borrow(&self) -> Result<HandleGuard<'_, T>, ResourceError> {
        let state = self.state.read().await;
        if *state != ResourceState::Open {
            return Err(ResourceError::ServiceClosed(self.name.clone()));
        }
        Ok(HandleGuard {
            _state: state,
            inner: &self.inner,
        })
    }

    pub async fn current_state(&self) -> ResourceState {
        *self.state.read().await
    }

    /// Close the connection. Idempotent under concurrent callers: only the
    /// caller that performs the `Open -> Closing` transition releases.
    pub async fn close(&self) -> Result<bool, String> {
        {
            let mut state = self.state.write().await;
            if *state != ResourceState::Open {
                debug!(resource = %self.name, state = ?*state, "Release skipped, not open");
                return Ok(false);
            }
            *state = ResourceState::Closing;
        }

        let result = self.inner.release().await;
        *self.state.write().await = ResourceState::Closed;
        result.map(|()| true)
    }
}

#[async_trait]
impl<T: Releasable> ManagedResource for ConnectionHandle<T> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn state(&self) -> ResourceState {
        self.current_state().await
    }

    async fn release(&self) -> Result<bool, String> {
        self.close().await
    }
}
