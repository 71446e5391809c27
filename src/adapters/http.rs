//! Shared HTTP plumbing for the downstream services.

use bytes::Bytes;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use super::AdapterError;
use crate::config::DownstreamDescriptor;
use crate::deadline::Deadline;

/// A configured downstream HTTP service.
pub struct HttpDownstream {
    client: Client,
    descriptor: DownstreamDescriptor,
}

impl HttpDownstream {
    pub fn new(descriptor: DownstreamDescriptor) -> Result<Self, AdapterError> {
        let client = Client::builder()
            .timeout(descriptor.timeout())
            .build()
            .map_err(|e| AdapterError::Transport {
                service: descriptor.name.clone(),
                message: e.to_string(),
            })?;

        Ok(Self { client, descriptor })
    }

    pub fn descriptor(&self) -> &DownstreamDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// POST `body` as JSON to `path` and return the response body.
    ///
    /// Fails without a request when the deadline has passed. The call is
    /// bounded by the smaller of the remaining deadline and the descriptor's
    /// timeout. Any non-2xx status is `AdapterError::Status`.
    pub async fn post_json<T>(
        &self,
        path: &str,
        body: &T,
        deadline: Deadline,
    ) -> Result<Bytes, AdapterError>
    where
        T: Serialize + ?Sized + Sync,
    {
        if deadline.is_expired() {
            return Err(AdapterError::DeadlineExceeded(self.name().to_string()));
        }

        let url = self.descriptor.endpoint(path);
        let mut request = self
            .client
            .post(&url)
            .json(body)
            .timeout(deadline.bounded(self.descriptor.timeout()));

        if let Some(credential) = &self.descriptor.credential {
            request = request.bearer_auth(credential);
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();

        if !status.is_success() {
            warn!(service = %self.name(), url = %url, status = %status, "Downstream call failed");
            return Err(AdapterError::Status {
                service: self.name().to_string(),
                status: status.as_u16(),
            });
        }

        debug!(service = %self.name(), url = %url, status = %status, "Downstream call succeeded");
        response.bytes().await.map_err(|e| self.transport_error(e))
    }

    fn transport_error(&self, err: reqwest::Error) -> AdapterError {
        if err.is_timeout() {
            AdapterError::TimedOut(self.name().to_string())
        } else {
            AdapterError::Transport {
                service: self.name().to_string(),
                message: err.to_string(),
            }
        }
    }
}
