//! Authentication service adapter.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::{AdapterError, AuthAdapter, AuthResponse, HttpDownstream};
use crate::config::DownstreamDescriptor;
use crate::deadline::Deadline;
use crate::submission::AuthPayload;

const AUTHENTICATE_PATH: &str = "/register";

pub struct HttpAuthAdapter {
    downstream: HttpDownstream,
}

impl HttpAuthAdapter {
    pub fn new(descriptor: DownstreamDescriptor) -> Result<Self, AdapterError> {
        Ok(Self {
            downstream: HttpDownstream::new(descriptor)?,
        })
    }
}

#[async_trait]
impl AuthAdapter for HttpAuthAdapter {
    async fn authenticate(
        &self,
        payload: &AuthPayload,
        deadline: Deadline,
    ) -> Result<AuthResponse, AdapterError> {
        let body = self
            .downstream
            .post_json(AUTHENTICATE_PATH, payload, deadline)
            .await
            .map_err(|e| match e {
                AdapterError::Status { status: 401, .. } => AdapterError::Unauthenticated,
                other => other,
            })?;

        info!(email = %payload.email, "Credentials accepted");
        Ok(auth_response(&body))
    }
}

/// Pull the user and token out of whatever the auth service replied with.
///
/// The service wraps the user in an envelope's `data`; a bare `user` field is
/// accepted too. Anything unparseable still counts as a valid login since the
/// status already said so.
fn auth_response(body: &[u8]) -> AuthResponse {
    let reply: Value = serde_json::from_slice(body).unwrap_or(Value::Null);

    let user = reply
        .get("user")
        .or_else(|| reply.get("data"))
        .filter(|u| !u.is_null())
        .cloned();
    let token = reply
        .get("token")
        .or_else(|| user.as_ref().and_then(|u| u.get("token")))
        .and_then(Value::as_str)
        .map(str::to_string);

    AuthResponse {
        valid: true,
        user,
        token,
    }
}
