//! Logging service adapter.

use async_trait::async_trait;
use tracing::debug;

use super::{AdapterError, HttpDownstream, LogAdapter};
use crate::config::DownstreamDescriptor;
use crate::deadline::Deadline;
use crate::submission::LogPayload;

const INGEST_PATH: &str = "/logs";

pub struct HttpLogAdapter {
    downstream: HttpDownstream,
}

impl HttpLogAdapter {
    pub fn new(descriptor: DownstreamDescriptor) -> Result<Self, AdapterError> {
        Ok(Self {
            downstream: HttpDownstream::new(descriptor)?,
        })
    }
}

#[async_trait]
impl LogAdapter for HttpLogAdapter {
    async fn record(&self, payload: &LogPayload, deadline: Deadline) -> Result<(), AdapterError> {
        self.downstream
            .post_json(INGEST_PATH, payload, deadline)
            .await?;
        debug!(name = %payload.name, "Log entry recorded");
        Ok(())
    }
}
