//! Mail service adapter.

use async_trait::async_trait;
use tracing::info;

use super::{AdapterError, HttpDownstream, MailAdapter, MailMessage};
use crate::config::DownstreamDescriptor;
use crate::deadline::Deadline;

const SEND_PATH: &str = "/send";

pub struct HttpMailAdapter {
    downstream: HttpDownstream,
}

impl HttpMailAdapter {
    pub fn new(descriptor: DownstreamDescriptor) -> Result<Self, AdapterError> {
        Ok(Self {
            downstream: HttpDownstream::new(descriptor)?,
        })
    }
}

#[async_trait]
impl MailAdapter for HttpMailAdapter {
    async fn send(&self, message: &MailMessage, deadline: Deadline) -> Result<(), AdapterError> {
        self.downstream
            .post_json(SEND_PATH, message, deadline)
            .await?;
        info!(to = %message.to, "Mail sent");
        Ok(())
    }
}
