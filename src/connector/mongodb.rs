//! MongoDB dependency.

use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::Client;

use super::{Dependency, Releasable};

#[async_trait]
impl Releasable for Client {
    async fn release(&self) -> Result<(), String> {
        // Client is a cheap handle; shutdown consumes a clone and closes the
        // shared topology.
        self.clone().shutdown().await;
        Ok(())
    }
}

/// Document store target.
pub struct MongoTarget {
    url: String,
    database: String,
}

impl MongoTarget {
    pub fn new(url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            database: database.into(),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }
}

#[async_trait]
impl Dependency for MongoTarget {
    type Handle = Client;

    fn name(&self) -> &str {
        "mongodb"
    }

    async fn connect(&self) -> Result<Client, String> {
        Client::with_uri_str(&self.url)
            .await
            .map_err(|e| e.to_string())
    }

    async fn probe(&self, handle: &Client) -> Result<(), String> {
        handle
            .database(&self.database)
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}
