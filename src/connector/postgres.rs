//! PostgreSQL dependency.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::{Dependency, Releasable};

const MAX_CONNECTIONS: u32 = 5;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
impl Releasable for PgPool {
    async fn release(&self) -> Result<(), String> {
        self.close().await;
        Ok(())
    }
}

/// Relational store target.
pub struct PostgresTarget {
    url: String,
}

impl PostgresTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Dependency for PostgresTarget {
    type Handle = PgPool;

    fn name(&self) -> &str {
        "postgres"
    }

    async fn connect(&self) -> Result<PgPool, String> {
        PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(&self.url)
            .await
            .map_err(|e| e.to_string())
    }

    async fn probe(&self, handle: &PgPool) -> Result<(), String> {
        sqlx::query("SELECT 1")
            .execute(handle)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}
