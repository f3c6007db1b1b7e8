//! Postgres-backed settings store and site resolver.
//!
//! One [`PostgresRepositories`] value implements both [`SettingStore`] and
//! [`SiteResolver`]; the schema lives in `migrations/`.
//!
//! [`SettingStore`]: crate::application::repos::SettingStore
//! [`SiteResolver`]: crate::application::repos::SiteResolver

mod settings;
mod sites;
mod util;

pub use util::map_sqlx_error;

use std::num::NonZeroU32;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::application::repos::StoreError;
use crate::infra::error::InfraError;

/// Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct PostgresRepositories {
    pool: PgPool,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect, apply pending migrations and check the connection.
    pub async fn open(url: &str, max_connections: NonZeroU32) -> Result<Self, InfraError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.get())
            .connect(url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;

        let repositories = Self::new(pool);
        repositories.ping().await?;
        info!(max_connections = max_connections.get(), "connected settings database");
        Ok(repositories)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(self.pool())
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }
}
