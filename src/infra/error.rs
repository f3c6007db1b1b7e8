use thiserror::Error;

use crate::application::repos::StoreError;
use crate::config::LoadError;

/// Failures while wiring the process together, before or around resolution.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error("failed to connect settings database: {0}")]
    Connect(#[from] sqlx::Error),
    #[error("failed to apply migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("settings database unavailable: {0}")]
    Store(#[from] StoreError),
    #[error("failed to install tracing subscriber: {0}")]
    Telemetry(String),
    #[error("failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
}
