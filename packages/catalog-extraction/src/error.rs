//! Typed error taxonomy for the persistence, pattern-learning and
//! markdown-tower layers.

use thiserror::Error;

/// Failures from the persistence store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("migration failed: {0}")]
    MigrationFailed(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("record not found")]
    NotFound,

    #[error("corrupt row data: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            other => StoreError::Database(other),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures from the markdown-conversion tower.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("markdown fetch failed: {0}")]
    FetchFailed(String),

    #[error("product delisted")]
    Delisted,

    #[error("response parse failed: {0}")]
    ParseFailed(String),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("both LLM providers unavailable")]
    ProvidersUnavailable,

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, ExtractionError>;

/// A single error entry recorded onto a [`crate::types::monitoring_run::MonitoringRun`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorLogEntry {
    pub retailer: String,
    pub category: Option<String>,
    pub message: String,
    pub occurred_at: chrono::DateTime<chrono::Utc>,
}
