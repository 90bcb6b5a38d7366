//! Typed error taxonomy for the browser tower, crawler and orchestrator.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    #[error("anti-bot challenge could not be cleared: {0}")]
    AntiBotBlocked(String),

    #[error("product delisted")]
    Delisted,

    #[error("dispatcher exhausted both towers: {0}")]
    DispatchFailed(String),

    #[error("required credential or resource missing: {0}")]
    Fatal(String),

    #[error(transparent)]
    Extraction(#[from] catalog_extraction::ExtractionError),

    #[error(transparent)]
    Store(#[from] catalog_extraction::StoreError),
}

pub type Result<T> = std::result::Result<T, CrawlError>;
