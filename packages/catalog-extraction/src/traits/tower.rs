//! The shared extraction-tower seam: both the markdown tower (this crate)
//! and the browser tower (`catalog-crawler`) implement this so the
//! dispatcher can treat them uniformly.

use async_trait::async_trait;

use crate::types::DispatchResult;

#[async_trait]
pub trait ExtractionTower: Send + Sync {
    /// Extract a single product detail page.
    async fn extract_product(&self, retailer: &str, url: &str) -> DispatchResult;

    /// Extract every product summary visible on one catalog/listing page.
    async fn extract_catalog_page(&self, retailer: &str, url: &str) -> DispatchResult;
}
