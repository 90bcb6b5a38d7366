//! The persistence store trait (§4.1).
//!
//! One typed API over the entity set. Every write is atomic at the
//! single-row level; multi-row commits (baseline rotation) use a single
//! transaction so concurrent readers never observe a partial rotation.

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::types::{Baseline, CatalogObservation, MonitoringRun, Product};

#[derive(Debug, Clone, Default)]
pub struct StoreStatistics {
    pub product_count: u64,
    pub observation_count: u64,
    pub active_baseline_count: u64,
    pub monitoring_run_count: u64,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn upsert_product(&self, product: Product) -> StoreResult<Product>;

    async fn find_product_by_exact_url(&self, retailer: &str, url: &str) -> StoreResult<Option<Product>>;

    async fn find_product_by_normalized_url(&self, retailer: &str, normalized_url: &str) -> StoreResult<Option<Product>>;

    async fn find_product_by_code(&self, retailer: &str, product_code: &str) -> StoreResult<Option<Product>>;

    /// Candidates within the retailer's rounded price bucket; title
    /// similarity is computed at the application layer (the change
    /// detector), not in the store.
    async fn find_products_by_price_bucket(&self, retailer: &str, price: f64) -> StoreResult<Vec<Product>>;

    /// Candidates whose stored `image_urls` contain a filename token
    /// extracted from a newly crawled product's image URL (§4.7 image
    /// identifier method — a future-ready placeholder the spec describes
    /// concretely enough to implement: compare filename tokens, not raw
    /// URLs, since CDN query parameters vary run to run).
    async fn find_products_by_image_token(&self, retailer: &str, token: &str) -> StoreResult<Vec<Product>>;

    async fn list_baseline_observations(&self, retailer: &str, category: &str) -> StoreResult<Vec<CatalogObservation>>;

    /// Observations in a given lifecycle state (the reviewer interface's
    /// read path over `pending-review`, §3) — distinct from
    /// [`Store::list_baseline_observations`], which is hardcoded to
    /// `lifecycle = baseline` for the Change Detector's own lookups.
    async fn list_observations_by_lifecycle(
        &self,
        retailer: &str,
        category: &str,
        lifecycle: crate::types::Lifecycle,
    ) -> StoreResult<Vec<CatalogObservation>>;

    async fn append_observation(&self, observation: CatalogObservation) -> StoreResult<CatalogObservation>;

    /// Atomically deactivates the prior baseline (if any) and inserts the
    /// new one, within a single transaction (§4.1 contract).
    async fn create_baseline(&self, baseline: Baseline) -> StoreResult<Baseline>;

    async fn active_baseline(&self, retailer: &str, category: &str) -> StoreResult<Option<Baseline>>;

    async fn create_monitoring_run(&self, run: MonitoringRun) -> StoreResult<MonitoringRun>;

    async fn update_monitoring_run(&self, run: MonitoringRun) -> StoreResult<MonitoringRun>;

    async fn get_monitoring_run(&self, id: Uuid) -> StoreResult<Option<MonitoringRun>>;

    async fn get_statistics(&self) -> StoreResult<StoreStatistics>;

    // --- Markdown cache ---------------------------------------------------

    async fn get_cached_markdown(&self, url: &str) -> StoreResult<Option<crate::types::MarkdownCacheEntry>>;

    async fn put_cached_markdown(&self, entry: crate::types::MarkdownCacheEntry) -> StoreResult<()>;

    // --- Pattern learner table ---------------------------------------------

    async fn list_patterns(&self, retailer: &str) -> StoreResult<Vec<crate::types::LearnedPattern>>;

    async fn upsert_pattern(&self, pattern: crate::types::LearnedPattern) -> StoreResult<crate::types::LearnedPattern>;
}

/// Helper shared by stores to bucket a price for the title-price matcher's
/// index (rounded to the nearest cent-pair, i.e. 10 cents).
pub fn price_bucket(price: f64) -> i64 {
    (price * 10.0).round() as i64
}

/// Helper to format today's date consistently across store backends.
pub fn today() -> NaiveDate {
    chrono::Utc::now().date_naive()
}
