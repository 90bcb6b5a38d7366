//! In-memory store, useful for unit tests that don't need SQLite's
//! migration/connection overhead.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::traits::store::{price_bucket, Store, StoreStatistics};
use crate::types::{
    Baseline, CatalogObservation, LearnedPattern, MarkdownCacheEntry, MonitoringRun, Product,
};

#[derive(Default)]
pub struct MemoryStore {
    products: RwLock<HashMap<Uuid, Product>>,
    observations: RwLock<Vec<CatalogObservation>>,
    baselines: RwLock<Vec<Baseline>>,
    runs: RwLock<HashMap<Uuid, MonitoringRun>>,
    patterns: RwLock<HashMap<(String, String, String, String), LearnedPattern>>,
    markdown_cache: RwLock<HashMap<String, MarkdownCacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_product(&self, product: Product) -> StoreResult<Product> {
        self.products.write().unwrap().insert(product.id, product.clone());
        Ok(product)
    }

    async fn find_product_by_exact_url(&self, retailer: &str, url: &str) -> StoreResult<Option<Product>> {
        Ok(self
            .products
            .read()
            .unwrap()
            .values()
            .find(|p| p.retailer == retailer && p.canonical_url == url)
            .cloned())
    }

    async fn find_product_by_normalized_url(&self, retailer: &str, normalized_url: &str) -> StoreResult<Option<Product>> {
        Ok(self
            .products
            .read()
            .unwrap()
            .values()
            .find(|p| p.retailer == retailer && p.normalized_url == normalized_url)
            .cloned())
    }

    async fn find_product_by_code(&self, retailer: &str, product_code: &str) -> StoreResult<Option<Product>> {
        Ok(self
            .products
            .read()
            .unwrap()
            .values()
            .find(|p| p.retailer == retailer && p.product_code.as_deref() == Some(product_code))
            .cloned())
    }

    async fn find_products_by_price_bucket(&self, retailer: &str, price: f64) -> StoreResult<Vec<Product>> {
        let bucket = price_bucket(price);
        Ok(self
            .products
            .read()
            .unwrap()
            .values()
            .filter(|p| p.retailer == retailer && price_bucket(p.current_price) == bucket)
            .cloned()
            .collect())
    }

    async fn find_products_by_image_token(&self, retailer: &str, token: &str) -> StoreResult<Vec<Product>> {
        Ok(self
            .products
            .read()
            .unwrap()
            .values()
            .filter(|p| p.retailer == retailer && p.image_urls.iter().any(|u| u.contains(token)))
            .cloned()
            .collect())
    }

    async fn list_baseline_observations(&self, retailer: &str, category: &str) -> StoreResult<Vec<CatalogObservation>> {
        self.list_observations_by_lifecycle(retailer, category, crate::types::Lifecycle::Baseline).await
    }

    async fn list_observations_by_lifecycle(
        &self,
        retailer: &str,
        category: &str,
        lifecycle: crate::types::Lifecycle,
    ) -> StoreResult<Vec<CatalogObservation>> {
        Ok(self
            .observations
            .read()
            .unwrap()
            .iter()
            .filter(|o| o.retailer == retailer && o.category == category && o.lifecycle == lifecycle)
            .cloned()
            .collect())
    }

    async fn append_observation(&self, observation: CatalogObservation) -> StoreResult<CatalogObservation> {
        self.observations.write().unwrap().push(observation.clone());
        Ok(observation)
    }

    async fn create_baseline(&self, baseline: Baseline) -> StoreResult<Baseline> {
        let mut baselines = self.baselines.write().unwrap();
        for b in baselines.iter_mut() {
            if b.retailer == baseline.retailer && b.category == baseline.category {
                b.active = false;
            }
        }
        let baseline = Baseline { active: true, ..baseline };
        baselines.push(baseline.clone());
        Ok(baseline)
    }

    async fn active_baseline(&self, retailer: &str, category: &str) -> StoreResult<Option<Baseline>> {
        Ok(self
            .baselines
            .read()
            .unwrap()
            .iter()
            .find(|b| b.retailer == retailer && b.category == category && b.active)
            .cloned())
    }

    async fn create_monitoring_run(&self, run: MonitoringRun) -> StoreResult<MonitoringRun> {
        self.runs.write().unwrap().insert(run.id, run.clone());
        Ok(run)
    }

    async fn update_monitoring_run(&self, run: MonitoringRun) -> StoreResult<MonitoringRun> {
        self.runs.write().unwrap().insert(run.id, run.clone());
        Ok(run)
    }

    async fn get_monitoring_run(&self, id: Uuid) -> StoreResult<Option<MonitoringRun>> {
        Ok(self.runs.read().unwrap().get(&id).cloned())
    }

    async fn get_statistics(&self) -> StoreResult<StoreStatistics> {
        Ok(StoreStatistics {
            product_count: self.products.read().unwrap().len() as u64,
            observation_count: self.observations.read().unwrap().len() as u64,
            active_baseline_count: self.baselines.read().unwrap().iter().filter(|b| b.active).count() as u64,
            monitoring_run_count: self.runs.read().unwrap().len() as u64,
        })
    }

    async fn get_cached_markdown(&self, url: &str) -> StoreResult<Option<MarkdownCacheEntry>> {
        Ok(self.markdown_cache.read().unwrap().get(url).cloned())
    }

    async fn put_cached_markdown(&self, entry: MarkdownCacheEntry) -> StoreResult<()> {
        self.markdown_cache.write().unwrap().insert(entry.url.clone(), entry);
        Ok(())
    }

    async fn list_patterns(&self, retailer: &str) -> StoreResult<Vec<LearnedPattern>> {
        Ok(self
            .patterns
            .read()
            .unwrap()
            .values()
            .filter(|p| p.retailer == retailer)
            .cloned()
            .collect())
    }

    async fn upsert_pattern(&self, pattern: LearnedPattern) -> StoreResult<LearnedPattern> {
        let key = (
            pattern.retailer.clone(),
            format!("{:?}", pattern.element_type),
            format!("{:?}", pattern.pattern_kind),
            pattern.payload.clone(),
        );
        self.patterns.write().unwrap().insert(key, pattern.clone());
        Ok(pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_store_returns_empty_lists_without_error() {
        let store = MemoryStore::new();
        assert!(store.list_baseline_observations("revolve", "dresses").await.unwrap().is_empty());
        assert!(store.list_patterns("revolve").await.unwrap().is_empty());
        assert!(store.find_product_by_exact_url("revolve", "https://x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lifecycle_filter_separates_pending_review_from_baseline() {
        use crate::types::Lifecycle;

        let store = MemoryStore::new();
        let now = chrono::Utc::now();
        let base = CatalogObservation {
            id: Uuid::now_v7(),
            retailer: "revolve".into(),
            category: "dresses".into(),
            product_code_or_url: "https://revolve.com/p/1".into(),
            discovered_date: now.date_naive(),
            title: "Wrap Dress".into(),
            price: 49.99,
            image_url: None,
            url: "https://revolve.com/p/1".into(),
            lifecycle: Lifecycle::Baseline,
            recorded_at: now,
        };
        let pending = CatalogObservation { id: Uuid::now_v7(), lifecycle: Lifecycle::PendingReview, ..base.clone() };
        store.append_observation(base).await.unwrap();
        store.append_observation(pending).await.unwrap();

        let baseline_only = store.list_baseline_observations("revolve", "dresses").await.unwrap();
        assert_eq!(baseline_only.len(), 1);
        assert_eq!(baseline_only[0].lifecycle, Lifecycle::Baseline);

        let pending_only = store
            .list_observations_by_lifecycle("revolve", "dresses", Lifecycle::PendingReview)
            .await
            .unwrap();
        assert_eq!(pending_only.len(), 1);
        assert_eq!(pending_only[0].lifecycle, Lifecycle::PendingReview);
    }
}
