//! The Catalog Crawler (§4.6): a base walk algorithm shared by every
//! retailer, parameterized by [`RetailerConfig`] rather than subclassed —
//! pagination-mode-specific URL computation lives in [`pagination`].

pub mod pagination;

use std::sync::Arc;
use std::time::Duration;

use catalog_extraction::types::{AntiBotSeverity, ExtractedProduct, RetailerConfig, RunType};
use catalog_extraction::{Store, StoreResult};

use crate::detector::baseline_overlap;
use crate::dispatcher::ExtractionDispatcher;
use crate::rate_limit::RateLimiterRegistry;
use pagination::{page_action, PageAction};

const DEFAULT_EARLY_STOP_THRESHOLD: u32 = 3;
const RAISED_EARLY_STOP_THRESHOLD: u32 = 8;
const MAX_PAGES: u32 = 50;

/// Result of walking one (retailer, category) pair to completion or halt.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub retailer: String,
    pub category: String,
    pub pages_walked: u32,
    pub products: Vec<ExtractedProduct>,
    /// Set when a page failed twice in a row and the walk was halted early.
    pub partial: bool,
    pub error: Option<String>,
}

pub struct CatalogCrawler {
    dispatcher: Arc<ExtractionDispatcher>,
    store: Arc<dyn Store>,
    rate_limiters: Arc<RateLimiterRegistry>,
}

impl CatalogCrawler {
    pub fn new(dispatcher: Arc<ExtractionDispatcher>, store: Arc<dyn Store>, rate_limiters: Arc<RateLimiterRegistry>) -> Self {
        Self { dispatcher, store, rate_limiters }
    }

    /// Walks a single (retailer, category) pair per the base algorithm.
    pub async fn crawl(&self, retailer_config: &RetailerConfig, category: &str, run_type: RunType) -> StoreResult<CrawlOutcome> {
        let retailer = retailer_config.id.as_str();
        let prefer_newest = matches!(run_type, RunType::Monitoring);

        let Some(base_url) = retailer_config.starting_url(category, prefer_newest) else {
            tracing::warn!(retailer, category, "no starting URL configured for this category, skipping");
            return Ok(CrawlOutcome {
                retailer: retailer.to_string(),
                category: category.to_string(),
                pages_walked: 0,
                products: Vec::new(),
                partial: false,
                error: Some("no starting URL configured".to_string()),
            });
        };
        let base_url = base_url.to_string();

        // Step 1: raise the threshold when a monitoring run can't rely on a
        // newest-first sort — a shallow baseline overlap would otherwise end
        // the walk prematurely.
        let early_stop_threshold = if prefer_newest && !retailer_config.supports_newest_sort(category) {
            RAISED_EARLY_STOP_THRESHOLD
        } else {
            DEFAULT_EARLY_STOP_THRESHOLD
        };

        let baseline_observations = self.store.list_baseline_observations(retailer, category).await?;

        let mut products = Vec::new();
        let mut consecutive_overlap = 0u32;
        let mut pages_walked = 0u32;
        let mut partial = false;
        let mut error = None;

        for page_index in 1..=MAX_PAGES {
            let action = page_action(retailer_config.pagination_mode, &base_url, page_index, retailer_config.items_per_page);
            let url = match &action {
                PageAction::Url(u) => u.clone(),
                PageAction::SinglePageOnly(u) => u.clone(),
            };

            self.rate_limiters.acquire(retailer).await;

            let page_products = match self.fetch_page_with_retry(retailer, &url).await {
                Ok(products) => products,
                Err(message) => {
                    tracing::warn!(retailer, category, page_index, %message, "page failed twice, halting walk");
                    partial = true;
                    error = Some(message);
                    break;
                }
            };

            pages_walked += 1;

            if page_products.is_empty() {
                tracing::info!(retailer, category, page_index, "page yielded zero products, stopping walk");
                break;
            }

            // Step 2/3: classify each product as baseline-overlap vs. new,
            // accumulating the consecutive-overlap counter.
            for product in &page_products {
                if baseline_overlap(retailer, product, &baseline_observations) {
                    consecutive_overlap += 1;
                } else {
                    consecutive_overlap = 0;
                }
            }
            products.extend(page_products);

            if consecutive_overlap >= early_stop_threshold {
                tracing::info!(retailer, category, page_index, consecutive_overlap, "early-stop threshold reached");
                break;
            }

            if matches!(action, PageAction::SinglePageOnly(_)) {
                // Degenerate single-page case (infinite-scroll retailers):
                // the browser tower already captured everything rendered.
                break;
            }

            self.pace(retailer_config).await;
        }

        Ok(CrawlOutcome {
            retailer: retailer.to_string(),
            category: category.to_string(),
            pages_walked,
            products,
            partial,
            error,
        })
    }

    /// A single failed page is retried once; a second failure halts the
    /// walk for this pair (§4.6 failure semantics).
    async fn fetch_page_with_retry(&self, retailer: &str, url: &str) -> Result<Vec<ExtractedProduct>, String> {
        for attempt in 0..2 {
            let result = self.dispatcher.extract_catalog_page(retailer, url).await;
            if result.success {
                return Ok(result.products);
            }
            tracing::warn!(retailer, url, attempt, errors = ?result.errors, "catalog page extraction failed");
        }
        Err(format!("page extraction failed twice for {url}"))
    }

    /// Jittered inter-page pacing sized by anti-bot severity (§4.6 step 4).
    /// Uses the same deterministic pseudo-random approach as the markdown
    /// client rather than pulling in a `rand` dependency.
    async fn pace(&self, retailer_config: &RetailerConfig) {
        let seed = retailer_config.id.bytes().fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
        let jitter = pseudo_random(seed);
        let (base_secs, spread_secs) = match retailer_config.anti_bot_severity {
            AntiBotSeverity::Low => (1.0, 1.0),
            AntiBotSeverity::Medium => (1.5, 1.5),
            AntiBotSeverity::High => (3.0, 3.0),
            AntiBotSeverity::VeryHigh => (6.0, 6.0),
        };
        tokio::time::sleep(Duration::from_secs_f64(base_secs + jitter * spread_secs)).await;
    }
}

fn pseudo_random(seed: u32) -> f64 {
    let x = (seed.wrapping_mul(2654435761) ^ 0x9E3779B9) as f64;
    (x / u32::MAX as f64).fract().abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use catalog_extraction::types::{DispatchResult, ExtractionMethod, PaginationMode, Tower};
    use catalog_extraction::ExtractionTower;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// A fake catalog tower that returns a fixed sequence of pages, one
    /// `Vec<ExtractedProduct>` per call, looping on the last page forever.
    struct ScriptedTower {
        pages: Mutex<Vec<Vec<ExtractedProduct>>>,
    }

    #[async_trait]
    impl ExtractionTower for ScriptedTower {
        async fn extract_product(&self, _retailer: &str, _url: &str) -> DispatchResult {
            DispatchResult::failure(ExtractionMethod::Markdown, "not used".into(), false, Duration::ZERO)
        }

        async fn extract_catalog_page(&self, _retailer: &str, _url: &str) -> DispatchResult {
            let mut pages = self.pages.lock().unwrap();
            if pages.is_empty() {
                return DispatchResult::catalog_success(Vec::new(), ExtractionMethod::Markdown, Duration::ZERO);
            }
            let page = pages.remove(0);
            DispatchResult::catalog_success(page, ExtractionMethod::Markdown, Duration::ZERO)
        }
    }

    fn retailer_config(pagination_mode: PaginationMode) -> RetailerConfig {
        let mut category_listing_urls = HashMap::new();
        category_listing_urls.insert("dresses".to_string(), "https://x.test/dresses".to_string());
        RetailerConfig {
            id: "testco".to_string(),
            category_listing_urls,
            category_newest_sort_urls: HashMap::new(),
            pagination_mode,
            items_per_page: Some(10),
            preferred_tower: Tower::Markdown,
            anti_bot_severity: AntiBotSeverity::Low,
        }
    }

    fn product(url: &str, title: &str) -> ExtractedProduct {
        ExtractedProduct { url: url.to_string(), title: Some(title.to_string()), ..Default::default() }
    }

    fn build_crawler(pages: Vec<Vec<ExtractedProduct>>) -> CatalogCrawler {
        let tower: Arc<dyn ExtractionTower> = Arc::new(ScriptedTower { pages: Mutex::new(pages) });
        let dispatcher = Arc::new(ExtractionDispatcher::new(tower.clone(), tower, HashMap::new()));
        let store = Arc::new(catalog_extraction::stores::MemoryStore::new());
        let rate_limiters = Arc::new(RateLimiterRegistry::new(std::iter::empty()));
        CatalogCrawler::new(dispatcher, store, rate_limiters)
    }

    #[tokio::test]
    async fn stops_after_a_zero_product_page() {
        let crawler = build_crawler(vec![vec![product("https://x.test/a", "A")], vec![]]);
        let config = retailer_config(PaginationMode::Paged);
        let outcome = crawler.crawl(&config, "dresses", RunType::Baseline).await.unwrap();
        assert_eq!(outcome.pages_walked, 1);
        assert_eq!(outcome.products.len(), 1);
        assert!(!outcome.partial);
    }

    #[tokio::test]
    async fn infinite_scroll_walks_exactly_one_page() {
        let crawler = build_crawler(vec![vec![product("https://x.test/a", "A"), product("https://x.test/b", "B")]]);
        let config = retailer_config(PaginationMode::InfiniteScroll);
        let outcome = crawler.crawl(&config, "dresses", RunType::Baseline).await.unwrap();
        assert_eq!(outcome.pages_walked, 1);
        assert_eq!(outcome.products.len(), 2);
    }

    #[tokio::test]
    async fn stops_once_consecutive_overlap_reaches_threshold() {
        let baseline_product = product("https://x.test/baseline", "Existing Dress");
        let crawler = build_crawler(vec![
            vec![baseline_product.clone(), baseline_product.clone(), baseline_product.clone()],
            vec![product("https://x.test/should-not-be-reached", "Never")],
        ]);
        let config = retailer_config(PaginationMode::Paged);

        let baseline_observation = catalog_extraction::types::CatalogObservation {
            id: uuid::Uuid::now_v7(),
            retailer: "testco".to_string(),
            category: "dresses".to_string(),
            product_code_or_url: baseline_product.url.clone(),
            discovered_date: chrono::Utc::now().date_naive(),
            title: "Existing Dress".to_string(),
            price: 10.0,
            image_url: None,
            url: baseline_product.url.clone(),
            lifecycle: catalog_extraction::types::Lifecycle::Baseline,
            recorded_at: chrono::Utc::now(),
        };
        crawler.store.append_observation(baseline_observation).await.unwrap();

        let outcome = crawler.crawl(&config, "dresses", RunType::Baseline).await.unwrap();
        assert_eq!(outcome.pages_walked, 1, "walk should stop within the first page once overlap hits the threshold");
    }

    #[tokio::test]
    async fn missing_starting_url_is_reported_without_walking() {
        let crawler = build_crawler(vec![]);
        let config = retailer_config(PaginationMode::Paged);
        let outcome = crawler.crawl(&config, "unknown_category", RunType::Baseline).await.unwrap();
        assert_eq!(outcome.pages_walked, 0);
        assert!(outcome.error.is_some());
    }
}
