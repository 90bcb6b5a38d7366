//! The Orchestrator (§4.8): top-level coordinator of a monitoring run.
//!
//! Fans out one task per (retailer, category) pair up to a configurable
//! concurrency cap, then runs the Change Detector in a single batched pass
//! once every pair has completed (§5: the barrier between crawling and
//! change detection is intentional — detection needs the full crawled set
//! to commit in crawl order).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};

use catalog_extraction::error::ErrorLogEntry;
use catalog_extraction::types::{
    Baseline, CatalogObservation, Lifecycle, MonitoringRun, RetailerConfig, RunState, RunType,
};
use catalog_extraction::{Store, StoreResult};

use crate::batch::{Batch, BatchUrlEntry};
use crate::crawler::{CatalogCrawler, CrawlOutcome};
use crate::detector::{extract_product_code, ChangeDetector};
use crate::notify::{CompletionNotice, ErrorNotice, NotificationChannel};

/// Cooperative cancellation signal threaded through a run request (§5).
/// Cloning shares the same underlying flag; cancelling any clone cancels
/// every clone.
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<tokio::sync::Notify>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)), notify: Arc::new(tokio::sync::Notify::new()) }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    async fn cancelled(&self) {
        if !self.is_cancelled() {
            self.notify.notified().await;
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RunRequest {
    pub retailers: Vec<String>,
    pub categories: Vec<String>,
    pub run_type: RunType,
}

pub struct Orchestrator {
    registry: HashMap<String, RetailerConfig>,
    crawler: Arc<CatalogCrawler>,
    detector: Arc<ChangeDetector>,
    store: Arc<dyn Store>,
    notification_channel: Arc<dyn NotificationChannel>,
    output_dir: PathBuf,
    concurrency_cap: usize,
}

impl Orchestrator {
    pub fn new(
        registry: HashMap<String, RetailerConfig>,
        crawler: Arc<CatalogCrawler>,
        store: Arc<dyn Store>,
        notification_channel: Arc<dyn NotificationChannel>,
        output_dir: PathBuf,
        concurrency_cap: usize,
    ) -> Self {
        let detector = Arc::new(ChangeDetector::new(store.clone()));
        Self { registry, crawler, detector, store, notification_channel, output_dir, concurrency_cap }
    }

    /// Runs one monitoring run to completion: crawl, detect, commit, emit.
    pub async fn run(&self, request: RunRequest, cancellation: CancellationToken) -> StoreResult<MonitoringRun> {
        let mut run = MonitoringRun::new(request.run_type, request.retailers.clone(), request.categories.clone(), chrono::Utc::now());
        run = self.store.create_monitoring_run(run).await?;

        let pairs: Vec<(RetailerConfig, String)> = request
            .retailers
            .iter()
            .filter_map(|r| self.registry.get(r).cloned())
            .flat_map(|cfg| request.categories.clone().into_iter().map(move |c| (cfg.clone(), c)))
            .collect();

        let cap = self.concurrency_cap.max(1);
        let outcomes: Vec<CrawlOutcome> = stream::iter(pairs.into_iter().map(|(cfg, category)| {
            let crawler = self.crawler.clone();
            let cancellation = cancellation.clone();
            async move { Self::run_pair(crawler, cfg, category, request.run_type, cancellation).await }
        }))
        .buffer_unordered(cap)
        .collect()
        .await;

        let any_partial = cancellation.is_cancelled() || outcomes.iter().any(|o| o.partial);
        for outcome in &outcomes {
            run.products_crawled += outcome.products.len() as u64;
            if let Some(message) = &outcome.error {
                run.record_error(ErrorLogEntry {
                    retailer: outcome.retailer.clone(),
                    category: Some(outcome.category.clone()),
                    message: message.clone(),
                    occurred_at: chrono::Utc::now(),
                });
            }
        }

        let mut batch_files = Vec::new();
        match request.run_type {
            RunType::Baseline => {
                for outcome in &outcomes {
                    self.commit_baseline(outcome).await?;
                }
            }
            RunType::Monitoring | RunType::Recheck => {
                for outcome in &outcomes {
                    if let Some(path) = self.commit_monitoring(outcome, &mut run).await? {
                        batch_files.push(path);
                    }
                }
            }
        }

        run.cancelled = cancellation.is_cancelled();
        run.finish(chrono::Utc::now(), any_partial);
        let run = self.store.update_monitoring_run(run).await?;

        self.hand_off(CompletionNotice { run: run.clone(), batch_files }).await;
        if matches!(run.state, RunState::Failed) {
            self.notification_channel
                .notify_error(ErrorNotice { run_id: Some(run.id), message: "monitoring run failed".to_string() })
                .await;
        }

        Ok(run)
    }

    /// Races one pair's crawl against the cancellation signal. On
    /// cancellation, the in-flight crawl gets a 5-second grace window
    /// before being aborted (§5).
    async fn run_pair(
        crawler: Arc<CatalogCrawler>,
        retailer_config: RetailerConfig,
        category: String,
        run_type: RunType,
        cancellation: CancellationToken,
    ) -> CrawlOutcome {
        let retailer = retailer_config.id.clone();
        let category_for_errors = category.clone();
        let mut handle = tokio::spawn(async move { crawler.crawl(&retailer_config, &category, run_type).await });

        let outcome = tokio::select! {
            biased;
            joined = &mut handle => joined,
            _ = cancellation.cancelled() => {
                match tokio::time::timeout(Duration::from_secs(5), &mut handle).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        handle.abort();
                        return CrawlOutcome {
                            retailer,
                            category: category_for_errors.clone(),
                            pages_walked: 0,
                            products: Vec::new(),
                            partial: true,
                            error: Some("cancelled".to_string()),
                        };
                    }
                }
            }
        };

        match outcome {
            Ok(Ok(crawl_outcome)) => crawl_outcome,
            Ok(Err(store_error)) => CrawlOutcome {
                retailer,
                category: category_for_errors.clone(),
                pages_walked: 0,
                products: Vec::new(),
                partial: true,
                error: Some(store_error.to_string()),
            },
            Err(join_error) => CrawlOutcome {
                retailer,
                category: category_for_errors.clone(),
                pages_walked: 0,
                products: Vec::new(),
                partial: true,
                error: Some(join_error.to_string()),
            },
        }
    }

    /// Persists every crawled product as a baseline observation and rotates
    /// the active Baseline row for this (retailer, category) (§4.1, scenario 1).
    async fn commit_baseline(&self, outcome: &CrawlOutcome) -> StoreResult<()> {
        let today = chrono::Utc::now().date_naive();
        for product in &outcome.products {
            let observation = CatalogObservation {
                id: uuid::Uuid::now_v7(),
                retailer: outcome.retailer.clone(),
                category: outcome.category.clone(),
                product_code_or_url: extract_product_code(&outcome.retailer, &product.url).unwrap_or_else(|| product.url.clone()),
                discovered_date: today,
                title: product.title.clone().unwrap_or_default(),
                price: product.price.unwrap_or(0.0),
                image_url: product.image_urls.first().cloned(),
                url: product.url.clone(),
                lifecycle: Lifecycle::Baseline,
                recorded_at: chrono::Utc::now(),
            };
            self.store.append_observation(observation).await?;
        }

        self.store
            .create_baseline(Baseline {
                id: uuid::Uuid::now_v7(),
                retailer: outcome.retailer.clone(),
                category: outcome.category.clone(),
                captured_date: today,
                pages_walked: outcome.pages_walked,
                observation_count: outcome.products.len() as u32,
                crawler_config_metadata: serde_json::json!({ "pages_walked": outcome.pages_walked }),
                active: true,
                created_at: chrono::Utc::now(),
            })
            .await?;

        Ok(())
    }

    /// Runs the Change Detector over one pair's crawled products, persists
    /// new/manual-review observations, refreshes existing products'
    /// last-seen timestamp, and writes a batch file when any product is new
    /// (§4.7, §6). Returns the batch file path, if one was written.
    async fn commit_monitoring(&self, outcome: &CrawlOutcome, run: &mut MonitoringRun) -> StoreResult<Option<PathBuf>> {
        let summary = self.detector.detect_batch(&outcome.retailer, &outcome.category, outcome.products.clone()).await?;
        let today = chrono::Utc::now().date_naive();

        for (product, _match_result) in &summary.existing {
            let existing = self.store.find_product_by_exact_url(&outcome.retailer, &product.url).await?;
            let existing = match existing {
                Some(p) => Some(p),
                None => {
                    let normalized = crate::detector::normalize_url(&outcome.retailer, &product.url);
                    self.store.find_product_by_normalized_url(&outcome.retailer, &normalized).await?
                }
            };
            if let Some(mut p) = existing {
                p.touch(chrono::Utc::now());
                self.store.upsert_product(p).await?;
            }
        }

        let mut batch_entries = Vec::new();
        for (product, _match_result) in summary.new.iter().chain(summary.manual_review.iter()) {
            let observation = CatalogObservation {
                id: uuid::Uuid::now_v7(),
                retailer: outcome.retailer.clone(),
                category: outcome.category.clone(),
                product_code_or_url: extract_product_code(&outcome.retailer, &product.url).unwrap_or_else(|| product.url.clone()),
                discovered_date: today,
                title: product.title.clone().unwrap_or_default(),
                price: product.price.unwrap_or(0.0),
                image_url: product.image_urls.first().cloned(),
                url: product.url.clone(),
                lifecycle: Lifecycle::PendingReview,
                recorded_at: chrono::Utc::now(),
            };
            self.store.append_observation(observation).await?;
        }

        for (product, _) in &summary.new {
            batch_entries.push(BatchUrlEntry {
                url: product.url.clone(),
                retailer: outcome.retailer.clone(),
                discovered_date: today,
                catalog_source: outcome.category.clone(),
            });
        }

        run.new_products_found += summary.new.len() as u64;
        run.products_queued_for_review += (summary.new.len() + summary.manual_review.len()) as u64;

        if batch_entries.is_empty() {
            return Ok(None);
        }

        let batch = Batch::new(run.id, &outcome.retailer, &outcome.category, today, batch_entries);
        let path = crate::batch::write_batch(&self.output_dir, &batch).await.map_err(|e| {
            catalog_extraction::StoreError::StoreUnavailable(format!("batch write failed: {e}"))
        })?;
        Ok(Some(path))
    }

    /// Hands the completion notice off to the notification channel, retrying
    /// with exponential backoff while the channel reports unhealthy (§5
    /// backpressure: the Orchestrator never blocks indefinitely — the batch
    /// file is already durable on disk regardless of notification success).
    async fn hand_off(&self, notice: CompletionNotice) {
        const MAX_ATTEMPTS: u32 = 3;
        for attempt in 0..MAX_ATTEMPTS {
            if self.notification_channel.health_check().await {
                self.notification_channel.notify_completion(notice).await;
                return;
            }
            tracing::warn!(attempt, "notification channel unhealthy, backing off");
            tokio::time::sleep(Duration::from_millis(200 * 2u64.pow(attempt))).await;
        }
        tracing::warn!("notification channel still unhealthy after retries; batch file(s) remain on disk for the publisher to drain");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::ExtractionDispatcher;
    use crate::notify::RecordingNotificationChannel;
    use crate::rate_limit::RateLimiterRegistry;
    use async_trait::async_trait;
    use catalog_extraction::types::{AntiBotSeverity, DispatchResult, ExtractedProduct, ExtractionMethod, PaginationMode, Tower};
    use catalog_extraction::ExtractionTower;
    use std::sync::Mutex;

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
            DispatchResult::catalog_success(pages.remove(0), ExtractionMethod::Markdown, Duration::ZERO)
        }
    }

    fn registry() -> HashMap<String, RetailerConfig> {
        let mut category_listing_urls = HashMap::new();
        category_listing_urls.insert("dresses".to_string(), "https://x.test/dresses".to_string());
        let mut registry = HashMap::new();
        registry.insert(
            "testco".to_string(),
            RetailerConfig {
                id: "testco".to_string(),
                category_listing_urls,
                category_newest_sort_urls: HashMap::new(),
                pagination_mode: PaginationMode::Paged,
                items_per_page: Some(10),
                preferred_tower: Tower::Markdown,
                anti_bot_severity: AntiBotSeverity::Low,
            },
        );
        registry
    }

    fn product(url: &str, title: &str) -> ExtractedProduct {
        ExtractedProduct { url: url.to_string(), title: Some(title.to_string()), price: Some(20.0), ..Default::default() }
    }

    #[tokio::test]
    async fn baseline_run_creates_observations_and_an_active_baseline() {
        let tower: Arc<dyn ExtractionTower> =
            Arc::new(ScriptedTower { pages: Mutex::new(vec![vec![product("https://x.test/a", "A"), product("https://x.test/b", "B")], vec![]]) });
        let dispatcher = Arc::new(ExtractionDispatcher::new(tower.clone(), tower, HashMap::new()));
        let store: Arc<dyn Store> = Arc::new(catalog_extraction::stores::MemoryStore::new());
        let rate_limiters = Arc::new(RateLimiterRegistry::new(std::iter::empty()));
        let crawler = Arc::new(CatalogCrawler::new(dispatcher, store.clone(), rate_limiters));
        let notification_channel = Arc::new(RecordingNotificationChannel::new());

        let orchestrator = Orchestrator::new(registry(), crawler, store.clone(), notification_channel.clone(), std::env::temp_dir(), 2);

        let run = orchestrator
            .run(
                RunRequest { retailers: vec!["testco".to_string()], categories: vec!["dresses".to_string()], run_type: RunType::Baseline },
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(run.state, RunState::Completed);
        assert_eq!(run.products_crawled, 2);

        let baseline = store.active_baseline("testco", "dresses").await.unwrap();
        assert!(baseline.is_some());
        assert_eq!(notification_channel.completions.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn monitoring_run_emits_a_batch_file_for_new_products() {
        let tower: Arc<dyn ExtractionTower> =
            Arc::new(ScriptedTower { pages: Mutex::new(vec![vec![product("https://x.test/new", "Brand New Item")], vec![]]) });
        let dispatcher = Arc::new(ExtractionDispatcher::new(tower.clone(), tower, HashMap::new()));
        let store: Arc<dyn Store> = Arc::new(catalog_extraction::stores::MemoryStore::new());
        let rate_limiters = Arc::new(RateLimiterRegistry::new(std::iter::empty()));
        let crawler = Arc::new(CatalogCrawler::new(dispatcher, store.clone(), rate_limiters));
        let notification_channel = Arc::new(RecordingNotificationChannel::new());

        let output_dir = std::env::temp_dir().join(format!("catalog-orchestrator-test-{}", uuid::Uuid::now_v7()));
        let orchestrator = Orchestrator::new(registry(), crawler, store.clone(), notification_channel.clone(), output_dir.clone(), 2);

        let run = orchestrator
            .run(
                RunRequest { retailers: vec!["testco".to_string()], categories: vec!["dresses".to_string()], run_type: RunType::Monitoring },
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(run.new_products_found, 1);
        assert!(output_dir.exists());
        tokio::fs::remove_dir_all(&output_dir).await.ok();
    }
}
