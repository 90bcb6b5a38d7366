//! SQLite-backed persistence store.
//!
//! The embedded relational store for portability mandated by §4.1: a
//! single on-disk file holding every entity table plus the markdown cache.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, Row};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::traits::store::{price_bucket, Store, StoreStatistics};
use crate::types::{
    Baseline, CatalogObservation, ElementType, LearnedPattern, Lifecycle, MarkdownCacheEntry,
    MonitoringRun, PatternKind, Product, RunState, RunType, StockState,
};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn new(database_url: &str) -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::StoreUnavailable(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    pub async fn in_memory() -> StoreResult<Self> {
        Self::new("sqlite::memory:").await
    }

    async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS products (
                id TEXT PRIMARY KEY,
                retailer TEXT NOT NULL,
                product_code TEXT,
                normalized_url TEXT NOT NULL,
                canonical_url TEXT NOT NULL,
                title TEXT NOT NULL,
                brand TEXT,
                current_price REAL NOT NULL,
                original_price REAL,
                currency TEXT NOT NULL DEFAULT 'USD',
                on_sale INTEGER NOT NULL DEFAULT 0,
                stock_state TEXT NOT NULL DEFAULT 'in_stock',
                category TEXT NOT NULL,
                image_urls TEXT NOT NULL DEFAULT '[]',
                description TEXT,
                neckline TEXT,
                sleeve_length TEXT,
                first_seen TEXT NOT NULL,
                last_seen TEXT NOT NULL,
                last_updated TEXT NOT NULL,
                price_bucket INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_products_retailer_url ON products(retailer, canonical_url);
            CREATE INDEX IF NOT EXISTS idx_products_retailer_code ON products(retailer, product_code);
            CREATE INDEX IF NOT EXISTS idx_products_retailer_bucket ON products(retailer, price_bucket);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS catalog_observations (
                id TEXT PRIMARY KEY,
                retailer TEXT NOT NULL,
                category TEXT NOT NULL,
                product_code_or_url TEXT NOT NULL,
                discovered_date TEXT NOT NULL,
                title TEXT NOT NULL,
                price REAL NOT NULL,
                image_url TEXT,
                url TEXT NOT NULL,
                lifecycle TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_observations_retailer_category_date
                ON catalog_observations(retailer, category, discovered_date);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS baselines (
                id TEXT PRIMARY KEY,
                retailer TEXT NOT NULL,
                category TEXT NOT NULL,
                captured_date TEXT NOT NULL,
                pages_walked INTEGER NOT NULL,
                observation_count INTEGER NOT NULL,
                crawler_config_metadata TEXT NOT NULL DEFAULT '{}',
                active INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_baselines_active ON baselines(retailer, category, active);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS monitoring_runs (
                id TEXT PRIMARY KEY,
                run_type TEXT NOT NULL,
                retailers TEXT NOT NULL,
                categories TEXT NOT NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT,
                products_crawled INTEGER NOT NULL DEFAULT 0,
                new_products_found INTEGER NOT NULL DEFAULT 0,
                products_queued_for_review INTEGER NOT NULL DEFAULT 0,
                state TEXT NOT NULL,
                cancelled INTEGER NOT NULL DEFAULT 0,
                error_log TEXT NOT NULL DEFAULT '[]'
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS learned_patterns (
                id TEXT PRIMARY KEY,
                retailer TEXT NOT NULL,
                element_type TEXT NOT NULL,
                pattern_kind TEXT NOT NULL,
                payload TEXT NOT NULL,
                success_count INTEGER NOT NULL DEFAULT 0,
                failure_count INTEGER NOT NULL DEFAULT 0,
                confidence REAL NOT NULL DEFAULT 0.7,
                visual_hints TEXT,
                last_failure_category TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(retailer, element_type, pattern_kind, payload)
            );
            CREATE INDEX IF NOT EXISTS idx_patterns_retailer ON learned_patterns(retailer, element_type);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS markdown_cache (
                url TEXT PRIMARY KEY,
                markdown TEXT NOT NULL,
                canonical_url TEXT NOT NULL,
                captured_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(())
    }
}

fn stock_state_to_str(s: StockState) -> &'static str {
    match s {
        StockState::InStock => "in_stock",
        StockState::Low => "low",
        StockState::Out => "out",
    }
}

fn stock_state_from_str(s: &str) -> StockState {
    match s {
        "low" => StockState::Low,
        "out" => StockState::Out,
        _ => StockState::InStock,
    }
}

fn lifecycle_to_str(l: Lifecycle) -> &'static str {
    match l {
        Lifecycle::Baseline => "baseline",
        Lifecycle::PendingReview => "pending_review",
        Lifecycle::Approved => "approved",
        Lifecycle::Rejected => "rejected",
        Lifecycle::Promoted => "promoted",
    }
}

fn lifecycle_from_str(s: &str) -> Lifecycle {
    match s {
        "pending_review" => Lifecycle::PendingReview,
        "approved" => Lifecycle::Approved,
        "rejected" => Lifecycle::Rejected,
        "promoted" => Lifecycle::Promoted,
        _ => Lifecycle::Baseline,
    }
}

fn run_type_to_str(t: RunType) -> &'static str {
    match t {
        RunType::Baseline => "baseline",
        RunType::Monitoring => "monitoring",
        RunType::Recheck => "recheck",
    }
}

fn run_type_from_str(s: &str) -> RunType {
    match s {
        "monitoring" => RunType::Monitoring,
        "recheck" => RunType::Recheck,
        _ => RunType::Baseline,
    }
}

fn run_state_to_str(s: RunState) -> &'static str {
    match s {
        RunState::Running => "running",
        RunState::Completed => "completed",
        RunState::Failed => "failed",
        RunState::Partial => "partial",
    }
}

fn run_state_from_str(s: &str) -> RunState {
    match s {
        "completed" => RunState::Completed,
        "failed" => RunState::Failed,
        "partial" => RunState::Partial,
        _ => RunState::Running,
    }
}

fn element_type_to_str(e: ElementType) -> &'static str {
    match e {
        ElementType::ProductLink => "product_link",
        ElementType::Title => "title",
        ElementType::Price => "price",
        ElementType::Image => "image",
        ElementType::Description => "description",
        ElementType::PaginationNext => "pagination_next",
        ElementType::LoadMoreButton => "load_more_button",
        ElementType::AntiBotBypass => "anti_bot_bypass",
    }
}

fn element_type_from_str(s: &str) -> ElementType {
    match s {
        "title" => ElementType::Title,
        "price" => ElementType::Price,
        "image" => ElementType::Image,
        "description" => ElementType::Description,
        "pagination_next" => ElementType::PaginationNext,
        "load_more_button" => ElementType::LoadMoreButton,
        "anti_bot_bypass" => ElementType::AntiBotBypass,
        _ => ElementType::ProductLink,
    }
}

fn pattern_kind_to_str(k: PatternKind) -> &'static str {
    match k {
        PatternKind::SelectorHint => "selector_hint",
        PatternKind::UrlTransform => "url_transform",
        PatternKind::PlaceholderExclusion => "placeholder_exclusion",
    }
}

fn pattern_kind_from_str(s: &str) -> PatternKind {
    match s {
        "url_transform" => PatternKind::UrlTransform,
        "placeholder_exclusion" => PatternKind::PlaceholderExclusion,
        _ => PatternKind::SelectorHint,
    }
}

#[derive(FromRow)]
struct ProductRow {
    id: String,
    retailer: String,
    product_code: Option<String>,
    normalized_url: String,
    canonical_url: String,
    title: String,
    brand: Option<String>,
    current_price: f64,
    original_price: Option<f64>,
    currency: String,
    on_sale: i64,
    stock_state: String,
    category: String,
    image_urls: String,
    description: Option<String>,
    neckline: Option<String>,
    sleeve_length: Option<String>,
    first_seen: String,
    last_seen: String,
    last_updated: String,
}

impl ProductRow {
    fn into_product(self) -> StoreResult<Product> {
        Ok(Product {
            id: Uuid::parse_str(&self.id).map_err(|e| StoreError::Corrupt(e.to_string()))?,
            retailer: self.retailer,
            product_code: self.product_code,
            normalized_url: self.normalized_url,
            canonical_url: self.canonical_url,
            title: self.title,
            brand: self.brand,
            current_price: self.current_price,
            original_price: self.original_price,
            currency: self.currency,
            on_sale: self.on_sale != 0,
            stock_state: stock_state_from_str(&self.stock_state),
            category: self.category,
            image_urls: serde_json::from_str(&self.image_urls).unwrap_or_default(),
            description: self.description,
            neckline: self.neckline,
            sleeve_length: self.sleeve_length,
            first_seen: parse_ts(&self.first_seen),
            last_seen: parse_ts(&self.last_seen),
            last_updated: parse_ts(&self.last_updated),
        })
    }
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_product(&self, product: Product) -> StoreResult<Product> {
        let image_urls = serde_json::to_string(&product.image_urls)?;
        sqlx::query(
            r#"
            INSERT INTO products (
                id, retailer, product_code, normalized_url, canonical_url, title, brand,
                current_price, original_price, currency, on_sale, stock_state, category,
                image_urls, description, neckline, sleeve_length, first_seen, last_seen,
                last_updated, price_bucket
            ) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                brand = excluded.brand,
                current_price = excluded.current_price,
                original_price = excluded.original_price,
                on_sale = excluded.on_sale,
                stock_state = excluded.stock_state,
                image_urls = excluded.image_urls,
                description = excluded.description,
                last_seen = excluded.last_seen,
                last_updated = excluded.last_updated,
                price_bucket = excluded.price_bucket
            "#,
        )
        .bind(product.id.to_string())
        .bind(&product.retailer)
        .bind(&product.product_code)
        .bind(&product.normalized_url)
        .bind(&product.canonical_url)
        .bind(&product.title)
        .bind(&product.brand)
        .bind(product.current_price)
        .bind(product.original_price)
        .bind(&product.currency)
        .bind(product.on_sale as i64)
        .bind(stock_state_to_str(product.stock_state))
        .bind(&product.category)
        .bind(image_urls)
        .bind(&product.description)
        .bind(&product.neckline)
        .bind(&product.sleeve_length)
        .bind(product.first_seen.to_rfc3339())
        .bind(product.last_seen.to_rfc3339())
        .bind(product.last_updated.to_rfc3339())
        .bind(price_bucket(product.current_price))
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(product)
    }

    async fn find_product_by_exact_url(&self, retailer: &str, url: &str) -> StoreResult<Option<Product>> {
        let row: Option<ProductRow> = sqlx::query_as(
            "SELECT id, retailer, product_code, normalized_url, canonical_url, title, brand, current_price, original_price, currency, on_sale, stock_state, category, image_urls, description, neckline, sleeve_length, first_seen, last_seen, last_updated FROM products WHERE retailer = ? AND canonical_url = ?",
        )
        .bind(retailer)
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;
        row.map(ProductRow::into_product).transpose()
    }

    async fn find_product_by_normalized_url(&self, retailer: &str, normalized_url: &str) -> StoreResult<Option<Product>> {
        let row: Option<ProductRow> = sqlx::query_as(
            "SELECT id, retailer, product_code, normalized_url, canonical_url, title, brand, current_price, original_price, currency, on_sale, stock_state, category, image_urls, description, neckline, sleeve_length, first_seen, last_seen, last_updated FROM products WHERE retailer = ? AND normalized_url = ?",
        )
        .bind(retailer)
        .bind(normalized_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;
        row.map(ProductRow::into_product).transpose()
    }

    async fn find_product_by_code(&self, retailer: &str, product_code: &str) -> StoreResult<Option<Product>> {
        let row: Option<ProductRow> = sqlx::query_as(
            "SELECT id, retailer, product_code, normalized_url, canonical_url, title, brand, current_price, original_price, currency, on_sale, stock_state, category, image_urls, description, neckline, sleeve_length, first_seen, last_seen, last_updated FROM products WHERE retailer = ? AND product_code = ?",
        )
        .bind(retailer)
        .bind(product_code)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;
        row.map(ProductRow::into_product).transpose()
    }

    async fn find_products_by_price_bucket(&self, retailer: &str, price: f64) -> StoreResult<Vec<Product>> {
        let bucket = price_bucket(price);
        let rows: Vec<ProductRow> = sqlx::query_as(
            "SELECT id, retailer, product_code, normalized_url, canonical_url, title, brand, current_price, original_price, currency, on_sale, stock_state, category, image_urls, description, neckline, sleeve_length, first_seen, last_seen, last_updated FROM products WHERE retailer = ? AND price_bucket = ?",
        )
        .bind(retailer)
        .bind(bucket)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;
        rows.into_iter().map(ProductRow::into_product).collect()
    }

    async fn find_products_by_image_token(&self, retailer: &str, token: &str) -> StoreResult<Vec<Product>> {
        let pattern = format!("%{token}%");
        let rows: Vec<ProductRow> = sqlx::query_as(
            "SELECT id, retailer, product_code, normalized_url, canonical_url, title, brand, current_price, original_price, currency, on_sale, stock_state, category, image_urls, description, neckline, sleeve_length, first_seen, last_seen, last_updated FROM products WHERE retailer = ? AND image_urls LIKE ?",
        )
        .bind(retailer)
        .bind(pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;
        rows.into_iter().map(ProductRow::into_product).collect()
    }

    async fn list_baseline_observations(&self, retailer: &str, category: &str) -> StoreResult<Vec<CatalogObservation>> {
        self.list_observations_by_lifecycle(retailer, category, Lifecycle::Baseline).await
    }

    async fn list_observations_by_lifecycle(
        &self,
        retailer: &str,
        category: &str,
        lifecycle: Lifecycle,
    ) -> StoreResult<Vec<CatalogObservation>> {
        let rows = sqlx::query(
            "SELECT id, retailer, category, product_code_or_url, discovered_date, title, price, image_url, url, lifecycle, recorded_at FROM catalog_observations WHERE retailer = ? AND category = ? AND lifecycle = ?",
        )
        .bind(retailer)
        .bind(category)
        .bind(lifecycle_to_str(lifecycle))
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        rows.into_iter()
            .map(|row| -> StoreResult<CatalogObservation> {
                Ok(CatalogObservation {
                    id: Uuid::parse_str(row.get::<String, _>("id").as_str())
                        .map_err(|e| StoreError::StoreUnavailable(e.to_string()))?,
                    retailer: row.get("retailer"),
                    category: row.get("category"),
                    product_code_or_url: row.get("product_code_or_url"),
                    discovered_date: NaiveDate::parse_from_str(row.get::<String, _>("discovered_date").as_str(), "%Y-%m-%d")
                        .unwrap_or_else(|_| Utc::now().date_naive()),
                    title: row.get("title"),
                    price: row.get("price"),
                    image_url: row.get("image_url"),
                    url: row.get("url"),
                    lifecycle: lifecycle_from_str(row.get::<String, _>("lifecycle").as_str()),
                    recorded_at: parse_ts(row.get::<String, _>("recorded_at").as_str()),
                })
            })
            .collect()
    }

    async fn append_observation(&self, observation: CatalogObservation) -> StoreResult<CatalogObservation> {
        sqlx::query(
            "INSERT INTO catalog_observations (id, retailer, category, product_code_or_url, discovered_date, title, price, image_url, url, lifecycle, recorded_at) VALUES (?,?,?,?,?,?,?,?,?,?,?)",
        )
        .bind(observation.id.to_string())
        .bind(&observation.retailer)
        .bind(&observation.category)
        .bind(&observation.product_code_or_url)
        .bind(observation.discovered_date.format("%Y-%m-%d").to_string())
        .bind(&observation.title)
        .bind(observation.price)
        .bind(&observation.image_url)
        .bind(&observation.url)
        .bind(lifecycle_to_str(observation.lifecycle))
        .bind(observation.recorded_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(observation)
    }

    async fn create_baseline(&self, baseline: Baseline) -> StoreResult<Baseline> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        sqlx::query("UPDATE baselines SET active = 0 WHERE retailer = ? AND category = ? AND active = 1")
            .bind(&baseline.retailer)
            .bind(&baseline.category)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from)?;

        sqlx::query(
            "INSERT INTO baselines (id, retailer, category, captured_date, pages_walked, observation_count, crawler_config_metadata, active, created_at) VALUES (?,?,?,?,?,?,?,1,?)",
        )
        .bind(baseline.id.to_string())
        .bind(&baseline.retailer)
        .bind(&baseline.category)
        .bind(baseline.captured_date.format("%Y-%m-%d").to_string())
        .bind(baseline.pages_walked)
        .bind(baseline.observation_count)
        .bind(serde_json::to_string(&baseline.crawler_config_metadata)?)
        .bind(baseline.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        tx.commit().await.map_err(StoreError::from)?;
        Ok(Baseline { active: true, ..baseline })
    }

    async fn active_baseline(&self, retailer: &str, category: &str) -> StoreResult<Option<Baseline>> {
        let row = sqlx::query(
            "SELECT id, retailer, category, captured_date, pages_walked, observation_count, crawler_config_metadata, active, created_at FROM baselines WHERE retailer = ? AND category = ? AND active = 1",
        )
        .bind(retailer)
        .bind(category)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        row.map(|row| -> StoreResult<Baseline> {
            Ok(Baseline {
                id: Uuid::parse_str(row.get::<String, _>("id").as_str()).map_err(|e| StoreError::Corrupt(e.to_string()))?,
                retailer: row.get("retailer"),
                category: row.get("category"),
                captured_date: NaiveDate::parse_from_str(row.get::<String, _>("captured_date").as_str(), "%Y-%m-%d")
                    .unwrap_or_else(|_| Utc::now().date_naive()),
                pages_walked: row.get::<i64, _>("pages_walked") as u32,
                observation_count: row.get::<i64, _>("observation_count") as u32,
                crawler_config_metadata: serde_json::from_str(row.get::<String, _>("crawler_config_metadata").as_str())
                    .unwrap_or(serde_json::Value::Null),
                active: row.get::<i64, _>("active") != 0,
                created_at: parse_ts(row.get::<String, _>("created_at").as_str()),
            })
        })
        .transpose()
    }

    async fn create_monitoring_run(&self, run: MonitoringRun) -> StoreResult<MonitoringRun> {
        self.write_monitoring_run(&run, true).await?;
        Ok(run)
    }

    async fn update_monitoring_run(&self, run: MonitoringRun) -> StoreResult<MonitoringRun> {
        self.write_monitoring_run(&run, false).await?;
        Ok(run)
    }

    async fn get_monitoring_run(&self, id: Uuid) -> StoreResult<Option<MonitoringRun>> {
        let row = sqlx::query(
            "SELECT id, run_type, retailers, categories, started_at, ended_at, products_crawled, new_products_found, products_queued_for_review, state, cancelled, error_log FROM monitoring_runs WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        row.map(|row| -> StoreResult<MonitoringRun> {
            Ok(MonitoringRun {
                id: Uuid::parse_str(row.get::<String, _>("id").as_str()).map_err(|e| StoreError::Corrupt(e.to_string()))?,
                run_type: run_type_from_str(row.get::<String, _>("run_type").as_str()),
                retailers: serde_json::from_str(row.get::<String, _>("retailers").as_str()).unwrap_or_default(),
                categories: serde_json::from_str(row.get::<String, _>("categories").as_str()).unwrap_or_default(),
                started_at: parse_ts(row.get::<String, _>("started_at").as_str()),
                ended_at: row.get::<Option<String>, _>("ended_at").map(|s| parse_ts(&s)),
                products_crawled: row.get::<i64, _>("products_crawled") as u64,
                new_products_found: row.get::<i64, _>("new_products_found") as u64,
                products_queued_for_review: row.get::<i64, _>("products_queued_for_review") as u64,
                state: run_state_from_str(row.get::<String, _>("state").as_str()),
                cancelled: row.get::<i64, _>("cancelled") != 0,
                error_log: serde_json::from_str(row.get::<String, _>("error_log").as_str()).unwrap_or_default(),
            })
        })
        .transpose()
    }

    async fn get_statistics(&self) -> StoreResult<StoreStatistics> {
        let product_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from)?;
        let observation_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalog_observations")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from)?;
        let active_baseline_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM baselines WHERE active = 1")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from)?;
        let monitoring_run_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM monitoring_runs")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from)?;

        Ok(StoreStatistics {
            product_count: product_count as u64,
            observation_count: observation_count as u64,
            active_baseline_count: active_baseline_count as u64,
            monitoring_run_count: monitoring_run_count as u64,
        })
    }

    async fn get_cached_markdown(&self, url: &str) -> StoreResult<Option<MarkdownCacheEntry>> {
        let row = sqlx::query("SELECT url, markdown, canonical_url, captured_at FROM markdown_cache WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;

        Ok(row.map(|row| MarkdownCacheEntry {
            url: row.get("url"),
            markdown: row.get("markdown"),
            canonical_url: row.get("canonical_url"),
            captured_at: parse_ts(row.get::<String, _>("captured_at").as_str()),
        }))
    }

    async fn put_cached_markdown(&self, entry: MarkdownCacheEntry) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO markdown_cache (url, markdown, canonical_url, captured_at) VALUES (?,?,?,?) ON CONFLICT(url) DO UPDATE SET markdown = excluded.markdown, canonical_url = excluded.canonical_url, captured_at = excluded.captured_at",
        )
        .bind(&entry.url)
        .bind(&entry.markdown)
        .bind(&entry.canonical_url)
        .bind(entry.captured_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn list_patterns(&self, retailer: &str) -> StoreResult<Vec<LearnedPattern>> {
        let rows = sqlx::query(
            "SELECT id, retailer, element_type, pattern_kind, payload, success_count, failure_count, confidence, visual_hints, last_failure_category, created_at, updated_at FROM learned_patterns WHERE retailer = ?",
        )
        .bind(retailer)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        rows.into_iter()
            .map(|row| -> StoreResult<LearnedPattern> {
                Ok(LearnedPattern {
                    id: Uuid::parse_str(row.get::<String, _>("id").as_str()).map_err(|e| StoreError::Corrupt(e.to_string()))?,
                    retailer: row.get("retailer"),
                    element_type: element_type_from_str(row.get::<String, _>("element_type").as_str()),
                    pattern_kind: pattern_kind_from_str(row.get::<String, _>("pattern_kind").as_str()),
                    payload: row.get("payload"),
                    success_count: row.get::<i64, _>("success_count") as u64,
                    failure_count: row.get::<i64, _>("failure_count") as u64,
                    confidence: row.get::<f64, _>("confidence") as f32,
                    visual_hints: row
                        .get::<Option<String>, _>("visual_hints")
                        .and_then(|s| serde_json::from_str(&s).ok()),
                    last_failure_category: None,
                    created_at: parse_ts(row.get::<String, _>("created_at").as_str()),
                    updated_at: parse_ts(row.get::<String, _>("updated_at").as_str()),
                })
            })
            .collect()
    }

    async fn upsert_pattern(&self, pattern: LearnedPattern) -> StoreResult<LearnedPattern> {
        sqlx::query(
            r#"
            INSERT INTO learned_patterns (
                id, retailer, element_type, pattern_kind, payload, success_count, failure_count,
                confidence, visual_hints, last_failure_category, created_at, updated_at
            ) VALUES (?,?,?,?,?,?,?,?,?,?,?,?)
            ON CONFLICT(retailer, element_type, pattern_kind, payload) DO UPDATE SET
                success_count = excluded.success_count,
                failure_count = excluded.failure_count,
                confidence = excluded.confidence,
                visual_hints = excluded.visual_hints,
                last_failure_category = excluded.last_failure_category,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(pattern.id.to_string())
        .bind(&pattern.retailer)
        .bind(element_type_to_str(pattern.element_type))
        .bind(pattern_kind_to_str(pattern.pattern_kind))
        .bind(&pattern.payload)
        .bind(pattern.success_count as i64)
        .bind(pattern.failure_count as i64)
        .bind(pattern.confidence as f64)
        .bind(pattern.visual_hints.as_ref().map(|v| v.to_string()))
        .bind(pattern.last_failure_category.map(|c| format!("{:?}", c)))
        .bind(pattern.created_at.to_rfc3339())
        .bind(pattern.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(pattern)
    }
}

impl SqliteStore {
    async fn write_monitoring_run(&self, run: &MonitoringRun, insert: bool) -> StoreResult<()> {
        let retailers = serde_json::to_string(&run.retailers)?;
        let categories = serde_json::to_string(&run.categories)?;
        let error_log = serde_json::to_string(&run.error_log)?;

        if insert {
            sqlx::query(
                "INSERT INTO monitoring_runs (id, run_type, retailers, categories, started_at, ended_at, products_crawled, new_products_found, products_queued_for_review, state, cancelled, error_log) VALUES (?,?,?,?,?,?,?,?,?,?,?,?)",
            )
        } else {
            sqlx::query(
                r#"
                INSERT INTO monitoring_runs (id, run_type, retailers, categories, started_at, ended_at, products_crawled, new_products_found, products_queued_for_review, state, cancelled, error_log)
                VALUES (?,?,?,?,?,?,?,?,?,?,?,?)
                ON CONFLICT(id) DO UPDATE SET
                    ended_at = excluded.ended_at,
                    products_crawled = excluded.products_crawled,
                    new_products_found = excluded.new_products_found,
                    products_queued_for_review = excluded.products_queued_for_review,
                    state = excluded.state,
                    cancelled = excluded.cancelled,
                    error_log = excluded.error_log
                "#,
            )
        }
        .bind(run.id.to_string())
        .bind(run_type_to_str(run.run_type))
        .bind(retailers)
        .bind(categories)
        .bind(run.started_at.to_rfc3339())
        .bind(run.ended_at.map(|t| t.to_rfc3339()))
        .bind(run.products_crawled as i64)
        .bind(run.new_products_found as i64)
        .bind(run.products_queued_for_review as i64)
        .bind(run_state_to_str(run.state))
        .bind(run.cancelled as i64)
        .bind(error_log)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Product;

    async fn store() -> SqliteStore {
        SqliteStore::in_memory().await.unwrap()
    }

    fn sample_product(retailer: &str, url: &str) -> Product {
        let now = Utc::now();
        Product {
            id: Uuid::now_v7(),
            retailer: retailer.to_string(),
            product_code: Some("ABC123".into()),
            normalized_url: url.to_string(),
            canonical_url: url.to_string(),
            title: "Wrap Dress".into(),
            brand: Some("Acme".into()),
            current_price: 49.99,
            original_price: None,
            currency: "USD".into(),
            on_sale: false,
            stock_state: StockState::InStock,
            category: "dresses".into(),
            image_urls: vec!["https://cdn.example.com/a.jpg".into()],
            description: None,
            neckline: None,
            sleeve_length: None,
            first_seen: now,
            last_seen: now,
            last_updated: now,
        }
    }

    #[tokio::test]
    async fn roundtrips_a_product_by_exact_url() {
        let store = store().await;
        let product = sample_product("revolve", "https://revolve.com/p/abc123.html");
        store.upsert_product(product.clone()).await.unwrap();

        let found = store
            .find_product_by_exact_url("revolve", "https://revolve.com/p/abc123.html")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.title, "Wrap Dress");
        assert_eq!(found.product_code.as_deref(), Some("ABC123"));
    }

    #[tokio::test]
    async fn baseline_rotation_leaves_exactly_one_active_row() {
        let store = store().await;
        let now = Utc::now();
        let first = Baseline {
            id: Uuid::now_v7(),
            retailer: "revolve".into(),
            category: "dresses".into(),
            captured_date: now.date_naive(),
            pages_walked: 3,
            observation_count: 26,
            crawler_config_metadata: serde_json::json!({}),
            active: true,
            created_at: now,
        };
        store.create_baseline(first.clone()).await.unwrap();

        let second = Baseline { id: Uuid::now_v7(), ..first };
        store.create_baseline(second).await.unwrap();

        let active = store.active_baseline("revolve", "dresses").await.unwrap().unwrap();
        assert_eq!(active.observation_count, 26);

        let stats = store.get_statistics().await.unwrap();
        assert_eq!(stats.active_baseline_count, 1);
    }

    #[tokio::test]
    async fn lifecycle_filter_separates_pending_review_from_baseline() {
        let store = store().await;
        let now = Utc::now();
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
