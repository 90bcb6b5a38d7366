//! Environment-derived configuration and the static retailer registry.

use std::collections::HashMap;

use catalog_extraction::Credentials;
use catalog_extraction::types::{AntiBotSeverity, PaginationMode, RetailerConfig, Tower};

use crate::error::{CrawlError, Result};

/// Process-wide settings threaded through the Orchestrator's constructors,
/// loaded once at startup (§9 design note: explicit context object instead
/// of module-level singletons).
#[derive(Clone)]
pub struct Config {
    pub credentials: Credentials,
    pub primary_llm_base_url: String,
    pub primary_llm_model: String,
    pub secondary_llm_base_url: String,
    pub secondary_llm_model: String,
    pub vision_base_url: String,
    pub vision_model: String,
    pub markdown_service_url: String,
    pub database_url: String,
    pub output_dir: String,
    pub browser_profile_root: String,
    pub concurrency_cap: usize,
}

impl Config {
    /// Loads from the process environment (via `dotenvy` in development).
    /// Absence of a required credential is `Fatal` per §7.
    pub fn from_env() -> Result<Self> {
        let credentials = Credentials::from_env().map_err(|e| CrawlError::Fatal(e.to_string()))?;

        Ok(Self {
            credentials,
            primary_llm_base_url: env_or("CATALOG_PRIMARY_LLM_BASE_URL", "https://api.openai.com/v1"),
            primary_llm_model: env_or("CATALOG_PRIMARY_LLM_MODEL", "gpt-4o-mini"),
            secondary_llm_base_url: env_or("CATALOG_SECONDARY_LLM_BASE_URL", "https://api.anthropic.com/v1"),
            secondary_llm_model: env_or("CATALOG_SECONDARY_LLM_MODEL", "claude-3-5-haiku"),
            vision_base_url: env_or("CATALOG_VISION_BASE_URL", "https://api.openai.com/v1"),
            vision_model: env_or("CATALOG_VISION_MODEL", "gpt-4o-mini"),
            markdown_service_url: env_or("CATALOG_MARKDOWN_SERVICE_URL", "https://markdown.internal/convert"),
            database_url: env_or("CATALOG_DATABASE_URL", "sqlite://catalog.db"),
            output_dir: env_or("CATALOG_OUTPUT_DIR", "./batches"),
            browser_profile_root: env_or("CATALOG_BROWSER_PROFILE_ROOT", "./browser_profiles"),
            concurrency_cap: std::env::var("CATALOG_CONCURRENCY_CAP")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// The category set every retailer in [`default_registry`] is configured
/// for. A fixed, shared list rather than a per-retailer one so `--categories`
/// resolves uniformly across the registry.
pub const DEFAULT_CATEGORIES: &[&str] = &["dresses", "tops", "bottoms", "outerwear"];

/// Builds one retailer's category URL maps from its listing-page base URL
/// and, when it supports a newest-first sort, the query string that
/// requests it. A `None` sort query means the retailer gets no entry in
/// `category_newest_sort_urls` for any category (§3: `supports_newest_sort`
/// is a per-category lookup, but every named retailer here is uniform
/// across its own categories).
fn category_urls(base: &str, newest_sort_query: Option<&str>) -> (HashMap<String, String>, HashMap<String, String>) {
    let mut listing = HashMap::new();
    let mut newest = HashMap::new();
    for category in DEFAULT_CATEGORIES {
        let listing_url = format!("{base}/{category}");
        if let Some(query) = newest_sort_query {
            newest.insert(category.to_string(), format!("{listing_url}?{query}"));
        }
        listing.insert(category.to_string(), listing_url);
    }
    (listing, newest)
}

/// Builds the default retailer registry (§4.7, product-code table and §9
/// static-table-keyed-by-enum strategy): pagination mode, preferred tower,
/// anti-bot severity, and real per-category listing/newest-sort URLs for
/// every named retailer.
pub fn default_registry() -> HashMap<String, RetailerConfig> {
    let mut registry = HashMap::new();

    let entries = [
        ("revolve", "https://www.revolve.com/r", PaginationMode::Paged, Tower::Markdown, AntiBotSeverity::Medium, Some(96), Some("sortBy=newest")),
        ("asos", "https://www.asos.com/us/women", PaginationMode::Paged, Tower::Markdown, AntiBotSeverity::Medium, Some(72), Some("sort=freshness")),
        ("aritzia", "https://www.aritzia.com/us/en/clothing", PaginationMode::Paged, Tower::Markdown, AntiBotSeverity::Low, Some(60), Some("sort=newest")),
        ("hm", "https://www2.hm.com/en_us/women", PaginationMode::Offset, Tower::Markdown, AntiBotSeverity::Medium, Some(36), None),
        ("uniqlo", "https://www.uniqlo.com/us/en/women", PaginationMode::Paged, Tower::Markdown, AntiBotSeverity::Low, Some(48), Some("sort=newest")),
        ("anthropologie", "https://www.anthropologie.com/clothing", PaginationMode::HybridLoadMore, Tower::Browser, AntiBotSeverity::High, None, None),
        ("abercrombie", "https://www.abercrombie.com/shop/us/womens", PaginationMode::InfiniteScroll, Tower::Browser, AntiBotSeverity::High, None, None),
        ("urban_outfitters", "https://www.urbanoutfitters.com/womens-clothing", PaginationMode::HybridLoadMore, Tower::Browser, AntiBotSeverity::High, None, None),
        ("nordstrom", "https://www.nordstrom.com/browse/women/clothing", PaginationMode::Paged, Tower::Markdown, AntiBotSeverity::VeryHigh, Some(48), Some("sort=Newest")),
        ("mango", "https://shop.mango.com/us/women", PaginationMode::Paged, Tower::Markdown, AntiBotSeverity::Low, Some(40), Some("sort=newIn")),
    ];

    for (id, base_url, pagination_mode, preferred_tower, anti_bot_severity, items_per_page, newest_sort_query) in entries {
        let (category_listing_urls, category_newest_sort_urls) = category_urls(base_url, newest_sort_query);
        registry.insert(
            id.to_string(),
            RetailerConfig {
                id: id.to_string(),
                category_listing_urls,
                category_newest_sort_urls,
                pagination_mode,
                items_per_page,
                preferred_tower,
                anti_bot_severity,
            },
        );
    }

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_every_named_retailer() {
        let registry = default_registry();
        for id in [
            "revolve", "asos", "aritzia", "hm", "uniqlo", "anthropologie", "abercrombie",
            "urban_outfitters", "nordstrom", "mango",
        ] {
            assert!(registry.contains_key(id), "missing retailer {id}");
        }
    }

    #[test]
    fn every_retailer_has_a_starting_url_for_every_default_category() {
        let registry = default_registry();
        for config in registry.values() {
            for category in DEFAULT_CATEGORIES {
                assert!(
                    config.starting_url(category, false).is_some(),
                    "{} has no baseline-run starting URL for {category}",
                    config.id
                );
            }
        }
    }

    #[test]
    fn only_markdown_retailers_with_a_configured_sort_query_expose_newest_sort() {
        let registry = default_registry();
        assert!(registry["revolve"].supports_newest_sort("dresses"));
        assert!(!registry["hm"].supports_newest_sort("dresses"));
        assert!(!registry["anthropologie"].supports_newest_sort("dresses"));
    }
}
