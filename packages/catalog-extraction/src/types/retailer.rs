//! Static, process-lifetime retailer configuration.

use std::collections::HashMap;

/// How a retailer paginates its listing pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PaginationMode {
    /// `?page=N` style query-parameter pagination.
    Paged,
    /// Retailer renders everything via client-side infinite scroll; no
    /// page-N URL exists, the browser tower captures one full render.
    InfiniteScroll,
    /// Retailer exposes paginated URLs first, falling back to clicking a
    /// "load more" control when the URL form is exhausted.
    HybridLoadMore,
    /// `?start=offset&rows=pageSize` style offset pagination.
    Offset,
}

/// Anti-bot defensiveness, used to size rate limits and pacing jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum AntiBotSeverity {
    Low,
    Medium,
    High,
    VeryHigh,
}

/// Which extraction path a retailer is routed through by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Tower {
    Markdown,
    Browser,
}

/// Immutable per-retailer configuration, held for the lifetime of the
/// process and consulted by the crawler, dispatcher and change detector.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RetailerConfig {
    pub id: String,
    pub category_listing_urls: HashMap<String, String>,
    pub category_newest_sort_urls: HashMap<String, String>,
    pub pagination_mode: PaginationMode,
    pub items_per_page: Option<u32>,
    pub preferred_tower: Tower,
    pub anti_bot_severity: AntiBotSeverity,
}

impl RetailerConfig {
    /// Whether this retailer supports a newest-first sort for the category.
    pub fn supports_newest_sort(&self, category: &str) -> bool {
        self.category_newest_sort_urls.contains_key(category)
    }

    /// The URL to start a crawl from for the given category and run kind.
    ///
    /// Monitoring runs prefer the newest-sort URL when available; baseline
    /// runs and retailers lacking a sort always use the plain category URL.
    pub fn starting_url<'a>(&'a self, category: &str, prefer_newest: bool) -> Option<&'a str> {
        if prefer_newest {
            if let Some(url) = self.category_newest_sort_urls.get(category) {
                return Some(url.as_str());
            }
        }
        self.category_listing_urls.get(category).map(|s| s.as_str())
    }
}
