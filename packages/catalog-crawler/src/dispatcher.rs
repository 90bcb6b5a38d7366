//! The Extraction Dispatcher (§4.5): static retailer→tower routing with
//! single-product fallback.

use std::collections::HashMap;
use std::sync::Arc;

use catalog_extraction::types::{DispatchResult, Tower};
use catalog_extraction::ExtractionTower;

pub struct ExtractionDispatcher {
    markdown_tower: Arc<dyn ExtractionTower>,
    browser_tower: Arc<dyn ExtractionTower>,
    preferred: HashMap<String, Tower>,
}

impl ExtractionDispatcher {
    pub fn new(
        markdown_tower: Arc<dyn ExtractionTower>,
        browser_tower: Arc<dyn ExtractionTower>,
        preferred: HashMap<String, Tower>,
    ) -> Self {
        Self { markdown_tower, browser_tower, preferred }
    }

    fn tower_for(&self, retailer: &str) -> &Arc<dyn ExtractionTower> {
        match self.preferred.get(retailer).copied().unwrap_or(Tower::Markdown) {
            Tower::Markdown => &self.markdown_tower,
            Tower::Browser => &self.browser_tower,
        }
    }

    fn other_tower(&self, retailer: &str) -> &Arc<dyn ExtractionTower> {
        match self.preferred.get(retailer).copied().unwrap_or(Tower::Markdown) {
            Tower::Markdown => &self.browser_tower,
            Tower::Browser => &self.markdown_tower,
        }
    }

    /// Single-product mode: call the preferred tower; on a fallback-eligible
    /// failure from the markdown tower, retry on the browser tower.
    pub async fn extract_product(&self, retailer: &str, url: &str) -> DispatchResult {
        let preferred_was_markdown = self.preferred.get(retailer).copied().unwrap_or(Tower::Markdown) == Tower::Markdown;
        let result = self.tower_for(retailer).extract_product(retailer, url).await;

        if !result.success && result.should_fallback && preferred_was_markdown {
            tracing::info!(retailer, url, "markdown tower requested fallback, trying browser tower");
            return self.other_tower(retailer).extract_product(retailer, url).await;
        }

        result
    }

    /// Catalog mode: call the preferred tower once; never falls back within
    /// a single page (the Orchestrator decides at the next page, §4.5).
    pub async fn extract_catalog_page(&self, retailer: &str, url: &str) -> DispatchResult {
        self.tower_for(retailer).extract_catalog_page(retailer, url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    struct StubTower {
        success: bool,
        should_fallback: bool,
        method: catalog_extraction::types::ExtractionMethod,
    }

    #[async_trait]
    impl ExtractionTower for StubTower {
        async fn extract_product(&self, _retailer: &str, _url: &str) -> DispatchResult {
            if self.success {
                DispatchResult::single_success(Default::default(), self.method, Duration::ZERO)
            } else {
                DispatchResult::failure(self.method, "boom".into(), self.should_fallback, Duration::ZERO)
            }
        }

        async fn extract_catalog_page(&self, retailer: &str, url: &str) -> DispatchResult {
            self.extract_product(retailer, url).await
        }
    }

    #[tokio::test]
    async fn falls_back_to_browser_tower_when_markdown_requests_it() {
        let markdown = Arc::new(StubTower {
            success: false,
            should_fallback: true,
            method: catalog_extraction::types::ExtractionMethod::Markdown,
        });
        let browser = Arc::new(StubTower {
            success: true,
            should_fallback: false,
            method: catalog_extraction::types::ExtractionMethod::Browser,
        });
        let mut preferred = HashMap::new();
        preferred.insert("revolve".to_string(), Tower::Markdown);

        let dispatcher = ExtractionDispatcher::new(markdown, browser, preferred);
        let result = dispatcher.extract_product("revolve", "https://x/p").await;
        assert!(result.success);
        assert_eq!(result.method, catalog_extraction::types::ExtractionMethod::Browser);
    }

    #[tokio::test]
    async fn catalog_mode_never_falls_back() {
        let markdown = Arc::new(StubTower {
            success: false,
            should_fallback: true,
            method: catalog_extraction::types::ExtractionMethod::Markdown,
        });
        let browser = Arc::new(StubTower {
            success: true,
            should_fallback: false,
            method: catalog_extraction::types::ExtractionMethod::Browser,
        });
        let mut preferred = HashMap::new();
        preferred.insert("revolve".to_string(), Tower::Markdown);

        let dispatcher = ExtractionDispatcher::new(markdown, browser, preferred);
        let result = dispatcher.extract_catalog_page("revolve", "https://x/c").await;
        assert!(!result.success);
    }
}
