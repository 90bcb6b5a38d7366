//! Markdown-tower orchestration (§4.3): cache, fetch, token-budget slicing,
//! LLM cascade, parse, validate.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::error::ExtractionError;
use crate::markdown::client::MarkdownServiceClient;
use crate::markdown::repair::{parse_catalog_lines, parse_json_with_repair};
use crate::markdown::validate::validate_extracted_product;
use crate::traits::ai::LlmProvider;
use crate::traits::store::Store;
use crate::traits::tower::ExtractionTower;
use crate::types::extraction_result::{DispatchResult, ExtractedProduct, ExtractionMethod};
use crate::types::markdown_cache::{MarkdownCacheEntry, DEFAULT_CACHE_EXPIRY_DAYS};

/// Upper bound on the token budget handed to an LLM call. Oversized
/// documents are sliced down to 80% of this ceiling (§1 token-sizing rule).
/// H&M's markdown conversion runs unusually verbose relative to its actual
/// product-grid density, so it gets the tighter of the two retailer-class
/// ceilings named in §4.3 (15k vs. 25k); every other retailer gets the
/// looser one. Grounded in `markdown_extractor.py`'s per-retailer cache
/// sizing check.
fn token_ceiling(retailer: &str) -> usize {
    if retailer == "hm" {
        15_000
    } else {
        25_000
    }
}
const OVERSIZED_THRESHOLD_RATIO: f64 = 0.8;

/// Approximate tokens-per-word multiplier used by the original
/// implementation's sizing heuristic: `words * 1.3 * 1.085`.
fn estimate_tokens(text: &str) -> usize {
    let words = text.split_whitespace().count() as f64;
    (words * 1.3 * 1.085).ceil() as usize
}

const SINGLE_PRODUCT_SYSTEM_PROMPT: &str = "\
Extract the single product detail page below into JSON with keys: title, brand, \
price, original_price, on_sale, stock_state, category, image_urls, description, \
colors, sizes, material, care_notes, neckline, sleeve_length. Use null for unknown \
fields. Respond with JSON only.";

const CATALOG_PAGE_SYSTEM_PROMPT: &str = "\
List every product visible on the catalog page below, one per line, each formatted \
exactly as: PRODUCT::URL=<url>|TITLE=<title>|PRICE=<price>|IMAGE=<image_url>|SALE=<true|false>. \
Omit products you cannot find a detail-page URL for.";

pub struct MarkdownExtractor {
    store: Arc<dyn Store>,
    primary: Arc<dyn LlmProvider>,
    secondary: Arc<dyn LlmProvider>,
    client: MarkdownServiceClient,
}

impl MarkdownExtractor {
    pub fn new(
        store: Arc<dyn Store>,
        primary: Arc<dyn LlmProvider>,
        secondary: Arc<dyn LlmProvider>,
        client: MarkdownServiceClient,
    ) -> Self {
        Self { store, primary, secondary, client }
    }

    async fn fetch_markdown_cached(&self, url: &str) -> crate::error::Result<String> {
        if let Some(entry) = self.store.get_cached_markdown(url).await? {
            if entry.is_fresh(chrono::Utc::now(), DEFAULT_CACHE_EXPIRY_DAYS) {
                return Ok(entry.markdown);
            }
        }

        let markdown = self.client.fetch_markdown(url).await?;
        let entry = MarkdownCacheEntry {
            url: url.to_string(),
            markdown: markdown.clone(),
            canonical_url: url.to_string(),
            captured_at: chrono::Utc::now(),
        };
        self.store.put_cached_markdown(entry).await?;
        Ok(markdown)
    }

    /// Slices an oversized document down to the densest "product grid"
    /// region rather than truncating from the start, which would bias
    /// towards whatever happens to render first on the page.
    fn slice_to_budget(retailer: &str, markdown: &str) -> String {
        let ceiling = token_ceiling(retailer);
        let estimated = estimate_tokens(markdown);
        if estimated <= (ceiling as f64 * OVERSIZED_THRESHOLD_RATIO) as usize {
            return markdown.to_string();
        }

        let lines: Vec<&str> = markdown.lines().collect();
        if lines.is_empty() {
            return markdown.to_string();
        }

        let marker_positions: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.contains("](") || l.starts_with('-') || l.starts_with('*'))
            .map(|(i, _)| i)
            .collect();

        let center = if marker_positions.is_empty() {
            lines.len() / 2
        } else {
            marker_positions[marker_positions.len() / 2]
        };

        // Walk outward from the densest marker until the slice approaches
        // the token budget.
        let budget = (ceiling as f64 * OVERSIZED_THRESHOLD_RATIO) as usize;
        let mut start = center;
        let mut end = center;
        let mut current = String::new();
        loop {
            let grew = start > 0 || end < lines.len() - 1;
            if start > 0 {
                start -= 1;
            }
            if end < lines.len() - 1 {
                end += 1;
            }
            current = lines[start..=end].join("\n");
            if estimate_tokens(&current) >= budget || !grew {
                break;
            }
        }
        current
    }

    async fn cascade_complete(&self, system_prompt: &str, user_prompt: &str, max_tokens: u32) -> crate::error::Result<String> {
        match self.primary.complete(system_prompt, user_prompt, max_tokens).await {
            Ok(text) => Ok(text),
            Err(primary_err) => {
                tracing::warn!(provider = self.primary.name(), error = %primary_err, "primary LLM failed, falling back");
                self.secondary
                    .complete(system_prompt, user_prompt, max_tokens)
                    .await
                    .map_err(|secondary_err| {
                        tracing::error!(
                            provider = self.secondary.name(),
                            error = %secondary_err,
                            "secondary LLM also failed"
                        );
                        ExtractionError::ProvidersUnavailable
                    })
            }
        }
    }

    async fn extract_single(&self, retailer: &str, url: &str) -> DispatchResult {
        let start = Instant::now();

        // Delisting probe runs before the expensive fetch+cascade (§4.3):
        // a short-timeout HEAD request so a 404/410 product never pays for
        // a markdown fetch or two LLM calls.
        if self.client.probe_delisted(url).await {
            return DispatchResult::delisted(ExtractionMethod::Markdown, start.elapsed());
        }

        let markdown = match self.fetch_markdown_cached(url).await {
            Ok(md) => md,
            Err(ExtractionError::Delisted) => return DispatchResult::delisted(ExtractionMethod::Markdown, start.elapsed()),
            Err(e) => return DispatchResult::failure(ExtractionMethod::Markdown, e.to_string(), true, start.elapsed()),
        };

        let sliced = Self::slice_to_budget(retailer, &markdown);

        let completion = match self
            .cascade_complete(SINGLE_PRODUCT_SYSTEM_PROMPT, &sliced, 2_000)
            .await
        {
            Ok(text) => text,
            Err(e) => return DispatchResult::failure(ExtractionMethod::Markdown, e.to_string(), true, start.elapsed()),
        };

        let Some(value) = parse_json_with_repair(&completion) else {
            return DispatchResult::failure(
                ExtractionMethod::Markdown,
                "could not parse LLM response as JSON".to_string(),
                true,
                start.elapsed(),
            );
        };

        let mut product: ExtractedProduct = match serde_json::from_value(value) {
            Ok(p) => p,
            Err(e) => return DispatchResult::failure(ExtractionMethod::Markdown, e.to_string(), true, start.elapsed()),
        };
        product.url = url.to_string();

        if let Err(reason) = validate_extracted_product(retailer, &product) {
            return DispatchResult::failure(ExtractionMethod::Markdown, reason.to_string(), true, start.elapsed());
        }

        DispatchResult::single_success(product, ExtractionMethod::Markdown, start.elapsed())
    }

    async fn extract_catalog(&self, retailer: &str, url: &str) -> DispatchResult {
        let start = Instant::now();

        let markdown = match self.fetch_markdown_cached(url).await {
            Ok(md) => md,
            Err(ExtractionError::Delisted) => return DispatchResult::delisted(ExtractionMethod::Markdown, start.elapsed()),
            Err(e) => return DispatchResult::failure(ExtractionMethod::Markdown, e.to_string(), false, start.elapsed()),
        };

        let sliced = Self::slice_to_budget(retailer, &markdown);

        let completion = match self
            .cascade_complete(CATALOG_PAGE_SYSTEM_PROMPT, &sliced, 4_000)
            .await
        {
            Ok(text) => text,
            Err(e) => return DispatchResult::failure(ExtractionMethod::Markdown, e.to_string(), false, start.elapsed()),
        };

        let lines = parse_catalog_lines(&completion);
        let products: Vec<ExtractedProduct> = lines
            .into_iter()
            .map(|line| ExtractedProduct {
                url: line.url.unwrap_or_default(),
                title: line.title,
                price: line.price,
                image_urls: line.image_url.into_iter().collect(),
                on_sale: line.on_sale,
                ..Default::default()
            })
            .collect();

        // Catalog mode never falls back to the browser tower on a parse
        // miss (§4.5): an empty catalog page is a legitimate outcome.
        DispatchResult::catalog_success(products, ExtractionMethod::Markdown, start.elapsed())
    }
}

#[async_trait]
impl ExtractionTower for MarkdownExtractor {
    async fn extract_product(&self, retailer: &str, url: &str) -> DispatchResult {
        self.extract_single(retailer, url).await
    }

    async fn extract_catalog_page(&self, retailer: &str, url: &str) -> DispatchResult {
        self.extract_catalog(retailer, url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_documents_are_never_sliced() {
        let markdown = "# Product\nA nice dress.\n![img](https://cdn/a.jpg)\n$49.99";
        assert_eq!(MarkdownExtractor::slice_to_budget("revolve", markdown), markdown);
    }

    #[test]
    fn token_estimate_scales_with_word_count() {
        let short = estimate_tokens("one two three");
        let long = estimate_tokens(&"word ".repeat(1000));
        assert!(long > short * 100);
    }

    #[test]
    fn oversized_documents_are_reduced_in_size() {
        let mut lines = Vec::new();
        for i in 0..5000 {
            lines.push(format!("- [Product {i}](https://x/p{i}) $19.99"));
        }
        let markdown = lines.join("\n");
        let sliced = MarkdownExtractor::slice_to_budget("revolve", &markdown);
        assert!(sliced.len() < markdown.len());
    }

    #[test]
    fn hm_gets_the_tighter_ceiling_than_other_retailers() {
        let mut lines = Vec::new();
        for i in 0..1200 {
            lines.push(format!("- [Product {i}](https://x/p{i}) $19.99"));
        }
        let markdown = lines.join("\n");
        // Sized to exceed hm's 15k ceiling's 80% budget but not revolve's 25k one.
        let hm_sliced = MarkdownExtractor::slice_to_budget("hm", &markdown);
        let revolve_sliced = MarkdownExtractor::slice_to_budget("revolve", &markdown);
        assert!(hm_sliced.len() <= revolve_sliced.len());
    }

    #[allow(dead_code)]
    fn assert_send_sync<T: Send + Sync>() {}
    #[test]
    fn extractor_is_send_sync() {
        assert_send_sync::<MarkdownExtractor>();
    }
}
