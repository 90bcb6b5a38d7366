//! The Change Detector (§4.7): multi-signal product matching with weighted
//! confidence scoring.

use std::sync::OnceLock;
use std::time::Instant;

use regex::Regex;
use url::Url;

use catalog_extraction::types::{CatalogObservation, ExtractedProduct, Product};
use catalog_extraction::Store;

/// Generic tracking query keys stripped for every retailer (§1 supplement).
const GENERIC_TRACKING_KEYS: &[&str] = &[
    "navsrc",
    "origin",
    "breadcrumb",
    "pagefm",
    "src",
    "pos",
    "campaign",
    "utm_source",
    "utm_medium",
    "utm_campaign",
];

const NEW_PRODUCT_THRESHOLD: f64 = 0.85;
const MANUAL_REVIEW_THRESHOLD: f64 = 0.70;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    New,
    Existing,
    ManualReview,
}

#[derive(Debug, Clone)]
pub struct MatchResult {
    pub classification: Classification,
    pub confidence: f64,
    pub existing_product_id: Option<uuid::Uuid>,
    pub method: &'static str,
}

#[derive(Default)]
pub struct DetectionSummary {
    pub new: Vec<(ExtractedProduct, MatchResult)>,
    pub existing: Vec<(ExtractedProduct, MatchResult)>,
    pub manual_review: Vec<(ExtractedProduct, MatchResult)>,
    /// Confidence histogram, bucketed to the nearest tenth.
    pub confidence_histogram: [u32; 11],
    pub elapsed: std::time::Duration,
}

/// Normalizes a URL: strips generic and retailer-specific tracking query
/// keys, trailing punctuation, and (for revolve/aritzia) the entire query
/// string (§4.7, §1 supplement). Idempotent (P6).
pub fn normalize_url(retailer: &str, raw_url: &str) -> String {
    let Ok(mut parsed) = Url::parse(raw_url) else {
        return raw_url.trim_end_matches(['/', '.', ',']).to_string();
    };

    match retailer {
        "revolve" | "aritzia" => {
            parsed.set_query(None);
        }
        "asos" => {
            let pairs: Vec<(String, String)> = parsed
                .query_pairs()
                .filter(|(k, _)| {
                    !GENERIC_TRACKING_KEYS.contains(&k.as_ref())
                        && k.as_ref() != "currentpricerange"
                        && k.as_ref() != "sort"
                })
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            set_query_pairs(&mut parsed, &pairs);
        }
        _ => {
            let pairs: Vec<(String, String)> = parsed
                .query_pairs()
                .filter(|(k, _)| !GENERIC_TRACKING_KEYS.contains(&k.as_ref()))
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            set_query_pairs(&mut parsed, &pairs);
        }
    }

    parsed.as_str().trim_end_matches(['/', '.', ',']).to_string()
}

fn set_query_pairs(url: &mut Url, pairs: &[(String, String)]) {
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in pairs {
            serializer.append_pair(k, v);
        }
        url.set_query(Some(&serializer.finish()));
    }
}

/// Per-retailer product-code extraction regex (§4.7 concretized, §1).
fn product_code_regex(retailer: &str) -> Option<&'static Regex> {
    macro_rules! cached {
        ($name:ident, $pattern:expr) => {{
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| Regex::new($pattern).unwrap())
        }};
    }

    match retailer {
        "revolve" => Some(cached!(REVOLVE, r"/([A-Z0-9-]+)\.html")),
        "asos" => Some(cached!(ASOS, r"/prd/(\d+)")),
        "aritzia" => Some(cached!(ARITZIA, r"/product/[^/]+/(\d+)\.html")),
        "hm" => Some(cached!(HM, r"productpage\.(\d+)\.html")),
        "uniqlo" => Some(cached!(UNIQLO, r"/products/([A-Z0-9]+)-")),
        "anthropologie" | "abercrombie" | "urban_outfitters" => Some(cached!(GENERIC_PRODUCTS, r"/products/([^?]+)")),
        "nordstrom" => Some(cached!(NORDSTROM, r"/s/([^?]+)")),
        "mango" => Some(cached!(MANGO, r"/([0-9]+)\.html")),
        _ => None,
    }
}

pub fn extract_product_code(retailer: &str, url: &str) -> Option<String> {
    product_code_regex(retailer).and_then(|re| re.captures(url)).and_then(|c| c.get(1)).map(|m| m.as_str().to_string())
}

/// Extracts the filename token (stem, minus size/CDN suffixes such as
/// `_800x800`) from an image URL for the image-identifier match method
/// (§4.7). Returns `None` for URLs too short to carry a meaningful token.
fn image_filename_token(image_url: &str) -> Option<String> {
    let path = image_url.split(['?', '#']).next().unwrap_or(image_url);
    let filename = path.rsplit('/').next()?;
    let stem = filename.split('.').next().unwrap_or(filename);
    let token: String = stem
        .trim_end_matches(|c: char| c.is_ascii_digit())
        .trim_end_matches(|c: char| c == '_' || c == '-' || c == 'x')
        .to_string();
    if token.len() < 4 {
        None
    } else {
        Some(token)
    }
}

/// Lightweight overlap check used only by the Crawler's early-stop counter
/// (§4.6 step 2) — distinct from [`ChangeDetector::classify_one`]'s full
/// weighted confidence match, which the Orchestrator runs afterwards in a
/// single batched pass. A product "overlaps" the baseline when its URL
/// (normalized) or title is already present in the active baseline.
pub fn baseline_overlap(retailer: &str, product: &ExtractedProduct, baseline: &[CatalogObservation]) -> bool {
    let normalized = normalize_url(retailer, &product.url);
    baseline.iter().any(|b| {
        b.url == product.url
            || normalize_url(retailer, &b.url) == normalized
            || product
                .title
                .as_deref()
                .map(|t| strsim::normalized_levenshtein(&b.title, t) >= 0.90)
                .unwrap_or(false)
    })
}

pub struct ChangeDetector {
    store: std::sync::Arc<dyn Store>,
}

impl ChangeDetector {
    pub fn new(store: std::sync::Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Classifies every crawled product against the store in crawl order
    /// (P3 determinism, §5 ordering guarantee).
    pub async fn detect_batch(
        &self,
        retailer: &str,
        category: &str,
        products: Vec<ExtractedProduct>,
    ) -> catalog_extraction::StoreResult<DetectionSummary> {
        let start = Instant::now();
        let baseline_observations = self.store.list_baseline_observations(retailer, category).await?;

        let mut summary = DetectionSummary::default();
        for product in products {
            let result = self.classify_one(retailer, &product, &baseline_observations).await?;
            let bucket = ((result.confidence * 10.0).round() as usize).min(10);
            summary.confidence_histogram[bucket] += 1;

            match result.classification {
                Classification::Existing => summary.existing.push((product, result)),
                Classification::ManualReview => summary.manual_review.push((product, result)),
                Classification::New => summary.new.push((product, result)),
            }
        }
        summary.elapsed = start.elapsed();
        Ok(summary)
    }

    async fn classify_one(
        &self,
        retailer: &str,
        product: &ExtractedProduct,
        baseline_observations: &[CatalogObservation],
    ) -> catalog_extraction::StoreResult<MatchResult> {
        let mut best: Option<MatchResult> = None;
        let mut consider = |candidate: MatchResult| {
            if best.as_ref().map(|b| candidate.confidence > b.confidence).unwrap_or(true) {
                best = Some(candidate);
            }
        };

        if let Some(existing) = self.store.find_product_by_exact_url(retailer, &product.url).await? {
            consider(MatchResult {
                classification: Classification::Existing,
                confidence: 1.00,
                existing_product_id: Some(existing.id),
                method: "exact_url",
            });
        }

        let normalized = normalize_url(retailer, &product.url);
        if let Some(existing) = self.store.find_product_by_normalized_url(retailer, &normalized).await? {
            consider(MatchResult {
                classification: Classification::Existing,
                confidence: 0.95,
                existing_product_id: Some(existing.id),
                method: "normalized_url",
            });
        }

        if let Some(code) = extract_product_code(retailer, &product.url) {
            if let Some(existing) = self.store.find_product_by_code(retailer, &code).await? {
                consider(MatchResult {
                    classification: Classification::Existing,
                    confidence: 0.93,
                    existing_product_id: Some(existing.id),
                    method: "product_code",
                });
            }
        }

        if let Some(title) = &product.title {
            let matches_baseline = baseline_observations
                .iter()
                .any(|b| b.url == product.url || strsim::normalized_levenshtein(&b.title, title) >= 0.90);
            if matches_baseline {
                consider(MatchResult {
                    classification: Classification::Existing,
                    confidence: 0.90,
                    existing_product_id: None,
                    method: "baseline_observation",
                });
            }
        }

        for image_url in &product.image_urls {
            let Some(token) = image_filename_token(image_url) else { continue };
            let candidates = self.store.find_products_by_image_token(retailer, &token).await?;
            if let Some(existing) = candidates.into_iter().next() {
                consider(MatchResult {
                    classification: Classification::Existing,
                    confidence: 0.82,
                    existing_product_id: Some(existing.id),
                    method: "image_identifier",
                });
                break;
            }
        }

        if let (Some(title), Some(price)) = (&product.title, product.price) {
            let candidates = self.store.find_products_by_price_bucket(retailer, price).await?;
            if let Some((similarity, candidate)) = best_title_match(title, &candidates) {
                if similarity > 0.85 {
                    let confidence = (0.80 + (similarity - 0.85) * 0.8).min(0.88);
                    consider(MatchResult {
                        classification: Classification::Existing,
                        confidence,
                        existing_product_id: Some(candidate.id),
                        method: "title_price",
                    });
                }
            }
        }

        match best {
            Some(result) if result.confidence > NEW_PRODUCT_THRESHOLD => Ok(result),
            Some(result) if result.confidence <= MANUAL_REVIEW_THRESHOLD => Ok(MatchResult {
                classification: Classification::ManualReview,
                ..result
            }),
            Some(result) => Ok(MatchResult { classification: Classification::New, ..result }),
            None => Ok(MatchResult {
                classification: Classification::New,
                confidence: 0.95,
                existing_product_id: None,
                method: "no_match",
            }),
        }
    }
}

fn best_title_match<'a>(title: &str, candidates: &'a [Product]) -> Option<(f64, &'a Product)> {
    candidates
        .iter()
        .map(|c| (strsim::normalized_levenshtein(title, &c.title), c))
        .filter(|(sim, _)| *sim > 0.0)
        .fold(None, |acc, (sim, c)| match acc {
            Some((best_sim, _)) if best_sim >= sim => acc,
            _ => Some((sim, c)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_normalization_is_idempotent_for_every_retailer() {
        let urls = [
            ("revolve", "https://revolve.com/p/dress.html?navsrc=search&color=red"),
            ("asos", "https://asos.com/prd/12345?currentpricerange=10-20&sort=freshness"),
            ("generic", "https://example.com/p?utm_source=x&id=7"),
        ];
        for (retailer, url) in urls {
            let once = normalize_url(retailer, url);
            let twice = normalize_url(retailer, &once);
            assert_eq!(once, twice, "normalize is not idempotent for {retailer}");
        }
    }

    #[test]
    fn revolve_drops_entire_query_string() {
        let normalized = normalize_url("revolve", "https://revolve.com/p/dress.html?navsrc=search&color=red");
        assert!(!normalized.contains('?'));
    }

    #[test]
    fn asos_strips_pricerange_and_sort_in_addition_to_generic_keys() {
        let normalized = normalize_url("asos", "https://asos.com/prd/12345?currentpricerange=10-20&sort=freshness&navsrc=x");
        assert!(!normalized.contains("currentpricerange"));
        assert!(!normalized.contains("sort="));
        assert!(!normalized.contains("navsrc"));
    }

    #[test]
    fn extracts_product_codes_for_every_named_retailer() {
        assert_eq!(extract_product_code("revolve", "https://revolve.com/p/ABC-123.html"), Some("ABC-123".to_string()));
        assert_eq!(extract_product_code("asos", "https://asos.com/prd/987654"), Some("987654".to_string()));
        assert_eq!(
            extract_product_code("anthropologie", "https://anthropologie.com/products/wrap-dress?color=red"),
            Some("wrap-dress".to_string())
        );
    }

    #[test]
    fn confidences_stay_within_unit_interval() {
        let confidences = [1.00, 0.95, 0.93, 0.90, 0.88, 0.82, 0.95];
        for c in confidences {
            assert!((0.0..=1.0).contains(&c));
        }
    }

    #[test]
    fn image_filename_token_strips_size_suffix_and_extension() {
        assert_eq!(image_filename_token("https://cdn.revolve.com/images/dress_800x800.jpg"), Some("dress".to_string()));
        assert_eq!(image_filename_token("https://cdn.example.com/a.jpg"), None);
    }

    #[tokio::test]
    async fn image_identifier_match_fires_when_no_other_signal_does() {
        use catalog_extraction::stores::MemoryStore;
        use catalog_extraction::types::{Product, StockState};
        use chrono::Utc;
        use std::sync::Arc;

        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        store
            .upsert_product(Product {
                id: uuid::Uuid::now_v7(),
                retailer: "revolve".into(),
                product_code: None,
                normalized_url: "https://revolve.com/p/old-url.html".into(),
                canonical_url: "https://revolve.com/p/old-url.html".into(),
                title: "Floral Wrap Dress".into(),
                brand: None,
                current_price: 128.0,
                original_price: None,
                currency: "USD".into(),
                on_sale: false,
                stock_state: StockState::InStock,
                category: "dresses".into(),
                image_urls: vec!["https://cdn.revolve.com/images/floralwrap_800x800.jpg".into()],
                description: None,
                neckline: None,
                sleeve_length: None,
                first_seen: now,
                last_seen: now,
                last_updated: now,
            })
            .await
            .unwrap();

        let detector = ChangeDetector::new(store);
        let crawled = ExtractedProduct {
            url: "https://revolve.com/p/new-url-same-product.html".into(),
            title: Some("Completely Different Title".into()),
            price: Some(999.0),
            image_urls: vec!["https://cdn.revolve.com/images/floralwrap_1200x1200.jpg?v=2".into()],
            ..Default::default()
        };
        let result = detector.classify_one("revolve", &crawled, &[]).await.unwrap();
        assert_eq!(result.method, "image_identifier");
        assert_eq!(result.confidence, 0.82);
        assert_eq!(result.classification, Classification::Existing);
    }
}
