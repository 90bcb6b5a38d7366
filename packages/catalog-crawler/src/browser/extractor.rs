//! The browser extraction tower (§4.4): stealth navigation, screenshot
//! capture, vision + DOM dual extraction with cross-validation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::input::{DispatchMouseEventParams, DispatchMouseEventType};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotParams;
use chromiumoxide::{Browser, Page};
use tokio::sync::Mutex as AsyncMutex;

use catalog_extraction::traits::pattern_learner::FailureCategory;
use catalog_extraction::types::{DispatchResult, ElementType, ExtractedProduct, ExtractionMethod};
use catalog_extraction::{ExtractionTower, PatternLearner, VisionProvider};

use crate::browser::profile::ProfileManager;
use crate::browser::stealth::{apply_stealth, browser_config};

/// Overlay dismissal selectors, in priority order: cookie-accept buttons,
/// newsletter close buttons, generic X-icon closers.
const OVERLAY_SELECTORS: &[&str] = &[
    "button[aria-label='Close']",
    "button[aria-label='close']",
    ".cookie-consent-accept",
    "#onetrust-accept-btn-handler",
    ".modal-close",
    ".newsletter-popup-close",
    "[class*='close-button']",
    "[class*='icon-close']",
];

const PRESS_AND_HOLD_SELECTORS: &[&str] = &["#px-captcha", ".press-and-hold", "[id*='hold-button']"];
const CHECKBOX_CHALLENGE_SELECTORS: &[&str] = &["input[type='checkbox'][class*='captcha']", ".g-recaptcha"];
const IFRAME_CHALLENGE_SELECTORS: &[&str] = &["iframe[src*='captcha']", "iframe[title*='challenge']"];

const MAX_ATTEMPTS: u32 = 3;
const VISION_IMAGE_DIMENSION_CAP: u32 = 16_383;

/// Title-similarity floor below which a vision/DOM title pair is flagged as
/// mismatched; below the stricter floor the DOM value overrides (§4.4,
/// open question decision #1 — implemented exactly as prescribed).
const TITLE_WARN_THRESHOLD: f64 = 0.7;
const TITLE_OVERRIDE_THRESHOLD: f64 = 0.5;

/// Numeric-difference thresholds for the price validation pass, analogous
/// to the title thresholds above.
const PRICE_WARN_THRESHOLD: f64 = 0.01;
const PRICE_OVERRIDE_THRESHOLD: f64 = 1.00;

/// Catalog-mode fuzzy-match floor between a vision product card and a
/// DOM-extracted anchor (§4.4 merge strategy).
const CARD_TITLE_MATCH_FLOOR: f64 = 0.5;

/// Generic last-resort selectors, tried after ranked Pattern Learner hints
/// and vision-produced hint selectors are exhausted (§4.4 tertiary step).
fn generic_fallback_selectors(element_type: ElementType) -> &'static [&'static str] {
    match element_type {
        ElementType::Title => &["h1", "[class*='product-title']", "[data-test*='title']"],
        ElementType::Price => &["[class*='price']", "[data-test*='price']", "[itemprop='price']"],
        ElementType::Description => &["[class*='description']", "[itemprop='description']"],
        ElementType::Image => &["picture img", "img[class*='product']"],
        ElementType::ProductLink => &["a[href*='/product']", "a[class*='product-card']", "a[class*='product-link']"],
        _ => &[],
    }
}

fn element_type_from_hint_key(key: &str) -> Option<ElementType> {
    match key {
        "title" => Some(ElementType::Title),
        "price" => Some(ElementType::Price),
        "image" => Some(ElementType::Image),
        "description" => Some(ElementType::Description),
        "product_link" => Some(ElementType::ProductLink),
        _ => None,
    }
}

/// Selector hints for each element type, produced by the secondary vision
/// call (§4.4 step: "Secondary: DOM hint generation").
type SelectorHints = HashMap<ElementType, Vec<String>>;

/// A DOM-extracted product-link anchor, used only during the catalog-mode
/// merge; discarded once merged into an [`ExtractedProduct`].
struct DomCard {
    url: String,
    title: Option<String>,
}

/// Aggregate validation outcome counts for one catalog-mode merge (§4.4).
#[derive(Debug, Default)]
struct MergeStats {
    matched: usize,
    link_only: usize,
}

pub struct BrowserExtractor {
    profiles: ProfileManager,
    vision: Arc<dyn VisionProvider>,
    pattern_learner: Arc<dyn PatternLearner>,
    /// Ensures at most one browser context is open per retailer profile at
    /// a time (§5 shared-resource policy).
    retailer_locks: AsyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl BrowserExtractor {
    pub fn new(profiles: ProfileManager, vision: Arc<dyn VisionProvider>, pattern_learner: Arc<dyn PatternLearner>) -> Self {
        Self {
            profiles,
            vision,
            pattern_learner,
            retailer_locks: AsyncMutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, retailer: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.retailer_locks.lock().await;
        locks
            .entry(retailer.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    async fn launch(&self, retailer: &str) -> crate::error::Result<(Browser, Page)> {
        let profile_dir = self.profiles.profile_dir(retailer)?;
        let config = browser_config(&profile_dir)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| crate::error::CrawlError::Fatal(format!("browser launch failed: {e}")))?;

        tokio::spawn(async move { while handler.next().await.is_some() {} });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| crate::error::CrawlError::NavigationFailed(e.to_string()))?;
        apply_stealth(&page).await?;

        Ok((browser, page))
    }

    async fn navigate(&self, page: &Page, url: &str) -> crate::error::Result<()> {
        page.goto(url)
            .await
            .map_err(|e| crate::error::CrawlError::NavigationFailed(e.to_string()))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| crate::error::CrawlError::NavigationFailed(e.to_string()))?;
        Ok(())
    }

    async fn dismiss_overlays(&self, page: &Page) {
        for selector in OVERLAY_SELECTORS {
            if let Ok(elements) = page.find_elements(*selector).await {
                for element in elements {
                    let _ = element.click().await;
                }
            }
        }
    }

    /// Detects and attempts to clear verification challenges. Returns
    /// whether a challenge was found (regardless of whether it cleared).
    async fn handle_challenges(&self, page: &Page) -> bool {
        for selector in PRESS_AND_HOLD_SELECTORS {
            if let Ok(element) = page.find_element(*selector).await {
                if let Ok(bounds) = element.bounding_box().await {
                    let (x, y) = (bounds.x + bounds.width / 2.0, bounds.y + bounds.height / 2.0);
                    let _ = self.press_and_hold(page, x, y).await;
                    return true;
                }
            }
        }

        for selector in CHECKBOX_CHALLENGE_SELECTORS
            .iter()
            .chain(IFRAME_CHALLENGE_SELECTORS.iter())
        {
            if let Ok(element) = page.find_element(*selector).await {
                let _ = element.click().await;
                tokio::time::sleep(Duration::from_millis(800)).await;
                return true;
            }
        }

        false
    }

    /// Positions the mouse at `(x, y)`, presses, holds ~5 seconds, releases
    /// (§4.4 point 3).
    async fn press_and_hold(&self, page: &Page, x: f64, y: f64) -> crate::error::Result<()> {
        let press = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MousePressed)
            .x(x)
            .y(y)
            .button(chromiumoxide::cdp::browser_protocol::input::MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(|e| crate::error::CrawlError::AntiBotBlocked(e.to_string()))?;
        page.execute(press)
            .await
            .map_err(|e| crate::error::CrawlError::AntiBotBlocked(e.to_string()))?;

        tokio::time::sleep(Duration::from_secs(5)).await;

        let release = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseReleased)
            .x(x)
            .y(y)
            .button(chromiumoxide::cdp::browser_protocol::input::MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(|e| crate::error::CrawlError::AntiBotBlocked(e.to_string()))?;
        page.execute(release)
            .await
            .map_err(|e| crate::error::CrawlError::AntiBotBlocked(e.to_string()))?;

        Ok(())
    }

    async fn screenshot_full_page(&self, page: &Page) -> crate::error::Result<Vec<u8>> {
        let params = CaptureScreenshotParams::builder().build();
        page.screenshot(params)
            .await
            .map_err(|e| crate::error::CrawlError::NavigationFailed(format!("screenshot failed: {e}")))
    }

    async fn homepage_redirect_detected(&self, page: &Page, requested_url: &str) -> bool {
        let current_url = page.url().await.ok().flatten().unwrap_or_default();
        let title = page.get_title().await.ok().flatten().unwrap_or_default();
        let title_lower = title.to_lowercase();
        let looks_like_landing = ["shop all", "new arrivals", "welcome to"]
            .iter()
            .any(|sig| title_lower.contains(sig));
        let path_mismatch = !requested_url.is_empty() && !current_url.contains(strip_scheme_host(requested_url));
        looks_like_landing || path_mismatch
    }

    async fn extract_single_attempt(&self, retailer: &str, url: &str) -> crate::error::Result<ExtractedProduct> {
        let (_browser, page) = self.launch(retailer).await?;
        self.navigate(&page, url).await?;
        self.dismiss_overlays(&page).await;
        let challenged = self.handle_challenges(&page).await;
        if challenged {
            self.pattern_learner
                .record_outcome(retailer, ElementType::AntiBotBypass, "press-and-hold", true, None, None)
                .await;
        }

        if self.homepage_redirect_detected(&page, url).await {
            return Err(crate::error::CrawlError::Delisted);
        }

        let full_page = self.screenshot_full_page(&page).await?;
        let images = vec![resize_if_needed(full_page)];

        let vision_prompt = "Extract title, brand, price, original_price, description, stock_state, \
            on_sale, category, image_urls, colors, sizes, material, care_notes, neckline, sleeve_length \
            from this product page screenshot. Respond with a JSON object only.";
        let vision_response = self
            .vision
            .complete_with_images(vision_prompt, &images, 2_000)
            .await
            .map_err(crate::error::CrawlError::from)?;

        let mut product: ExtractedProduct =
            catalog_extraction::markdown::repair::parse_json_with_repair(&vision_response)
                .and_then(|v| serde_json::from_value(v).ok())
                .unwrap_or_default();
        product.url = url.to_string();

        let hints = self.generate_dom_hints(&images[0]).await;
        self.guided_dom_fill(&page, retailer, &mut product, &hints).await;
        self.cross_validate_title(&page, &mut product).await;
        self.cross_validate_price(&page, &mut product).await;

        Ok(product)
    }

    /// Secondary: send one screenshot to the vision model asking for
    /// probable CSS selectors per element type (§4.4).
    async fn generate_dom_hints(&self, image: &[u8]) -> SelectorHints {
        let prompt = "Given this product page screenshot, suggest probable CSS selectors for each of: \
            title, price, image, description, product_link. Respond with a JSON object whose keys are \
            those names and whose values are arrays of CSS selector strings.";
        let Ok(response) = self.vision.complete_with_images(prompt, std::slice::from_ref(&image.to_vec()), 800).await else {
            return SelectorHints::new();
        };
        let Some(value) = catalog_extraction::markdown::repair::parse_json_with_repair(&response) else {
            return SelectorHints::new();
        };

        let mut hints = SelectorHints::new();
        if let Some(obj) = value.as_object() {
            for (key, selectors) in obj {
                let Some(element_type) = element_type_from_hint_key(key) else { continue };
                let list = selectors
                    .as_array()
                    .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                    .unwrap_or_default();
                hints.insert(element_type, list);
            }
        }
        hints
    }

    /// Tertiary: for any field the vision primary did not fill, query the
    /// DOM using ranked Pattern Learner selectors, then vision-hint
    /// selectors, then the generic fallback list, recording the outcome of
    /// each attempted selector (§4.4).
    async fn guided_dom_fill(&self, page: &Page, retailer: &str, product: &mut ExtractedProduct, hints: &SelectorHints) {
        if product.title.is_none() {
            if let Some(value) = self.query_dom_field(page, retailer, ElementType::Title, hints).await {
                product.title = Some(value);
            }
        }
        if product.price.is_none() {
            if let Some(value) = self.query_dom_field(page, retailer, ElementType::Price, hints).await {
                product.price = catalog_extraction::markdown::repair::coerce_price(&value);
            }
        }
        if product.description.is_none() {
            if let Some(value) = self.query_dom_field(page, retailer, ElementType::Description, hints).await {
                product.description = Some(value);
            }
        }
        if product.image_urls.is_empty() {
            if let Some(src) = self.query_dom_attribute(page, retailer, ElementType::Image, "src", hints).await {
                product.image_urls.push(src);
            }
        }
    }

    /// Tries each candidate selector's text content in priority order,
    /// recording success/failure per selector to the Pattern Learner.
    async fn query_dom_field(&self, page: &Page, retailer: &str, element_type: ElementType, hints: &SelectorHints) -> Option<String> {
        for selector in self.ranked_selector_candidates(retailer, element_type, hints).await {
            if let Ok(element) = page.find_element(&selector).await {
                if let Some(text) = element.inner_text().await.ok().flatten() {
                    let text = text.trim().to_string();
                    if !text.is_empty() {
                        self.pattern_learner.record_outcome(retailer, element_type, &selector, true, None, None).await;
                        return Some(text);
                    }
                }
            }
            self.pattern_learner.record_outcome(retailer, element_type, &selector, false, None, None).await;
        }
        None
    }

    /// As [`Self::query_dom_field`] but reads an attribute instead of text
    /// content (used for image `src`).
    async fn query_dom_attribute(
        &self,
        page: &Page,
        retailer: &str,
        element_type: ElementType,
        attribute: &str,
        hints: &SelectorHints,
    ) -> Option<String> {
        for selector in self.ranked_selector_candidates(retailer, element_type, hints).await {
            if let Ok(element) = page.find_element(&selector).await {
                if let Some(value) = element.attribute(attribute).await.ok().flatten() {
                    self.pattern_learner.record_outcome(retailer, element_type, &selector, true, None, None).await;
                    return Some(value);
                }
            }
            self.pattern_learner.record_outcome(retailer, element_type, &selector, false, None, None).await;
        }
        None
    }

    /// Candidate selectors in priority order: ranked Pattern Learner
    /// selectors, vision-produced hints, generic fallback list.
    async fn ranked_selector_candidates(&self, retailer: &str, element_type: ElementType, hints: &SelectorHints) -> Vec<String> {
        let mut candidates: Vec<String> =
            self.pattern_learner.get_ranked_patterns(retailer, Some(element_type), false).await.into_iter().map(|p| p.payload).collect();
        if let Some(hinted) = hints.get(&element_type) {
            candidates.extend(hinted.iter().cloned());
        }
        candidates.extend(generic_fallback_selectors(element_type).iter().map(|s| s.to_string()));
        candidates
    }

    /// Price validation pass, analogous to [`Self::cross_validate_title`]:
    /// warn on a numeric difference past `PRICE_WARN_THRESHOLD`, override
    /// past the stricter `PRICE_OVERRIDE_THRESHOLD`.
    async fn cross_validate_price(&self, page: &Page, product: &mut ExtractedProduct) {
        let Some(vision_price) = product.price else { return };
        for selector in generic_fallback_selectors(ElementType::Price) {
            let Ok(element) = page.find_element(*selector).await else { continue };
            let Some(text) = element.inner_text().await.ok().flatten() else { continue };
            let Some(dom_price) = catalog_extraction::markdown::repair::coerce_price(&text) else { continue };

            let diff = (vision_price - dom_price).abs();
            if diff > PRICE_OVERRIDE_THRESHOLD {
                product.price = Some(dom_price);
                product.warnings.push("price-mismatch-overridden".to_string());
            } else if diff > PRICE_WARN_THRESHOLD {
                product.warnings.push("price-mismatch".to_string());
            }
            return;
        }
    }

    /// DOM extraction of product-link anchors for the catalog-mode merge
    /// (§4.4): tries ranked/hinted/generic selectors until one yields any
    /// anchors, pulling a title from each card for validation.
    async fn extract_dom_cards(&self, page: &Page, retailer: &str, hints: &SelectorHints) -> Vec<DomCard> {
        for selector in self.ranked_selector_candidates(retailer, ElementType::ProductLink, hints).await {
            let Ok(elements) = page.find_elements(&selector).await else {
                self.pattern_learner.record_outcome(retailer, ElementType::ProductLink, &selector, false, None, None).await;
                continue;
            };
            if elements.is_empty() {
                self.pattern_learner.record_outcome(retailer, ElementType::ProductLink, &selector, false, None, None).await;
                continue;
            }

            let mut cards = Vec::new();
            for element in elements {
                let Some(href) = element.attribute("href").await.ok().flatten() else { continue };
                let title = element.inner_text().await.ok().flatten().map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
                cards.push(DomCard { url: href, title });
            }
            self.pattern_learner.record_outcome(retailer, ElementType::ProductLink, &selector, true, None, None).await;
            return cards;
        }
        Vec::new()
    }

    /// Compares the vision-extracted title against a DOM-queried title and
    /// applies the flag/override rule exactly as prescribed (open question
    /// decision #1): warn below 0.7, override below 0.5.
    async fn cross_validate_title(&self, page: &Page, product: &mut ExtractedProduct) {
        let Some(vision_title) = product.title.clone() else { return };
        let Ok(element) = page.find_element("h1").await else { return };
        let Some(dom_title) = element.inner_text().await.ok().flatten() else { return };

        let similarity = strsim::normalized_levenshtein(&vision_title, &dom_title);
        if similarity < TITLE_OVERRIDE_THRESHOLD {
            product.title = Some(dom_title);
            product.warnings.push("title-mismatch-overridden".to_string());
        } else if similarity < TITLE_WARN_THRESHOLD {
            product.warnings.push("title-mismatch".to_string());
        }
    }

    async fn extract_catalog_attempt(&self, retailer: &str, url: &str) -> crate::error::Result<Vec<ExtractedProduct>> {
        let (_browser, page) = self.launch(retailer).await?;
        self.navigate(&page, url).await?;
        self.dismiss_overlays(&page).await;
        self.handle_challenges(&page).await;

        let full_page = self.screenshot_full_page(&page).await?;
        let images = vec![resize_if_needed(full_page)];

        let hints = self.generate_dom_hints(&images[0]).await;

        let vision_prompt = "List every product card visible on this catalog screenshot: title, price, \
            image URL if visible, whether it is on sale. Respond with a JSON array of objects only.";
        let vision_response = self
            .vision
            .complete_with_images(vision_prompt, &images, 4_000)
            .await
            .map_err(crate::error::CrawlError::from)?;

        let parsed = catalog_extraction::markdown::repair::parse_json_with_repair(&vision_response);
        let vision_products: Vec<ExtractedProduct> = parsed
            .and_then(|v| v.as_array().cloned())
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| serde_json::from_value::<ExtractedProduct>(v).ok())
            .collect();

        let dom_cards = self.extract_dom_cards(&page, retailer, &hints).await;
        let (merged, stats) = merge_catalog_products(vision_products, dom_cards);
        tracing::info!(retailer, url, matched = stats.matched, link_only = stats.link_only, "catalog dual-extraction merge complete");

        Ok(merged)
    }
}

/// Merge strategy (§4.4): positional merge when the two lists are the same
/// length, otherwise fuzzy-match by title similarity with a 0.5 floor.
/// Unmatched DOM links become link-only records flagged as needing
/// re-processing.
fn merge_catalog_products(vision_products: Vec<ExtractedProduct>, dom_cards: Vec<DomCard>) -> (Vec<ExtractedProduct>, MergeStats) {
    let mut stats = MergeStats::default();

    if dom_cards.is_empty() {
        return (vision_products, stats);
    }

    if vision_products.len() == dom_cards.len() {
        let merged = vision_products
            .into_iter()
            .zip(dom_cards)
            .map(|(mut product, card)| {
                if product.url.is_empty() {
                    product.url = card.url;
                }
                stats.matched += 1;
                product
            })
            .collect();
        return (merged, stats);
    }

    let mut used = vec![false; dom_cards.len()];
    let mut merged = Vec::with_capacity(vision_products.len());
    for mut product in vision_products {
        let mut best: Option<(usize, f64)> = None;
        if let Some(title) = &product.title {
            for (i, card) in dom_cards.iter().enumerate() {
                if used[i] {
                    continue;
                }
                let Some(card_title) = &card.title else { continue };
                let similarity = strsim::normalized_levenshtein(title, card_title);
                if similarity >= CARD_TITLE_MATCH_FLOOR && best.map(|(_, best_sim)| similarity > best_sim).unwrap_or(true) {
                    best = Some((i, similarity));
                }
            }
        }

        if let Some((i, _)) = best {
            used[i] = true;
            if product.url.is_empty() {
                product.url = dom_cards[i].url.clone();
            }
            stats.matched += 1;
        }
        merged.push(product);
    }

    for (i, was_used) in used.into_iter().enumerate() {
        if was_used {
            continue;
        }
        let card = &dom_cards[i];
        merged.push(ExtractedProduct {
            url: card.url.clone(),
            title: card.title.clone(),
            warnings: vec!["link-only-needs-reprocessing".to_string()],
            ..Default::default()
        });
        stats.link_only += 1;
    }

    (merged, stats)
}

fn strip_scheme_host(url: &str) -> &str {
    url.split("://").nth(1).and_then(|rest| rest.split_once('/')).map(|(_, path)| path).unwrap_or(url)
}

/// Resizes a screenshot if it exceeds the vision model's dimension cap,
/// preserving aspect ratio with nearest-integer scaling (§4.4 point 4, §6).
/// A screenshot that fails to decode is passed through unchanged rather
/// than failing the extraction over an image the vision call may still
/// accept.
fn resize_if_needed(bytes: Vec<u8>) -> Vec<u8> {
    let Ok(img) = image::load_from_memory(&bytes) else {
        return bytes;
    };

    let (width, height) = (img.width(), img.height());
    if width <= VISION_IMAGE_DIMENSION_CAP && height <= VISION_IMAGE_DIMENSION_CAP {
        return bytes;
    }

    let scale = VISION_IMAGE_DIMENSION_CAP as f64 / width.max(height) as f64;
    let new_width = ((width as f64 * scale).round() as u32).max(1);
    let new_height = ((height as f64 * scale).round() as u32).max(1);
    let resized = img.resize(new_width, new_height, image::imageops::FilterType::Nearest);

    let mut out = Vec::new();
    match resized.write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png) {
        Ok(()) => out,
        Err(e) => {
            tracing::warn!(error = %e, "screenshot resize re-encode failed, submitting original bytes");
            bytes
        }
    }
}

#[async_trait]
impl ExtractionTower for BrowserExtractor {
    async fn extract_product(&self, retailer: &str, url: &str) -> DispatchResult {
        let start = Instant::now();
        let lock = self.lock_for(retailer).await;
        let _guard = lock.lock().await;

        for attempt in 0..MAX_ATTEMPTS {
            match self.extract_single_attempt(retailer, url).await {
                Ok(product) => return DispatchResult::single_success(product, ExtractionMethod::Browser, start.elapsed()),
                Err(crate::error::CrawlError::Delisted) => {
                    return DispatchResult::delisted(ExtractionMethod::Browser, start.elapsed())
                }
                Err(e) => {
                    let category = FailureCategory::classify(&e.to_string());
                    tracing::warn!(retailer, url, attempt, error = %e, ?category, "browser extraction attempt failed");
                    self.pattern_learner
                        .record_outcome(
                            retailer,
                            ElementType::AntiBotBypass,
                            "browser-extraction",
                            false,
                            None,
                            Some(category),
                        )
                        .await;
                    if attempt + 1 < MAX_ATTEMPTS {
                        tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
                    } else {
                        return DispatchResult::failure(ExtractionMethod::Browser, e.to_string(), false, start.elapsed());
                    }
                }
            }
        }
        DispatchResult::failure(ExtractionMethod::Browser, "exhausted retries".into(), false, start.elapsed())
    }

    async fn extract_catalog_page(&self, retailer: &str, url: &str) -> DispatchResult {
        let start = Instant::now();
        let lock = self.lock_for(retailer).await;
        let _guard = lock.lock().await;

        for attempt in 0..MAX_ATTEMPTS {
            match self.extract_catalog_attempt(retailer, url).await {
                Ok(products) => return DispatchResult::catalog_success(products, ExtractionMethod::Browser, start.elapsed()),
                Err(e) => {
                    tracing::warn!(retailer, url, attempt, error = %e, "browser catalog extraction attempt failed");
                    if attempt + 1 < MAX_ATTEMPTS {
                        tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
                    } else {
                        return DispatchResult::failure(ExtractionMethod::Browser, e.to_string(), false, start.elapsed());
                    }
                }
            }
        }
        DispatchResult::failure(ExtractionMethod::Browser, "exhausted retries".into(), false, start.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scheme_and_host_leaving_the_path() {
        assert_eq!(strip_scheme_host("https://example.com/products/123"), "products/123");
    }

    #[test]
    fn overlay_selector_list_includes_a_cookie_consent_handler() {
        assert!(OVERLAY_SELECTORS.iter().any(|s| s.contains("cookie") || s.contains("onetrust")));
    }

    fn encode_png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::new(width, height);
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img).write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png).unwrap();
        bytes
    }

    #[test]
    fn screenshots_under_the_cap_pass_through_unchanged() {
        let original = encode_png(800, 600);
        let resized = resize_if_needed(original.clone());
        assert_eq!(original, resized);
    }

    #[test]
    fn screenshots_over_the_cap_are_resized_preserving_aspect_ratio() {
        let original = encode_png(20_000, 10_000);
        let resized = resize_if_needed(original);
        let decoded = image::load_from_memory(&resized).unwrap();
        assert!(decoded.width() <= VISION_IMAGE_DIMENSION_CAP);
        assert!(decoded.height() <= VISION_IMAGE_DIMENSION_CAP);
        assert_eq!(decoded.width(), VISION_IMAGE_DIMENSION_CAP);
        let ratio = decoded.height() as f64 / decoded.width() as f64;
        assert!((ratio - 0.5).abs() < 0.01, "expected ~2:1 aspect ratio preserved, got {ratio}");
    }
}
