//! Value objects returned by the extraction towers and the dispatcher.
//!
//! These are explicit structs, not untyped dictionaries: the dual-tower
//! design needs one shape that both the markdown and browser paths can
//! populate, with optional fields left `None` rather than omitted.

use crate::types::product::StockState;

/// Which tower produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ExtractionMethod {
    Markdown,
    Browser,
}

/// A single extracted product, as produced by either tower, before the
/// change detector has matched it against the persistence store.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ExtractedProduct {
    pub url: String,
    pub title: Option<String>,
    pub brand: Option<String>,
    pub price: Option<f64>,
    pub original_price: Option<f64>,
    pub on_sale: Option<bool>,
    pub stock_state: Option<StockState>,
    pub category: Option<String>,
    pub image_urls: Vec<String>,
    pub description: Option<String>,
    pub colors: Vec<String>,
    pub sizes: Vec<String>,
    pub material: Option<String>,
    pub care_notes: Option<String>,
    pub neckline: Option<String>,
    pub sleeve_length: Option<String>,
    /// Set when the vision/DOM validation pass flagged a field mismatch.
    pub warnings: Vec<String>,
}

/// The uniform result shape exposed by the Extraction Dispatcher (§4.5).
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub success: bool,
    pub product: Option<ExtractedProduct>,
    pub products: Vec<ExtractedProduct>,
    pub method: ExtractionMethod,
    pub elapsed: std::time::Duration,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub delisted: bool,
    /// Whether a retriable failure should fall through to the other tower.
    pub should_fallback: bool,
}

impl DispatchResult {
    pub fn single_success(product: ExtractedProduct, method: ExtractionMethod, elapsed: std::time::Duration) -> Self {
        Self {
            success: true,
            product: Some(product),
            products: Vec::new(),
            method,
            elapsed,
            warnings: Vec::new(),
            errors: Vec::new(),
            delisted: false,
            should_fallback: false,
        }
    }

    pub fn catalog_success(products: Vec<ExtractedProduct>, method: ExtractionMethod, elapsed: std::time::Duration) -> Self {
        Self {
            success: true,
            product: None,
            products,
            method,
            elapsed,
            warnings: Vec::new(),
            errors: Vec::new(),
            delisted: false,
            should_fallback: false,
        }
    }

    pub fn failure(method: ExtractionMethod, error: String, should_fallback: bool, elapsed: std::time::Duration) -> Self {
        Self {
            success: false,
            product: None,
            products: Vec::new(),
            method,
            elapsed,
            warnings: Vec::new(),
            errors: vec![error],
            delisted: false,
            should_fallback,
        }
    }

    pub fn delisted(method: ExtractionMethod, elapsed: std::time::Duration) -> Self {
        Self {
            success: false,
            product: None,
            products: Vec::new(),
            method,
            elapsed,
            warnings: Vec::new(),
            errors: Vec::new(),
            delisted: true,
            should_fallback: false,
        }
    }
}
