//! The `Product` entity: a stable, durable row keyed by (retailer, product
//! code) when a code is extractable, otherwise by normalized URL.

use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum StockState {
    #[default]
    InStock,
    Low,
    Out,
}

pub type SaleFlag = bool;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub retailer: String,
    pub product_code: Option<String>,
    pub normalized_url: String,
    pub canonical_url: String,
    pub title: String,
    pub brand: Option<String>,
    pub current_price: f64,
    pub original_price: Option<f64>,
    pub currency: String,
    pub on_sale: SaleFlag,
    pub stock_state: StockState,
    pub category: String,
    pub image_urls: Vec<String>,
    pub description: Option<String>,
    pub neckline: Option<String>,
    pub sleeve_length: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Product {
    /// `current_price <= original_price` whenever `on_sale` holds (§3 invariant).
    pub fn price_invariant_holds(&self) -> bool {
        match self.original_price {
            Some(original) if self.on_sale => self.current_price <= original,
            _ => true,
        }
    }

    /// `first_seen <= last_seen <= last_updated` (P2).
    pub fn timestamps_monotonic(&self) -> bool {
        self.first_seen <= self.last_seen && self.last_seen <= self.last_updated
    }

    /// Refresh last-seen on a re-observation without disturbing first-seen.
    pub fn touch(&mut self, observed_at: DateTime<Utc>) {
        if observed_at > self.last_seen {
            self.last_seen = observed_at;
        }
    }
}
