//! Per-retailer token buckets (§5): capacity and refill rate derived from
//! anti-bot severity, shared by the Crawler and the Extractors.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;

use catalog_extraction::types::AntiBotSeverity;

type Limiter = RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

/// Requests per minute allowed for each severity tier. Tighter for more
/// defensive retailers so the Crawler naturally paces itself without an
/// extra sleep.
fn quota_for(severity: AntiBotSeverity) -> Quota {
    let per_minute: NonZeroU32 = match severity {
        AntiBotSeverity::Low => nonzero!(60u32),
        AntiBotSeverity::Medium => nonzero!(30u32),
        AntiBotSeverity::High => nonzero!(15u32),
        AntiBotSeverity::VeryHigh => nonzero!(8u32),
    };
    Quota::per_minute(per_minute)
}

pub struct RateLimiterRegistry {
    limiters: HashMap<String, Arc<Limiter>>,
}

impl RateLimiterRegistry {
    pub fn new(retailers: impl IntoIterator<Item = (String, AntiBotSeverity)>) -> Self {
        let limiters = retailers
            .into_iter()
            .map(|(id, severity)| (id, Arc::new(RateLimiter::direct(quota_for(severity)))))
            .collect();
        Self { limiters }
    }

    /// Blocks the caller until a slot is available for `retailer`. Retailers
    /// with no registered limiter proceed unthrottled (defensive default for
    /// retailers added to the registry without a configured severity).
    pub async fn acquire(&self, retailer: &str) {
        if let Some(limiter) = self.limiters.get(retailer) {
            limiter.until_ready().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unregistered_retailer_never_blocks() {
        let registry = RateLimiterRegistry::new(std::iter::empty());
        registry.acquire("unknown").await;
    }

    #[tokio::test]
    async fn registered_retailer_admits_at_least_one_immediate_request() {
        let registry = RateLimiterRegistry::new([("revolve".to_string(), AntiBotSeverity::Low)]);
        registry.acquire("revolve").await;
    }
}
