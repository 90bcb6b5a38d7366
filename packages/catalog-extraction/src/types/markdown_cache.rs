//! `MarkdownCacheEntry`: URL-keyed, expiring cache of converted markdown.

use chrono::{DateTime, Duration, Utc};

/// Entries older than this are treated as absent regardless of retailer (§3).
pub const DEFAULT_CACHE_EXPIRY_DAYS: i64 = 3;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MarkdownCacheEntry {
    pub url: String,
    pub markdown: String,
    pub canonical_url: String,
    pub captured_at: DateTime<Utc>,
}

impl MarkdownCacheEntry {
    /// A cache hit is never returned once its age exceeds `expiry` (P8).
    pub fn is_fresh(&self, now: DateTime<Utc>, expiry_days: i64) -> bool {
        now - self.captured_at < Duration::days(expiry_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_entries_are_not_fresh() {
        let now = Utc::now();
        let entry = MarkdownCacheEntry {
            url: "https://example.com/p".into(),
            markdown: "# hi".into(),
            canonical_url: "https://example.com/p".into(),
            captured_at: now - Duration::days(DEFAULT_CACHE_EXPIRY_DAYS + 1),
        };
        assert!(!entry.is_fresh(now, DEFAULT_CACHE_EXPIRY_DAYS));

        let fresh = MarkdownCacheEntry {
            captured_at: now - Duration::hours(1),
            ..entry
        };
        assert!(fresh.is_fresh(now, DEFAULT_CACHE_EXPIRY_DAYS));
    }
}
