//! Concrete pattern learner sitting on top of a [`Store`].
//!
//! The learner is a leaf dependency: it never calls back into an extractor.
//! Extractors hold a read/write handle to it and the learner publishes
//! read-only snapshots (§9 design note on cyclic references).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::traits::pattern_learner::{FailureCategory, PatternLearner, RankedPattern};
use crate::traits::store::Store;
use crate::types::{ElementType, LearnedPattern, PatternKind};

/// Patterns below this confidence are hidden from callers unless they ask
/// for everything (§4.2).
const CONFIDENCE_FLOOR: f32 = 0.3;

/// The only cross-function transfer pair implemented (open question #3,
/// decided in DESIGN.md): anti-bot bypass patterns learned by the crawler
/// may be deposited into the extractor's surface at reduced confidence.
const ALLOWED_TRANSFERS: &[(&str, ElementType, &str, ElementType)] = &[(
    "crawler",
    ElementType::AntiBotBypass,
    "extractor",
    ElementType::AntiBotBypass,
)];

pub struct StorePatternLearner {
    store: Arc<dyn Store>,
}

impl StorePatternLearner {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

}

#[async_trait]
impl PatternLearner for StorePatternLearner {
    async fn get_ranked_patterns(
        &self,
        retailer: &str,
        element_type: Option<ElementType>,
        include_all: bool,
    ) -> Vec<RankedPattern> {
        let mut patterns = match self.store.list_patterns(retailer).await {
            Ok(p) => p,
            Err(_) => return Vec::new(),
        };

        if let Some(et) = element_type {
            patterns.retain(|p| p.element_type == et);
        }
        if !include_all {
            patterns.retain(|p| p.confidence > CONFIDENCE_FLOOR);
        }

        patterns.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.success_count.cmp(&a.success_count))
        });

        patterns
            .into_iter()
            .map(|p| RankedPattern {
                payload: p.payload,
                confidence: p.confidence,
                success_count: p.success_count,
                failure_count: p.failure_count,
                visual_hints: p.visual_hints,
            })
            .collect()
    }

    async fn get_placeholder_rules(&self, retailer: &str) -> Vec<String> {
        match self.store.list_patterns(retailer).await {
            Ok(patterns) => patterns
                .into_iter()
                .filter(|p| p.pattern_kind == PatternKind::PlaceholderExclusion)
                .map(|p| p.payload)
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    async fn record_outcome(
        &self,
        retailer: &str,
        element_type: ElementType,
        payload: &str,
        success: bool,
        visual_hints: Option<serde_json::Value>,
        failure_category: Option<FailureCategory>,
    ) {
        let now = Utc::now();
        let pattern_kind = if payload.starts_with("url-transform:") {
            PatternKind::UrlTransform
        } else {
            PatternKind::SelectorHint
        };
        let existing = self
            .store
            .list_patterns(retailer)
            .await
            .ok()
            .and_then(|patterns| {
                patterns
                    .into_iter()
                    .find(|p| p.element_type == element_type && p.pattern_kind == pattern_kind && p.payload == payload)
            });

        let mut pattern = existing
            .unwrap_or_else(|| LearnedPattern::new(retailer, element_type, pattern_kind, payload, now));

        if success {
            pattern.record_success(visual_hints, now);
        } else {
            pattern.record_failure(failure_category.unwrap_or(FailureCategory::Unknown), now);
        }

        // Best-effort: a store hiccup here is swallowed, not surfaced (§4.2).
        let _ = self.store.upsert_pattern(pattern).await;
    }

    async fn record_cross_function_hint(
        &self,
        source_kind: &str,
        source_category: ElementType,
        target_kind: &str,
        target_category: ElementType,
        payload: &str,
        confidence_transfer: f32,
    ) {
        let allowed = ALLOWED_TRANSFERS
            .iter()
            .any(|&(sk, sc, tk, tc)| sk == source_kind && sc == source_category && tk == target_kind && tc == target_category);
        if !allowed {
            tracing::debug!(
                source_kind,
                target_kind,
                "rejected cross-function pattern transfer outside the fixed table"
            );
            return;
        }

        let now = Utc::now();
        let mut pattern = LearnedPattern::new(target_kind, target_category, PatternKind::SelectorHint, payload, now);
        pattern.confidence = confidence_transfer.clamp(0.0, 1.0);
        let _ = self.store.upsert_pattern(pattern).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;
    use std::sync::Arc;

    fn learner() -> StorePatternLearner {
        StorePatternLearner::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn success_raises_and_failure_lowers_confidence_monotonically() {
        let learner = learner();
        learner
            .record_outcome("revolve", ElementType::Title, ".product-title", true, None, None)
            .await;
        let ranked = learner.get_ranked_patterns("revolve", Some(ElementType::Title), true).await;
        let after_success = ranked[0].confidence;
        assert!(after_success >= 0.7);

        learner
            .record_outcome("revolve", ElementType::Title, ".product-title", false, None, None)
            .await;
        let ranked = learner.get_ranked_patterns("revolve", Some(ElementType::Title), true).await;
        assert!(ranked[0].confidence < after_success);
    }

    #[tokio::test]
    async fn low_confidence_patterns_are_hidden_unless_all_requested() {
        let learner = learner();
        for _ in 0..10 {
            learner
                .record_outcome("asos", ElementType::Price, ".price", false, None, None)
                .await;
        }
        let visible = learner.get_ranked_patterns("asos", Some(ElementType::Price), false).await;
        assert!(visible.is_empty());
        let all = learner.get_ranked_patterns("asos", Some(ElementType::Price), true).await;
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn cross_function_transfer_is_restricted_to_the_fixed_table() {
        let learner = learner();
        learner
            .record_cross_function_hint(
                "crawler",
                ElementType::AntiBotBypass,
                "extractor",
                ElementType::AntiBotBypass,
                "press-and-hold",
                0.5,
            )
            .await;
        let ranked = learner
            .get_ranked_patterns("extractor", Some(ElementType::AntiBotBypass), true)
            .await;
        assert_eq!(ranked.len(), 1);

        learner
            .record_cross_function_hint(
                "extractor",
                ElementType::Title,
                "crawler",
                ElementType::Title,
                "bogus",
                0.5,
            )
            .await;
        let ranked = learner.get_ranked_patterns("crawler", Some(ElementType::Title), true).await;
        assert!(ranked.is_empty());
    }
}
