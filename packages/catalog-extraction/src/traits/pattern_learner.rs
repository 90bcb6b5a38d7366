//! The pattern learner's read/write contract (§4.2).

use async_trait::async_trait;

use crate::types::ElementType;

/// Re-exported under a stable name so downstream crates don't need to reach
/// into `types::pattern` directly.
pub use crate::types::pattern::FailureCategory;

#[derive(Debug, Clone)]
pub struct RankedPattern {
    pub payload: String,
    pub confidence: f32,
    pub success_count: u64,
    pub failure_count: u64,
    pub visual_hints: Option<serde_json::Value>,
}

#[async_trait]
pub trait PatternLearner: Send + Sync {
    /// Ordered by confidence descending, then success count descending.
    /// Only patterns above the internal floor are returned unless
    /// `include_all` is set.
    async fn get_ranked_patterns(
        &self,
        retailer: &str,
        element_type: Option<ElementType>,
        include_all: bool,
    ) -> Vec<RankedPattern>;

    async fn get_placeholder_rules(&self, retailer: &str) -> Vec<String>;

    /// Best-effort: failures to persist are swallowed, never surfaced to
    /// the caller (§4.2 failure semantics). `failure_category` is ignored
    /// when `success` is true; when `success` is false and no category is
    /// given, the implementation classifies it as
    /// [`FailureCategory::Unknown`] rather than guessing (SPEC_FULL.md §1
    /// pattern-learner error classification).
    async fn record_outcome(
        &self,
        retailer: &str,
        element_type: ElementType,
        payload: &str,
        success: bool,
        visual_hints: Option<serde_json::Value>,
        failure_category: Option<FailureCategory>,
    );

    /// Deposits a reduced-confidence copy of a pattern into a target
    /// surface, restricted to the fixed transfer table (open question #3).
    async fn record_cross_function_hint(
        &self,
        source_kind: &str,
        source_category: ElementType,
        target_kind: &str,
        target_category: ElementType,
        payload: &str,
        confidence_transfer: f32,
    );
}
