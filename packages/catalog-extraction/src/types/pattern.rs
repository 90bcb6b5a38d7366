//! `LearnedPattern`: per-retailer selector, transformation and extraction
//! outcome record maintained by the pattern learner.

use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ElementType {
    ProductLink,
    Title,
    Price,
    Image,
    Description,
    PaginationNext,
    LoadMoreButton,
    AntiBotBypass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PatternKind {
    SelectorHint,
    UrlTransform,
    PlaceholderExclusion,
}

/// Keyword-classified reason a recorded outcome failed, surfaced alongside
/// the failure counters so an operator can see why a pattern is failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FailureCategory {
    Timeout,
    NetworkError,
    PageNotFound,
    AccessDenied,
    CaptchaChallenge,
    RateLimited,
    ExtractionFailed,
    Unknown,
}

impl FailureCategory {
    /// Classify a failure message via keyword match.
    pub fn classify(message: &str) -> Self {
        let m = message.to_lowercase();
        if m.contains("timeout") || m.contains("timed out") {
            FailureCategory::Timeout
        } else if m.contains("captcha") || m.contains("human verification") {
            FailureCategory::CaptchaChallenge
        } else if m.contains("rate limit") || m.contains("429") {
            FailureCategory::RateLimited
        } else if m.contains("403") || m.contains("access denied") || m.contains("forbidden") {
            FailureCategory::AccessDenied
        } else if m.contains("404") || m.contains("not found") {
            FailureCategory::PageNotFound
        } else if m.contains("connection") || m.contains("network") || m.contains("dns") {
            FailureCategory::NetworkError
        } else if m.contains("extract") || m.contains("parse") {
            FailureCategory::ExtractionFailed
        } else {
            FailureCategory::Unknown
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LearnedPattern {
    pub id: Uuid,
    pub retailer: String,
    pub element_type: ElementType,
    pub pattern_kind: PatternKind,
    pub payload: String,
    pub success_count: u64,
    pub failure_count: u64,
    pub confidence: f32,
    pub visual_hints: Option<serde_json::Value>,
    pub last_failure_category: Option<FailureCategory>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LearnedPattern {
    pub fn new(
        retailer: impl Into<String>,
        element_type: ElementType,
        pattern_kind: PatternKind,
        payload: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            retailer: retailer.into(),
            element_type,
            pattern_kind,
            payload: payload.into(),
            success_count: 0,
            failure_count: 0,
            confidence: 0.7,
            visual_hints: None,
            last_failure_category: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Confidence change is monotonic in the success/failure counters (P5):
    /// recording a success never decreases confidence, a failure never
    /// increases it.
    pub fn record_success(&mut self, visual_hints: Option<serde_json::Value>, now: DateTime<Utc>) {
        self.success_count += 1;
        self.confidence = (self.confidence + 0.05).min(1.0);
        if visual_hints.is_some() {
            self.visual_hints = visual_hints;
        }
        self.updated_at = now;
    }

    pub fn record_failure(&mut self, category: FailureCategory, now: DateTime<Utc>) {
        self.failure_count += 1;
        self.confidence = (self.confidence - 0.1).max(0.0);
        self.last_failure_category = Some(category);
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_bounded_and_monotonic() {
        let now = Utc::now();
        let mut p = LearnedPattern::new("revolve", ElementType::Title, PatternKind::SelectorHint, ".title", now);
        let before = p.confidence;
        p.record_success(None, now);
        assert!(p.confidence >= before);
        assert!(p.confidence <= 1.0);

        for _ in 0..20 {
            let before = p.confidence;
            p.record_failure(FailureCategory::Timeout, now);
            assert!(p.confidence <= before);
            assert!(p.confidence >= 0.0);
        }
    }

    #[test]
    fn classifies_known_failure_categories() {
        assert_eq!(FailureCategory::classify("request timed out after 5s"), FailureCategory::Timeout);
        assert_eq!(FailureCategory::classify("received 429 too many requests"), FailureCategory::RateLimited);
        assert_eq!(FailureCategory::classify("captcha challenge detected"), FailureCategory::CaptchaChallenge);
    }
}
