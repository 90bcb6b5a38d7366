//! `CatalogObservation`: one append-oriented row per (retailer, category,
//! product-code-or-url, discovered-date).

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Lifecycle state of an observation. Transitions are exhaustive and
/// mutually exclusive (decided open question, see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Lifecycle {
    Baseline,
    PendingReview,
    Approved,
    Rejected,
    Promoted,
}

impl Lifecycle {
    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Baseline is a terminal starting state reached only at baseline
    /// creation, never transitioned into from another state. PendingReview
    /// may resolve to Approved or Rejected. Approved may be Promoted.
    /// Rejected and Promoted are terminal.
    pub fn can_transition_to(self, next: Lifecycle) -> bool {
        use Lifecycle::*;
        matches!(
            (self, next),
            (PendingReview, Approved)
                | (PendingReview, Rejected)
                | (Approved, Promoted)
        )
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CatalogObservation {
    pub id: Uuid,
    pub retailer: String,
    pub category: String,
    pub product_code_or_url: String,
    pub discovered_date: chrono::NaiveDate,
    pub title: String,
    pub price: f64,
    pub image_url: Option<String>,
    pub url: String,
    pub lifecycle: Lifecycle,
    pub recorded_at: DateTime<Utc>,
}

impl CatalogObservation {
    pub fn transition(&mut self, next: Lifecycle) -> Result<(), String> {
        if self.lifecycle.can_transition_to(next) {
            self.lifecycle = next;
            Ok(())
        } else {
            Err(format!(
                "illegal lifecycle transition {:?} -> {:?}",
                self.lifecycle, next
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_are_exhaustive_and_mutually_exclusive() {
        let all = [
            Lifecycle::Baseline,
            Lifecycle::PendingReview,
            Lifecycle::Approved,
            Lifecycle::Rejected,
            Lifecycle::Promoted,
        ];
        let mut legal_count = 0;
        for &from in &all {
            for &to in &all {
                if from.can_transition_to(to) {
                    legal_count += 1;
                }
            }
        }
        // PendingReview->Approved, PendingReview->Rejected, Approved->Promoted
        assert_eq!(legal_count, 3);
    }
}
