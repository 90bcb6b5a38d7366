//! Persistence, pattern learning and markdown-tower extraction for the
//! retail catalog monitor.
//!
//! This crate is the leaf layer: it knows how to store products and
//! observations, how to learn and rank selector/transform patterns, and how
//! to run the markdown conversion + LLM cascade tower. It has no opinion on
//! browser automation, pagination walking or change detection — those live
//! in `catalog-crawler`, which depends on this crate.

pub mod ai;
pub mod error;
pub mod markdown;
pub mod pattern_learner;
pub mod security;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

pub use error::{ExtractionError, Result, StoreError, StoreResult};
pub use pattern_learner::StorePatternLearner;
pub use security::Credentials;
pub use traits::{ExtractionTower, LlmProvider, PatternLearner, Store, VisionProvider};
