//! Trait seams: the persistence store, the pattern learner, the LLM/vision
//! providers, and the extraction towers.

pub mod ai;
pub mod pattern_learner;
pub mod store;
pub mod tower;

pub use ai::{LlmProvider, VisionProvider};
pub use pattern_learner::PatternLearner;
pub use store::Store;
pub use tower::ExtractionTower;
