//! Data model entities shared across the persistence, pattern-learning and
//! extraction layers.

pub mod baseline;
pub mod extraction_result;
pub mod markdown_cache;
pub mod monitoring_run;
pub mod observation;
pub mod pattern;
pub mod product;
pub mod retailer;

pub use baseline::Baseline;
pub use extraction_result::{DispatchResult, ExtractedProduct, ExtractionMethod};
pub use markdown_cache::MarkdownCacheEntry;
pub use monitoring_run::{MonitoringRun, RunState, RunType};
pub use observation::{CatalogObservation, Lifecycle};
pub use pattern::{ElementType, FailureCategory, LearnedPattern, PatternKind};
pub use product::{Product, SaleFlag, StockState};
pub use retailer::{AntiBotSeverity, PaginationMode, RetailerConfig, Tower};
