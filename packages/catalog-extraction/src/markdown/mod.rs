pub mod client;
pub mod extractor;
pub mod repair;
pub mod validate;

pub use client::MarkdownServiceClient;
pub use extractor::MarkdownExtractor;
