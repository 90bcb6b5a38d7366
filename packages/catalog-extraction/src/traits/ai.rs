//! LLM and vision provider traits.
//!
//! Implementations wrap a specific completion endpoint (two LLM providers
//! for the markdown cascade, one vision endpoint for the browser tower) and
//! handle the specifics of prompting; the cascade and repair logic live
//! above this seam, not inside an implementation.

use async_trait::async_trait;

use crate::error::Result;

/// A single text completion call. Implementations are expected to use a
/// low temperature and a token ceiling matched to the expected output
/// shape, per call site.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name, used in logs and fallback ordering.
    fn name(&self) -> &str;

    async fn complete(&self, system_prompt: &str, user_prompt: &str, max_tokens: u32) -> Result<String>;
}

/// A vision-capable completion call taking one or more images.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    fn name(&self) -> &str;

    /// `images` are raw encoded bytes (PNG/WebP), already resized to the
    /// provider's dimension cap by the caller.
    async fn complete_with_images(&self, prompt: &str, images: &[Vec<u8>], max_tokens: u32) -> Result<String>;
}
