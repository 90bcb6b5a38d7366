//! Scripted test doubles for the LLM/vision provider seams.
//!
//! [`stores::MemoryStore`](crate::stores::MemoryStore) already covers the
//! persistence seam; these cover the two seams that talk to an external
//! model endpoint, so downstream crates can exercise the dispatcher and
//! crawler logic without a network call.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{ExtractionError, Result};
use crate::traits::ai::{LlmProvider, VisionProvider};

/// Replays a queue of canned responses in order; once exhausted, returns
/// [`ExtractionError::ProvidersUnavailable`] so cascade-fallback paths are
/// exercisable without special-casing the mock.
pub struct MockLlmProvider {
    name: String,
    responses: Mutex<VecDeque<Result<String>>>,
    calls: Mutex<Vec<String>>,
}

impl MockLlmProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_success(&self, body: impl Into<String>) {
        self.responses.lock().unwrap().push_back(Ok(body.into()));
    }

    pub fn queue_failure(&self, message: impl Into<String>) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(ExtractionError::FetchFailed(message.into())));
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, _system_prompt: &str, user_prompt: &str, _max_tokens: u32) -> Result<String> {
        self.calls.lock().unwrap().push(user_prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ExtractionError::ProvidersUnavailable))
    }
}

/// Same replay contract as [`MockLlmProvider`], for the vision seam.
pub struct MockVisionProvider {
    name: String,
    responses: Mutex<VecDeque<Result<String>>>,
}

impl MockVisionProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            responses: Mutex::new(VecDeque::new()),
        }
    }

    pub fn queue_success(&self, body: impl Into<String>) {
        self.responses.lock().unwrap().push_back(Ok(body.into()));
    }
}

#[async_trait]
impl VisionProvider for MockVisionProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete_with_images(&self, _prompt: &str, _images: &[Vec<u8>], _max_tokens: u32) -> Result<String> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ExtractionError::ProvidersUnavailable))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_queued_responses_in_order_then_errors() {
        let mock = MockLlmProvider::new("test-llm");
        mock.queue_success("first");
        mock.queue_success("second");

        assert_eq!(mock.complete("sys", "user", 100).await.unwrap(), "first");
        assert_eq!(mock.complete("sys", "user", 100).await.unwrap(), "second");
        assert!(mock.complete("sys", "user", 100).await.is_err());
        assert_eq!(mock.call_count(), 3);
    }
}
