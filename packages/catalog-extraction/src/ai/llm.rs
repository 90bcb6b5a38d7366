//! HTTP-based LLM and vision providers.
//!
//! Generalizes the teacher's single hard-coded OpenAI client into one
//! reusable, chat-completions-compatible client configurable by base URL,
//! model and API key — the two cascade providers and the vision model are
//! each one instance of this with different configuration, rather than
//! three bespoke client structs.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::error::{ExtractionError, Result};
use crate::traits::ai::{LlmProvider, VisionProvider};

#[derive(serde::Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: serde_json::Value,
}

#[derive(serde::Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(serde::Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(serde::Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(serde::Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// A chat-completions-compatible client, used for both the primary and
/// secondary LLM providers in the markdown cascade.
pub struct HttpLlmProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: SecretString,
    name: String,
}

impl HttpLlmProvider {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, model: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key,
            name: name.into(),
        }
    }
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str, max_tokens: u32) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: serde_json::Value::String(system_prompt.to_string()) },
                ChatMessage { role: "user", content: serde_json::Value::String(user_prompt.to_string()) },
            ],
            // Low temperature per §6: the cascade needs deterministic,
            // schema-shaped output, not creative variation.
            temperature: 0.1,
            max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| ExtractionError::FetchFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ExtractionError::FetchFailed(format!(
                "{} returned status {}",
                self.name,
                response.status()
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::ParseFailed(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ExtractionError::ParseFailed("empty choices array".into()))
    }
}

/// A vision-capable variant of the same client, images sent as data URLs
/// in an `image_url` content part (the common chat-completions shape).
pub struct HttpVisionProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: SecretString,
    name: String,
}

impl HttpVisionProvider {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, model: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key,
            name: name.into(),
        }
    }
}

#[async_trait]
impl VisionProvider for HttpVisionProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete_with_images(&self, prompt: &str, images: &[Vec<u8>], max_tokens: u32) -> Result<String> {
        use base64::Engine;
        let mut content = vec![serde_json::json!({ "type": "text", "text": prompt })];
        for image in images {
            let encoded = base64::engine::general_purpose::STANDARD.encode(image);
            content.push(serde_json::json!({
                "type": "image_url",
                "image_url": { "url": format!("data:image/png;base64,{encoded}") }
            }));
        }

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: serde_json::Value::Array(content) }],
            temperature: 0.1,
            max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| ExtractionError::FetchFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ExtractionError::FetchFailed(format!(
                "{} returned status {}",
                self.name,
                response.status()
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::ParseFailed(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ExtractionError::ParseFailed("empty choices array".into()))
    }
}
