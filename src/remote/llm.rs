//! LLM client for narrative generation.
//!
//! Talks to an OpenAI-compatible chat-completion endpoint (OpenRouter by
//! default). The pipeline asks for exactly one narrative per session; the
//! client builds the prompt from the branch's analysis input and treats an
//! empty `choices` array as a failure.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{build_http_client, ApiError, NarrativeGenerator};
use crate::config::LlmConfig;

/// Chat-completion client for narrative generation.
pub struct NarrativeClient {
    client: reqwest::Client,
    config: LlmConfig,
}

/// Chat-completion request format.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

/// Chat-completion response format.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

impl NarrativeClient {
    /// Create a new narrative client with the given configuration.
    pub fn new(config: LlmConfig, timeout: std::time::Duration) -> Self {
        Self {
            client: build_http_client(timeout),
            config,
        }
    }

    /// Get the config.
    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Build the document-branch prompt.
    pub fn document_prompt(&self, text: &str) -> String {
        let truncated = self.truncate_content(text);
        self.config
            .get_document_prompt()
            .replace("{content}", truncated)
    }

    /// Build the image-branch prompt from detected labels.
    pub fn image_prompt(&self, labels: &[String]) -> String {
        self.config
            .get_image_prompt()
            .replace("{labels}", &labels.join(", "))
    }

    /// Truncate content to configured maximum (UTF-8 safe).
    fn truncate_content<'a>(&self, text: &'a str) -> &'a str {
        if text.len() <= self.config.max_content_chars {
            return text;
        }
        // Find a valid UTF-8 boundary at or before max_content_chars
        let mut end = self.config.max_content_chars;
        while end > 0 && !text.is_char_boundary(end) {
            end -= 1;
        }
        &text[..end]
    }

    /// Send one chat completion and return the narrative.
    async fn complete(&self, prompt: String) -> Result<String, ApiError> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let url = format!("{}/v1/chat/completions", self.config.endpoint);
        debug!(model = %self.config.model, "requesting narrative");

        let mut req = self.client.post(&url).json(&request);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ApiError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Api(format!("HTTP {}: {}", status, body)));
        }

        let chat: ChatResponse = resp
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;

        extract_narrative(chat)
    }
}

/// Pull the narrative out of a chat response.
fn extract_narrative(response: ChatResponse) -> Result<String, ApiError> {
    let narrative = response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content.trim().to_string())
        .ok_or_else(|| ApiError::Parse("no valid response from model".to_string()))?;

    if narrative.is_empty() {
        return Err(ApiError::Parse("model returned an empty narrative".to_string()));
    }

    Ok(narrative)
}

#[async_trait]
impl NarrativeGenerator for NarrativeClient {
    async fn narrate_document(&self, text: &str) -> Result<String, ApiError> {
        self.complete(self.document_prompt(text)).await
    }

    async fn narrate_labels(&self, labels: &[String]) -> Result<String, ApiError> {
        self.complete(self.image_prompt(labels)).await
    }
}
