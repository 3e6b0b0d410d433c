//! OpenAI-compatible chat-completions client for vision OCR models.

use super::OcrClient;
use crate::config::PipelineConfig;
use crate::document::Page;
use crate::error::OcrError;
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Sends one page per request to a `/v1/chat/completions` endpoint.
#[derive(Clone)]
pub struct VisionOcrClient {
    client: Client,
    api_url: String,
    model: String,
    api_key: Option<String>,
    prompt: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    enable_thinking: Option<bool>,
}

impl VisionOcrClient {
    /// Build a client whose every request carries the configured timeout.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            prompt: config.system_prompt().to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            enable_thinking: config.enable_thinking,
        })
    }

    fn build_request(&self, page: &Page) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system(self.prompt.clone()),
                Message::user_with_image(page.mime, &page.image),
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            chat_template_kwargs: self
                .enable_thinking
                .map(|enable_thinking| ChatTemplateKwargs { enable_thinking }),
        }
    }
}

#[async_trait::async_trait]
impl OcrClient for VisionOcrClient {
    fn name(&self) -> &str {
        "vision"
    }

    async fn extract(&self, page: &Page) -> Result<String, OcrError> {
        let request = self.build_request(page);
        debug!(
            "Sending page {} ({} bytes, {}) to {} model={}",
            page.index,
            page.image.len(),
            page.mime,
            self.api_url,
            self.model
        );

        let mut builder = self.client.post(&self.api_url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| OcrError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OcrError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let raw = response
            .text()
            .await
            .map_err(|e| OcrError::Transport(e.to_string()))?;
        let parsed: ChatCompletionResponse = serde_json::from_str(&raw).map_err(|e| {
            OcrError::Malformed(format!(
                "{}: {}",
                e,
                raw.chars().take(200).collect::<String>()
            ))
        })?;

        if let Some(usage) = &parsed.usage {
            debug!(
                "Page {} used {} tokens (prompt: {}, completion: {})",
                page.index, usage.total_tokens, usage.prompt_tokens, usage.completion_tokens
            );
        }

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| OcrError::Malformed("response has no message content".to_string()))
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    /// Template switches understood by vLLM / llama.cpp style servers.
    #[serde(skip_serializing_if = "Option::is_none")]
    chat_template_kwargs: Option<ChatTemplateKwargs>,
}

#[derive(Debug, Serialize)]
struct ChatTemplateKwargs {
    enable_thinking: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: Role,
    content: MessageContent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
enum Role {
    System,
    User,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
struct ImageUrl {
    url: String,
}

impl Message {
    fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(content.into()),
        }
    }

    /// User turn carrying only the page image as a base64 data URL.
    fn user_with_image(mime: &str, image: &[u8]) -> Self {
        let url = format!("data:{};base64,{}", mime, BASE64.encode(image));
        Self {
            role: Role::User,
            content: MessageContent::Parts(vec![ContentPart::ImageUrl {
                image_url: ImageUrl { url },
            }]),
        }
    }
}
