//! Ollama storyboard backend (`POST /api/chat` in JSON mode).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{ProviderError, ProviderResult};
use super::http::HttpBackend;
use super::storyboard_format::{messages, parse_storyboard};
use super::traits::{SceneDraft, StoryboardProvider, StoryboardRequest};
use crate::config::{ConfigResult, ConfigurationError, ProviderConfig};

#[derive(Debug, Clone)]
pub struct OllamaStoryboardProvider {
    backend: HttpBackend,
    model: String,
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Value,
    format: &'static str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

impl OllamaStoryboardProvider {
    pub fn new(config: &ProviderConfig) -> ConfigResult<Self> {
        let model = config.effective_model().ok_or_else(|| {
            ConfigurationError::missing_required_field("providers.storyboard.model", "ollama backend")
        })?;
        Ok(Self {
            backend: HttpBackend::new("storyboard", config)?,
            model,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl StoryboardProvider for OllamaStoryboardProvider {
    fn name(&self) -> &str {
        self.backend.name()
    }

    async fn generate_storyboard(&self, request: &StoryboardRequest) -> ProviderResult<Vec<SceneDraft>> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: messages(request),
            format: "json",
            stream: false,
            options: self.temperature.map(|temperature| ChatOptions { temperature }),
        };

        let response = self.backend.post_json("api/chat", &body, &[]).await?;
        let chat: ChatResponse = self.backend.read_json(response).await?;
        let content = chat
            .message
            .map(|m| m.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ProviderError::malformed(self.name(), "empty response from Ollama"))?;

        parse_storyboard(self.name(), &content)
    }
}
