//! OpenAI-compatible chat-completion storyboard backends
//! (groq, deepseek, openrouter, and any self-hosted compatible endpoint).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::errors::{ProviderError, ProviderResult};
use super::http::HttpBackend;
use super::storyboard_format::{messages, parse_storyboard};
use super::traits::{SceneDraft, StoryboardProvider, StoryboardRequest};
use crate::config::{ConfigResult, ConfigurationError, ProviderConfig};

const DEFAULT_TEMPERATURE: f32 = 0.3;
const OPENROUTER_REFERER: &str = "https://github.com/storyforge/storyforge";

#[derive(Debug, Clone)]
pub struct OpenAiCompatibleStoryboardProvider {
    backend: HttpBackend,
    model: String,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Value,
    temperature: f32,
    response_format: Value,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
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
    content: Option<String>,
}

impl OpenAiCompatibleStoryboardProvider {
    pub fn new(config: &ProviderConfig) -> ConfigResult<Self> {
        let backend = HttpBackend::new("storyboard", config)?;
        if !backend.has_api_key() && config.backend != "openai_compatible" {
            return Err(ConfigurationError::missing_required_field(
                "providers.storyboard.api_key",
                format!(
                    "{} backend (or set {}_API_KEY)",
                    config.backend,
                    config.backend.to_uppercase()
                ),
            ));
        }
        let model = config.effective_model().ok_or_else(|| {
            ConfigurationError::missing_required_field(
                "providers.storyboard.model",
                format!("{} backend", config.backend),
            )
        })?;
        Ok(Self {
            backend,
            model,
            temperature: config.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        })
    }
}

#[async_trait]
impl StoryboardProvider for OpenAiCompatibleStoryboardProvider {
    fn name(&self) -> &str {
        self.backend.name()
    }

    async fn generate_storyboard(&self, request: &StoryboardRequest) -> ProviderResult<Vec<SceneDraft>> {
        let body = CompletionRequest {
            model: self.model.clone(),
            messages: messages(request),
            temperature: self.temperature,
            response_format: json!({"type": "json_object"}),
        };

        let headers: &[(&str, &str)] = if self.name() == "openrouter" {
            &[("HTTP-Referer", OPENROUTER_REFERER)]
        } else {
            &[]
        };

        let response = self
            .backend
            .post_json("chat/completions", &body, headers)
            .await?;
        let completion: CompletionResponse = self.backend.read_json(response).await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ProviderError::malformed(self.name(), "empty completion"))?;

        parse_storyboard(self.name(), &content)
    }
}
