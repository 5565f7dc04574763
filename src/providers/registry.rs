//! Capability-indexed provider registry, resolved once at startup.

use std::sync::Arc;
use tracing::info;

use super::media::{HttpAnimationProvider, HttpImageProvider, HttpSpeechProvider};
use super::ollama::OllamaStoryboardProvider;
use super::openai_compat::OpenAiCompatibleStoryboardProvider;
use super::traits::{AnimationProvider, ImageProvider, SpeechProvider, StoryboardProvider};
use crate::config::{ConfigResult, ConfigurationError, ProviderConfig, ProvidersConfig};

/// Exactly one active implementation per capability
#[derive(Clone)]
pub struct ProviderRegistry {
    storyboard: Arc<dyn StoryboardProvider>,
    image: Arc<dyn ImageProvider>,
    speech: Arc<dyn SpeechProvider>,
    animation: Arc<dyn AnimationProvider>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("storyboard", &self.storyboard.name())
            .field("image", &self.image.name())
            .field("speech", &self.speech.name())
            .field("animation", &self.animation.name())
            .finish()
    }
}

impl ProviderRegistry {
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::default()
    }

    /// Build the HTTP backends named in configuration
    pub fn from_config(config: &ProvidersConfig) -> ConfigResult<Self> {
        let registry = Self {
            storyboard: storyboard_backend(&config.storyboard)?,
            image: match config.image.backend.as_str() {
                "http" => Arc::new(HttpImageProvider::new(&config.image)?),
                other => return Err(ConfigurationError::unknown_backend("image", other)),
            },
            speech: match config.speech.backend.as_str() {
                "http" => Arc::new(HttpSpeechProvider::new(&config.speech)?),
                other => return Err(ConfigurationError::unknown_backend("speech", other)),
            },
            animation: match config.animation.backend.as_str() {
                "http" => Arc::new(HttpAnimationProvider::new(&config.animation)?),
                other => return Err(ConfigurationError::unknown_backend("animation", other)),
            },
        };
        info!(registry = ?registry, "Provider registry resolved");
        Ok(registry)
    }

    pub fn storyboard(&self) -> &Arc<dyn StoryboardProvider> {
        &self.storyboard
    }

    pub fn image(&self) -> &Arc<dyn ImageProvider> {
        &self.image
    }

    pub fn speech(&self) -> &Arc<dyn SpeechProvider> {
        &self.speech
    }

    pub fn animation(&self) -> &Arc<dyn AnimationProvider> {
        &self.animation
    }
}

fn storyboard_backend(config: &ProviderConfig) -> ConfigResult<Arc<dyn StoryboardProvider>> {
    match config.backend.as_str() {
        "ollama" => Ok(Arc::new(OllamaStoryboardProvider::new(config)?)),
        "groq" | "deepseek" | "openrouter" | "openai_compatible" => {
            Ok(Arc::new(OpenAiCompatibleStoryboardProvider::new(config)?))
        }
        other => Err(ConfigurationError::unknown_backend("storyboard", other)),
    }
}

/// Assemble a registry from injected implementations
#[derive(Default)]
pub struct ProviderRegistryBuilder {
    storyboard: Option<Arc<dyn StoryboardProvider>>,
    image: Option<Arc<dyn ImageProvider>>,
    speech: Option<Arc<dyn SpeechProvider>>,
    animation: Option<Arc<dyn AnimationProvider>>,
}

impl ProviderRegistryBuilder {
    pub fn storyboard(mut self, provider: Arc<dyn StoryboardProvider>) -> Self {
        self.storyboard = Some(provider);
        self
    }

    pub fn image(mut self, provider: Arc<dyn ImageProvider>) -> Self {
        self.image = Some(provider);
        self
    }

    pub fn speech(mut self, provider: Arc<dyn SpeechProvider>) -> Self {
        self.speech = Some(provider);
        self
    }

    pub fn animation(mut self, provider: Arc<dyn AnimationProvider>) -> Self {
        self.animation = Some(provider);
        self
    }

    pub fn build(self) -> ConfigResult<ProviderRegistry> {
        let missing = |capability: &str| {
            ConfigurationError::missing_required_field(
                format!("providers.{capability}"),
                "provider registry",
            )
        };
        Ok(ProviderRegistry {
            storyboard: self.storyboard.ok_or_else(|| missing("storyboard"))?,
            image: self.image.ok_or_else(|| missing("image"))?,
            speech: self.speech.ok_or_else(|| missing("speech"))?,
            animation: self.animation.ok_or_else(|| missing("animation"))?,
        })
    }
}
