//! # Providers
//!
//! Capability interfaces for the model-serving backends, and their HTTP
//! implementations. The orchestration engine only sees the traits in
//! [`traits`]; which implementation answers is decided once, from
//! configuration, by [`ProviderRegistry::from_config`].

pub mod errors;
pub mod http;
pub mod media;
pub mod ollama;
pub mod openai_compat;
pub mod registry;
pub mod storyboard_format;
pub mod traits;

pub use errors::{ProviderError, ProviderResult};
pub use media::{HttpAnimationProvider, HttpImageProvider, HttpSpeechProvider};
pub use ollama::OllamaStoryboardProvider;
pub use openai_compat::OpenAiCompatibleStoryboardProvider;
pub use registry::{ProviderRegistry, ProviderRegistryBuilder};
pub use traits::{
    AnimationProvider, AnimationRequest, ClipOutput, ImageProvider, ImageRequest, SceneDraft,
    SpeechProvider, SpeechRequest, StoryboardProvider, StoryboardRequest, SynthesizedAudio,
};
