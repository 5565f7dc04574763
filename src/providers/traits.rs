//! Capability traits. Each pipeline stage depends on exactly one of these.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::errors::ProviderResult;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoryboardRequest {
    pub story: String,
    pub style: Option<String>,
    pub scene_count: u32,
}

/// One scene as returned by a storyboard backend, before normalization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneDraft {
    pub title: String,
    pub prompt: String,
    pub narration: String,
    pub bgm: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRequest {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub width: u32,
    pub height: u32,
    /// Used by backends for output naming
    pub scene_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: Option<String>,
    pub speed: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    pub bytes: Vec<u8>,
    pub sample_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnimationRequest {
    pub image_path: PathBuf,
    pub duration: f64,
    pub fps: u32,
}

/// Where an animated clip ended up
#[derive(Debug, Clone, PartialEq)]
pub enum ClipOutput {
    /// The backend wrote the clip to a path this process can read
    Path(PathBuf),
    /// The backend returned the encoded clip
    Bytes(Vec<u8>),
}

#[async_trait]
pub trait StoryboardProvider: Send + Sync {
    /// Backend name for logs and errors
    fn name(&self) -> &str;

    async fn generate_storyboard(&self, request: &StoryboardRequest) -> ProviderResult<Vec<SceneDraft>>;
}

#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Encoded image bytes (PNG)
    async fn generate_image(&self, request: &ImageRequest) -> ProviderResult<Vec<u8>>;
}

#[async_trait]
pub trait SpeechProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn synthesize_speech(&self, request: &SpeechRequest) -> ProviderResult<SynthesizedAudio>;
}

#[async_trait]
pub trait AnimationProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn animate_image(&self, request: &AnimationRequest) -> ProviderResult<ClipOutput>;
}
