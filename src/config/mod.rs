//! # Storyforge Configuration System
//!
//! Typed configuration for the orchestration core, loaded in layers by
//! [`ConfigManager`]: compiled defaults, then `config/storyforge.toml`, then
//! `config/storyforge.{env}.toml`, then `STORYFORGE_*` environment variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use storyforge_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let workers = manager.config().orchestration.max_concurrent_tasks;
//! let backend = &manager.config().providers.storyboard.backend;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::*;
use crate::models::TaskKind;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoryforgeConfig {
    pub orchestration: OrchestrationConfig,
    pub events: EventsConfig,
    pub storage: StorageConfig,
    pub providers: ProvidersConfig,
    pub assembly: AssemblyConfig,
    pub generation: GenerationDefaults,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    /// Worker pool size
    pub max_concurrent_tasks: usize,
    /// Bounded work queue capacity
    pub queue_capacity: usize,
    /// Cancel blocked dependents when their dependency fails or is cancelled
    pub cancel_dependents_on_failure: bool,
    /// Fail tasks stuck in processing for longer than this; unset disables the sweeper
    pub processing_timeout_seconds: Option<u64>,
    pub sweep_interval_seconds: u64,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 4,
            queue_capacity: 256,
            cancel_dependents_on_failure: false,
            processing_timeout_seconds: None,
            sweep_interval_seconds: 30,
        }
    }
}

impl OrchestrationConfig {
    pub fn processing_timeout(&self) -> Option<Duration> {
        self.processing_timeout_seconds.map(Duration::from_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Per-task broadcast buffer
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub public_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
            public_prefix: "/files".to_string(),
        }
    }
}

/// One provider backend selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub backend: String,
    pub base_url: String,
    pub model: Option<String>,
    /// Falls back to `{BACKEND}_API_KEY` from the environment
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
    pub temperature: Option<f32>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            backend: "http".to_string(),
            base_url: String::new(),
            model: None,
            api_key: None,
            timeout_seconds: 120,
            temperature: None,
        }
    }
}

impl ProviderConfig {
    pub fn new(backend: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Configured base URL, else the backend's well-known endpoint
    pub fn effective_base_url(&self) -> Option<String> {
        let configured = self.base_url.trim().trim_end_matches('/');
        if !configured.is_empty() {
            return Some(configured.to_string());
        }
        known_backend_defaults(&self.backend).map(|(url, _)| url.to_string())
    }

    /// Configured model, else the backend's default model
    pub fn effective_model(&self) -> Option<String> {
        self.model
            .clone()
            .filter(|m| !m.is_empty())
            .or_else(|| known_backend_defaults(&self.backend).map(|(_, model)| model.to_string()))
    }

    /// Configured key, else the backend's conventional environment variable
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key.clone().filter(|k| !k.is_empty()).or_else(|| {
            let var = format!("{}_API_KEY", self.backend.to_uppercase());
            std::env::var(var).ok().filter(|k| !k.is_empty())
        })
    }
}

/// (base URL, model) for backends that have a canonical public endpoint
fn known_backend_defaults(backend: &str) -> Option<(&'static str, &'static str)> {
    match backend {
        "ollama" => Some(("http://127.0.0.1:11434", "qwen2.5:0.5b")),
        "groq" => Some(("https://api.groq.com/openai/v1", "llama-3.1-70b-versatile")),
        "deepseek" => Some(("https://api.deepseek.com/v1", "deepseek-chat")),
        "openrouter" => Some((
            "https://openrouter.ai/api/v1",
            "meta-llama/llama-3.1-70b-instruct:free",
        )),
        _ => None,
    }
}

pub const STORYBOARD_BACKENDS: &[&str] = &["ollama", "groq", "deepseek", "openrouter", "openai_compatible"];
pub const MEDIA_BACKENDS: &[&str] = &["http"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub storyboard: ProviderConfig,
    pub image: ProviderConfig,
    pub speech: ProviderConfig,
    pub animation: ProviderConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            storyboard: ProviderConfig {
                temperature: Some(0.3),
                ..ProviderConfig::new("ollama", "")
            },
            image: ProviderConfig::new("http", "http://127.0.0.1:8002"),
            speech: ProviderConfig::new("http", "http://127.0.0.1:8004"),
            animation: ProviderConfig {
                timeout_seconds: 300,
                ..ProviderConfig::new("http", "http://127.0.0.1:8003")
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    pub ffmpeg_path: String,
    /// Build a still-image clip when animation fails
    pub static_fallback: bool,
    pub default_resolution: String,
    pub default_format: String,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            static_fallback: true,
            default_resolution: DEFAULT_RESOLUTION.to_string(),
            default_format: DEFAULT_VIDEO_FORMAT.to_string(),
        }
    }
}

/// Defaults merged under client parameters when a task is created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationDefaults {
    pub scene_count: u32,
    pub image_width: u32,
    pub image_height: u32,
    pub fps: u32,
    pub clip_seconds: f64,
    pub speech_speed: f32,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            scene_count: DEFAULT_SCENE_COUNT,
            image_width: DEFAULT_IMAGE_WIDTH,
            image_height: DEFAULT_IMAGE_HEIGHT,
            fps: DEFAULT_FPS,
            clip_seconds: DEFAULT_CLIP_SECONDS,
            speech_speed: DEFAULT_SPEECH_SPEED,
        }
    }
}

impl GenerationDefaults {
    /// Default parameter bag for a task kind
    pub fn parameters_for(&self, kind: TaskKind, assembly: &AssemblyConfig) -> Value {
        match kind {
            TaskKind::Storyboard => json!({ "scene_count": self.scene_count }),
            TaskKind::ShotImage => json!({
                "width": self.image_width,
                "height": self.image_height,
            }),
            TaskKind::Audio => json!({ "speed": self.speech_speed }),
            TaskKind::Video => json!({
                "fps": self.fps,
                "clip_seconds": self.clip_seconds,
                "resolution": assembly.default_resolution,
                "format": assembly.default_format,
            }),
        }
    }
}

impl StoryforgeConfig {
    /// Validate configuration for consistency and required fields
    pub fn validate(&self) -> ConfigResult<()> {
        let o = &self.orchestration;
        if o.max_concurrent_tasks == 0 {
            return Err(ConfigurationError::invalid_value(
                "orchestration.max_concurrent_tasks",
                0,
                "worker count must be greater than 0",
            ));
        }
        if o.queue_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "orchestration.queue_capacity",
                0,
                "queue capacity must be greater than 0",
            ));
        }
        if o.processing_timeout_seconds == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "orchestration.processing_timeout_seconds",
                0,
                "timeout must be greater than 0 when set",
            ));
        }
        if o.sweep_interval_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "orchestration.sweep_interval_seconds",
                0,
                "sweep interval must be greater than 0",
            ));
        }
        if self.events.channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "events.channel_capacity",
                0,
                "channel capacity must be greater than 0",
            ));
        }
        if self.storage.root.as_os_str().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "storage.root",
                "storage configuration",
            ));
        }
        if self.assembly.ffmpeg_path.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "assembly.ffmpeg_path",
                "assembly configuration",
            ));
        }

        self.validate_provider("storyboard", &self.providers.storyboard, STORYBOARD_BACKENDS)?;
        self.validate_provider("image", &self.providers.image, MEDIA_BACKENDS)?;
        self.validate_provider("speech", &self.providers.speech, MEDIA_BACKENDS)?;
        self.validate_provider("animation", &self.providers.animation, MEDIA_BACKENDS)?;

        self.generation_as_parameters_check()
    }

    fn validate_provider(
        &self,
        capability: &str,
        provider: &ProviderConfig,
        known: &[&str],
    ) -> ConfigResult<()> {
        if !known.contains(&provider.backend.as_str()) {
            return Err(ConfigurationError::unknown_backend(
                capability,
                provider.backend.clone(),
            ));
        }
        if provider.effective_base_url().is_none() {
            return Err(ConfigurationError::missing_required_field(
                format!("providers.{capability}.base_url"),
                "provider configuration",
            ));
        }
        if provider.timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                format!("providers.{capability}.timeout_seconds"),
                0,
                "timeout must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Generation defaults must themselves be valid task parameters
    fn generation_as_parameters_check(&self) -> ConfigResult<()> {
        for kind in [
            TaskKind::Storyboard,
            TaskKind::ShotImage,
            TaskKind::Audio,
            TaskKind::Video,
        ] {
            let params = self.generation.parameters_for(kind, &self.assembly);
            crate::models::TaskParameters::normalize(kind, params.clone()).map_err(|e| {
                ConfigurationError::invalid_value(format!("generation ({kind})"), params, e.to_string())
            })?;
        }
        Ok(())
    }
}
