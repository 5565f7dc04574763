//! # Task Parameters
//!
//! Typed, per-kind input bags. Callers submit loose JSON; [`TaskParameters::normalize`]
//! fills missing fields from the kind's defaults, keeps unknown fields in `extra`,
//! and range-checks the result. Nothing past the store boundary sees untyped input.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::task::TaskKind;
use crate::constants::*;
use crate::error::{Result, StoryforgeError};

/// Storyboard (text) generation inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoryboardParams {
    /// Story text; falls back to the project's story when absent
    pub story: Option<String>,
    /// Visual style; falls back to the project's style when absent
    pub style: Option<String>,
    pub scene_count: u32,
    /// Also schedule a project-level narration task once the storyboard exists
    pub generate_tts: bool,
    pub depends_on: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for StoryboardParams {
    fn default() -> Self {
        Self {
            story: None,
            style: None,
            scene_count: DEFAULT_SCENE_COUNT,
            generate_tts: false,
            depends_on: None,
            extra: Map::new(),
        }
    }
}

/// Per-shot image generation inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShotImageParams {
    /// 1-based shot position, used to bind the task to a shot before it exists
    pub shot_order: Option<u32>,
    pub prompt: Option<String>,
    pub negative_prompt: Option<String>,
    pub style: Option<String>,
    pub width: u32,
    pub height: u32,
    pub depends_on: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ShotImageParams {
    fn default() -> Self {
        Self {
            shot_order: None,
            prompt: None,
            negative_prompt: None,
            style: None,
            width: DEFAULT_IMAGE_WIDTH,
            height: DEFAULT_IMAGE_HEIGHT,
            depends_on: None,
            extra: Map::new(),
        }
    }
}

/// Narration synthesis inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioParams {
    /// Overrides the narration text taken from the shot(s)
    pub text: Option<String>,
    pub voice: Option<String>,
    pub speed: f32,
    pub depends_on: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for AudioParams {
    fn default() -> Self {
        Self {
            text: None,
            voice: None,
            speed: DEFAULT_SPEECH_SPEED,
            depends_on: None,
            extra: Map::new(),
        }
    }
}

/// Clip animation and final assembly inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoParams {
    pub fps: u32,
    pub clip_seconds: f64,
    pub resolution: String,
    pub format: String,
    pub transition: Option<String>,
    /// Explicit narration track; defaults to the project's narration
    pub audio_path: Option<String>,
    pub depends_on: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for VideoParams {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            clip_seconds: DEFAULT_CLIP_SECONDS,
            resolution: DEFAULT_RESOLUTION.to_string(),
            format: DEFAULT_VIDEO_FORMAT.to_string(),
            transition: None,
            audio_path: None,
            depends_on: None,
            extra: Map::new(),
        }
    }
}

/// Parameters of a task; the variant always matches the task kind
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TaskParameters {
    Storyboard(StoryboardParams),
    ShotImage(ShotImageParams),
    Audio(AudioParams),
    Video(VideoParams),
}

impl TaskParameters {
    /// Build typed parameters for `kind` from a loose JSON bag
    pub fn normalize(kind: TaskKind, raw: Value) -> Result<Self> {
        let raw = match raw {
            Value::Null => Value::Object(Map::new()),
            Value::Object(map) => Value::Object(map),
            other => {
                return Err(StoryforgeError::ValidationError(format!(
                    "parameters for {kind} must be a JSON object, got {other}"
                )))
            }
        };

        let parsed = match kind {
            TaskKind::Storyboard => Self::Storyboard(parse(kind, raw)?),
            TaskKind::ShotImage => Self::ShotImage(parse(kind, raw)?),
            TaskKind::Audio => Self::Audio(parse(kind, raw)?),
            TaskKind::Video => Self::Video(parse(kind, raw)?),
        };
        parsed.validate()?;
        Ok(parsed)
    }

    /// Default parameters for a kind
    pub fn defaults(kind: TaskKind) -> Self {
        match kind {
            TaskKind::Storyboard => Self::Storyboard(StoryboardParams::default()),
            TaskKind::ShotImage => Self::ShotImage(ShotImageParams::default()),
            TaskKind::Audio => Self::Audio(AudioParams::default()),
            TaskKind::Video => Self::Video(VideoParams::default()),
        }
    }

    pub fn kind(&self) -> TaskKind {
        match self {
            Self::Storyboard(_) => TaskKind::Storyboard,
            Self::ShotImage(_) => TaskKind::ShotImage,
            Self::Audio(_) => TaskKind::Audio,
            Self::Video(_) => TaskKind::Video,
        }
    }

    pub fn depends_on(&self) -> Option<&str> {
        match self {
            Self::Storyboard(p) => p.depends_on.as_deref(),
            Self::ShotImage(p) => p.depends_on.as_deref(),
            Self::Audio(p) => p.depends_on.as_deref(),
            Self::Video(p) => p.depends_on.as_deref(),
        }
    }

    pub fn extra(&self) -> &Map<String, Value> {
        match self {
            Self::Storyboard(p) => &p.extra,
            Self::ShotImage(p) => &p.extra,
            Self::Audio(p) => &p.extra,
            Self::Video(p) => &p.extra,
        }
    }

    /// Range checks that serde defaults cannot express
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Storyboard(p) => {
                check_range("scene_count", p.scene_count, MIN_SCENE_COUNT, MAX_SCENE_COUNT)
            }
            Self::ShotImage(p) => {
                if p.shot_order == Some(0) {
                    return Err(StoryforgeError::ValidationError(
                        "shot_order is 1-based".to_string(),
                    ));
                }
                check_range("width", p.width, MIN_IMAGE_DIMENSION, MAX_IMAGE_DIMENSION)?;
                check_range("height", p.height, MIN_IMAGE_DIMENSION, MAX_IMAGE_DIMENSION)
            }
            Self::Audio(p) => check_range("speed", p.speed, MIN_SPEECH_SPEED, MAX_SPEECH_SPEED),
            Self::Video(p) => {
                check_range("fps", p.fps, MIN_FPS, MAX_FPS)?;
                check_range(
                    "clip_seconds",
                    p.clip_seconds,
                    MIN_CLIP_SECONDS,
                    MAX_CLIP_SECONDS,
                )?;
                if p.format.trim().is_empty() {
                    return Err(StoryforgeError::ValidationError(
                        "format must not be empty".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }

    pub fn as_storyboard(&self) -> Option<&StoryboardParams> {
        match self {
            Self::Storyboard(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_shot_image(&self) -> Option<&ShotImageParams> {
        match self {
            Self::ShotImage(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_audio(&self) -> Option<&AudioParams> {
        match self {
            Self::Audio(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_video(&self) -> Option<&VideoParams> {
        match self {
            Self::Video(p) => Some(p),
            _ => None,
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(kind: TaskKind, raw: Value) -> Result<T> {
    serde_json::from_value(raw).map_err(|e| {
        StoryforgeError::ValidationError(format!("invalid parameters for {kind}: {e}"))
    })
}

fn check_range<T: PartialOrd + std::fmt::Display>(field: &str, value: T, min: T, max: T) -> Result<()> {
    if value < min || value > max {
        return Err(StoryforgeError::ValidationError(format!(
            "{field} must be between {min} and {max}, got {value}"
        )));
    }
    Ok(())
}
