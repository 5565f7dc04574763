//! Typed task results. The variant always matches the task kind.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::task::TaskKind;

/// Reference to a produced artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Resource {
    pub resource_type: String,
    pub resource_id: String,
    pub resource_url: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
}

impl Resource {
    pub fn new(
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        resource_url: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            resource_url: resource_url.into(),
            meta: Map::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }
}

/// A shot created by a storyboard task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedShot {
    pub shot_id: String,
    pub order: u32,
    pub title: String,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryboardResult {
    pub resource: Resource,
    pub shots: Vec<GeneratedShot>,
    /// Shot tasks bound to the shots, plus the narration task when requested
    pub dependent_task_ids: Vec<String>,
    /// Dependents this run created, as opposed to pre-created ones it reused
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub created_task_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageResult {
    pub resource: Resource,
    pub shot_id: String,
    pub path: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioResult {
    pub resource: Resource,
    /// Set for shot-level narration, absent for the project track
    pub shot_id: Option<String>,
    pub path: String,
    pub sample_rate: u32,
    pub characters: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoResult {
    pub resource: Resource,
    pub path: String,
    pub duration: f64,
    pub fps: u32,
    pub resolution: String,
    pub format: String,
    pub clips: Vec<Resource>,
}

/// Output of a finished task
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TaskResult {
    Storyboard(StoryboardResult),
    ShotImage(ImageResult),
    Audio(AudioResult),
    Video(VideoResult),
}

impl TaskResult {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::Storyboard(_) => TaskKind::Storyboard,
            Self::ShotImage(_) => TaskKind::ShotImage,
            Self::Audio(_) => TaskKind::Audio,
            Self::Video(_) => TaskKind::Video,
        }
    }

    /// Primary artifact of the task
    pub fn resource(&self) -> &Resource {
        match self {
            Self::Storyboard(r) => &r.resource,
            Self::ShotImage(r) => &r.resource,
            Self::Audio(r) => &r.resource,
            Self::Video(r) => &r.resource,
        }
    }

    pub fn as_storyboard(&self) -> Option<&StoryboardResult> {
        match self {
            Self::Storyboard(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&ImageResult> {
        match self {
            Self::ShotImage(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_video(&self) -> Option<&VideoResult> {
        match self {
            Self::Video(r) => Some(r),
            _ => None,
        }
    }
}
