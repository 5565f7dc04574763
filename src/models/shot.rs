use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::merge::merge_maps;
use crate::state_machine::ShotStatus;

/// One scene of a project's storyboard
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Shot {
    pub id: String,
    pub project_id: String,
    /// 1-based position, contiguous per project
    pub order: u32,
    pub title: String,
    pub description: String,
    pub narration: String,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub bgm: Option<String>,
    pub image_path: Option<String>,
    pub audio_path: Option<String>,
    pub video_path: Option<String>,
    pub transition: Option<String>,
    pub duration: Option<f64>,
    pub status: ShotStatus,
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shot {
    pub fn from_new(project_id: &str, order: u32, new_shot: NewShot) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            order,
            title: new_shot.title,
            description: new_shot.description,
            narration: new_shot.narration,
            prompt: new_shot.prompt,
            negative_prompt: new_shot.negative_prompt,
            bgm: new_shot.bgm,
            image_path: None,
            audio_path: None,
            video_path: None,
            transition: None,
            duration: None,
            status: ShotStatus::Pending,
            metadata: Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge a patch; fields the patch does not carry survive
    pub fn apply(&mut self, patch: ShotPatch) {
        macro_rules! set {
            ($($field:ident),*) => {
                $(if let Some(value) = patch.$field {
                    self.$field = value;
                })*
            };
        }
        macro_rules! set_some {
            ($($field:ident),*) => {
                $(if let Some(value) = patch.$field {
                    self.$field = Some(value);
                })*
            };
        }

        set!(title, description, narration, prompt, status);
        set_some!(
            negative_prompt,
            bgm,
            image_path,
            audio_path,
            video_path,
            transition,
            duration
        );
        if let Some(metadata) = patch.metadata {
            merge_maps(&mut self.metadata, metadata);
        }
        self.updated_at = Utc::now();
    }

    pub fn snapshot(&self) -> ShotSnapshot {
        ShotSnapshot::from(self)
    }
}

/// Shot content produced by the storyboard stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewShot {
    pub title: String,
    pub description: String,
    pub narration: String,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub bgm: Option<String>,
}

/// Partial shot update. Also the body of a client-side shot edit.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ShotPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub narration: Option<String>,
    pub prompt: Option<String>,
    pub negative_prompt: Option<String>,
    pub bgm: Option<String>,
    pub image_path: Option<String>,
    pub audio_path: Option<String>,
    pub video_path: Option<String>,
    pub transition: Option<String>,
    pub duration: Option<f64>,
    pub status: Option<ShotStatus>,
    pub metadata: Option<Map<String, Value>>,
}

impl ShotPatch {
    pub fn status(status: ShotStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Client-facing view of a shot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShotSnapshot {
    pub id: String,
    pub project_id: String,
    pub order: u32,
    pub title: String,
    pub description: String,
    pub narration: String,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub bgm: Option<String>,
    pub image_path: Option<String>,
    pub audio_path: Option<String>,
    pub video_path: Option<String>,
    pub transition: Option<String>,
    pub duration: Option<f64>,
    pub status: ShotStatus,
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Shot> for ShotSnapshot {
    fn from(shot: &Shot) -> Self {
        Self {
            id: shot.id.clone(),
            project_id: shot.project_id.clone(),
            order: shot.order,
            title: shot.title.clone(),
            description: shot.description.clone(),
            narration: shot.narration.clone(),
            prompt: shot.prompt.clone(),
            negative_prompt: shot.negative_prompt.clone(),
            bgm: shot.bgm.clone(),
            image_path: shot.image_path.clone(),
            audio_path: shot.audio_path.clone(),
            video_path: shot.video_path.clone(),
            transition: shot.transition.clone(),
            duration: shot.duration,
            status: shot.status,
            metadata: shot.metadata.clone(),
            created_at: shot.created_at,
            updated_at: shot.updated_at,
        }
    }
}
