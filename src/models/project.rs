use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::merge::merge_maps;
use crate::error::{Result, StoryforgeError};
use crate::state_machine::ProjectStatus;

/// A story being turned into a video
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub title: String,
    pub story_text: String,
    pub style: Option<String>,
    pub description: Option<String>,
    pub status: ProjectStatus,
    /// Image URL of the first shot
    pub cover_image: Option<String>,
    /// Project-level narration track
    pub narration_path: Option<String>,
    pub video_url: Option<String>,
    pub duration: Option<f64>,
    pub shot_count: u32,
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn from_new(new_project: NewProject) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: new_project.title,
            story_text: new_project.story_text,
            style: new_project.style.filter(|s| !s.trim().is_empty()),
            description: new_project.description,
            status: ProjectStatus::Created,
            cover_image: None,
            narration_path: None,
            video_url: None,
            duration: None,
            shot_count: 0,
            metadata: new_project.metadata,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge a patch into this record. Status only moves forward.
    pub fn apply(&mut self, patch: ProjectPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = Some(description);
        }
        if let Some(style) = patch.style {
            self.style = Some(style);
        }
        if let Some(status) = patch.status {
            self.status = self.status.advance_to(status);
        }
        if let Some(cover_image) = patch.cover_image {
            self.cover_image = Some(cover_image);
        }
        if let Some(narration_path) = patch.narration_path {
            self.narration_path = Some(narration_path);
        }
        if let Some(video_url) = patch.video_url {
            self.video_url = Some(video_url);
        }
        if let Some(duration) = patch.duration {
            self.duration = Some(duration);
        }
        if let Some(shot_count) = patch.shot_count {
            self.shot_count = shot_count;
        }
        if let Some(metadata) = patch.metadata {
            merge_maps(&mut self.metadata, metadata);
        }
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct NewProject {
    pub title: String,
    pub story_text: String,
    pub style: Option<String>,
    pub description: Option<String>,
    pub metadata: Map<String, Value>,
}

impl NewProject {
    pub fn new(title: impl Into<String>, story_text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            story_text: story_text.into(),
            ..Default::default()
        }
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(StoryforgeError::ValidationError(
                "project title must not be empty".to_string(),
            ));
        }
        if self.story_text.trim().is_empty() {
            return Err(StoryforgeError::ValidationError(
                "project story must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Partial project update; absent fields are left alone
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub style: Option<String>,
    pub status: Option<ProjectStatus>,
    pub cover_image: Option<String>,
    pub narration_path: Option<String>,
    pub video_url: Option<String>,
    pub duration: Option<f64>,
    pub shot_count: Option<u32>,
    pub metadata: Option<Map<String, Value>>,
}

impl ProjectPatch {
    pub fn status(status: ProjectStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}
