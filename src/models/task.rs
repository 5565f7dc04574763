//! # Task Model
//!
//! A task is one tracked unit of pipeline work. Its kind fixes the shape of its
//! parameters and result; its status is driven exclusively through
//! [`crate::state_machine::TaskStateMachine`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use super::parameters::TaskParameters;
use super::result::TaskResult;
use crate::error::{Result, StoryforgeError};
use crate::state_machine::TaskStatus;

pub type TaskId = String;

/// Pipeline stage a task belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Storyboard,
    ShotImage,
    Audio,
    Video,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Storyboard => "storyboard",
            Self::ShotImage => "shot_image",
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "storyboard" | "generate_storyboard" => Ok(Self::Storyboard),
            "shot_image" | "generate_shot" => Ok(Self::ShotImage),
            "audio" | "generate_audio" => Ok(Self::Audio),
            "video" | "generate_video" => Ok(Self::Video),
            _ => Err(format!("Invalid task kind: {s}")),
        }
    }
}

/// Stored task record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub project_id: Option<String>,
    pub shot_id: Option<String>,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub progress: u8,
    pub message: String,
    pub parameters: TaskParameters,
    pub result: Option<TaskResult>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Build a fresh record from validated input
    pub fn from_new(new_task: NewTask, parameters: TaskParameters, status: TaskStatus) -> Self {
        let now = Utc::now();
        let message = match status {
            TaskStatus::Blocked => "waiting for dependency".to_string(),
            _ => "queued".to_string(),
        };
        Self {
            id: Uuid::new_v4().to_string(),
            project_id: new_task.project_id,
            shot_id: new_task.shot_id,
            kind: new_task.kind,
            status,
            progress: 0,
            message,
            parameters,
            result: None,
            error: None,
            created_at: now,
            started_at: None,
            finished_at: None,
            updated_at: now,
        }
    }

    pub fn depends_on(&self) -> Option<&str> {
        self.parameters.depends_on()
    }

    /// Shot position for shot-level tasks that were created before their shot
    pub fn shot_order(&self) -> Option<u32> {
        self.parameters.as_shot_image().and_then(|p| p.shot_order)
    }

    pub fn require_project_id(&self) -> Result<&str> {
        self.project_id.as_deref().ok_or_else(|| {
            StoryforgeError::ValidationError(format!("task {} has no project_id", self.id))
        })
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot::from(self)
    }
}

/// Input for [`crate::store::TaskStore::create`]
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub kind: TaskKind,
    pub project_id: Option<String>,
    pub shot_id: Option<String>,
    /// Loose parameter bag, normalized against the kind's defaults on create
    pub parameters: Value,
}

impl NewTask {
    pub fn new(kind: TaskKind) -> Self {
        Self {
            kind,
            project_id: None,
            shot_id: None,
            parameters: Value::Null,
        }
    }

    pub fn for_project(kind: TaskKind, project_id: impl Into<String>) -> Self {
        Self::new(kind).with_project(project_id)
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_shot(mut self, shot_id: impl Into<String>) -> Self {
        self.shot_id = Some(shot_id.into());
        self
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Normalize parameters and check associations; no state is touched
    pub fn validate(&self) -> Result<TaskParameters> {
        if self.project_id.as_deref().map_or(true, str::is_empty) {
            return Err(StoryforgeError::ValidationError(format!(
                "{} tasks require a project_id",
                self.kind
            )));
        }
        TaskParameters::normalize(self.kind, self.parameters.clone())
    }
}

/// Atomic partial update, validated by the task state machine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    /// Compare-and-set guard: the update applies only if the task is in this state
    pub expected_status: Option<TaskStatus>,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub result: Option<TaskResult>,
    pub error: Option<String>,
    pub parameters: Option<TaskParameters>,
    pub shot_id: Option<String>,
}

impl TaskUpdate {
    /// pending -> processing, only if still pending
    pub fn claim() -> Self {
        Self {
            status: Some(TaskStatus::Processing),
            expected_status: Some(TaskStatus::Pending),
            progress: Some(0),
            message: Some("processing".to_string()),
            ..Default::default()
        }
    }

    pub fn progress(progress: u8, message: impl Into<String>) -> Self {
        Self {
            expected_status: Some(TaskStatus::Processing),
            progress: Some(progress),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn finish(result: TaskResult) -> Self {
        Self {
            status: Some(TaskStatus::Finished),
            expected_status: Some(TaskStatus::Processing),
            progress: Some(100),
            message: Some("finished".to_string()),
            result: Some(result),
            ..Default::default()
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            status: Some(TaskStatus::Failed),
            expected_status: Some(TaskStatus::Processing),
            message: Some("failed".to_string()),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn cancel(reason: impl Into<String>) -> Self {
        Self {
            status: Some(TaskStatus::Cancelled),
            message: Some(reason.into()),
            ..Default::default()
        }
    }

    /// blocked -> pending with derived inputs injected
    pub fn release(parameters: Option<TaskParameters>, shot_id: Option<String>) -> Self {
        Self {
            status: Some(TaskStatus::Pending),
            expected_status: Some(TaskStatus::Blocked),
            message: Some("dependency satisfied".to_string()),
            parameters,
            shot_id,
            ..Default::default()
        }
    }
}

/// Read-only filter for [`crate::store::TaskStore::list_by`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    pub project_id: Option<String>,
    pub kind: Option<TaskKind>,
    pub status: Option<TaskStatus>,
    pub depends_on: Option<String>,
    pub shot_id: Option<String>,
}

impl TaskFilter {
    pub fn for_project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            ..Default::default()
        }
    }

    pub fn dependents_of(task_id: impl Into<String>) -> Self {
        Self {
            depends_on: Some(task_id.into()),
            ..Default::default()
        }
    }

    pub fn with_kind(mut self, kind: TaskKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.project_id
            .as_deref()
            .map_or(true, |id| task.project_id.as_deref() == Some(id))
            && self.kind.map_or(true, |kind| task.kind == kind)
            && self.status.map_or(true, |status| task.status == status)
            && self
                .depends_on
                .as_deref()
                .map_or(true, |id| task.depends_on() == Some(id))
            && self
                .shot_id
                .as_deref()
                .map_or(true, |id| task.shot_id.as_deref() == Some(id))
    }
}

/// Client-facing view of a task
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub project_id: Option<String>,
    pub shot_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub progress: u8,
    pub message: String,
    pub parameters: TaskParameters,
    pub result: Option<TaskResult>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Task> for TaskSnapshot {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            project_id: task.project_id.clone(),
            shot_id: task.shot_id.clone(),
            kind: task.kind,
            status: task.status,
            progress: task.progress,
            message: task.message.clone(),
            parameters: task.parameters.clone(),
            result: task.result.clone(),
            error: task.error.clone(),
            created_at: task.created_at,
            started_at: task.started_at,
            finished_at: task.finished_at,
            updated_at: task.updated_at,
        }
    }
}
