//! # Pipeline Stages
//!
//! One module per task kind. A stage receives a claimed (`processing`) task, calls
//! its provider capability, persists artifacts and returns the typed result.
//! Finalizing the task and unblocking dependents is the engine's job. Once the
//! finish lands, the engine calls the stage's `apply_outputs` to merge the result
//! into the project and shot records.

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::assembly::{AssemblyError, MediaAssembler};
use crate::config::{AssemblyConfig, GenerationDefaults};
use crate::error::StoryforgeError;
use crate::models::{merged, NewTask, Task, TaskKind, TaskUpdate};
use crate::providers::{ProviderError, ProviderRegistry};
use crate::storage::ArtifactStorage;
use crate::store::{ProjectStore, TaskStore};

pub mod audio;
pub mod shot_image;
pub mod storyboard;
pub mod video;

/// Why a stage stopped short of a result
#[derive(Debug, Clone, PartialEq)]
pub enum StageError {
    /// The task left `processing` while the stage was running
    Stale,
    Failed(StoryforgeError),
}

impl From<StoryforgeError> for StageError {
    fn from(error: StoryforgeError) -> Self {
        StageError::Failed(error)
    }
}

impl From<ProviderError> for StageError {
    fn from(error: ProviderError) -> Self {
        StageError::Failed(error.into())
    }
}

impl From<AssemblyError> for StageError {
    fn from(error: AssemblyError) -> Self {
        StageError::Failed(error.into())
    }
}

pub type StageResult<T> = std::result::Result<T, StageError>;

/// Collaborators shared by every stage
#[derive(Clone)]
pub struct StageContext {
    pub tasks: Arc<dyn TaskStore>,
    pub projects: Arc<dyn ProjectStore>,
    pub providers: ProviderRegistry,
    pub storage: ArtifactStorage,
    pub assembler: Arc<dyn MediaAssembler>,
    pub generation: GenerationDefaults,
    pub assembly: AssemblyConfig,
}

impl std::fmt::Debug for StageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageContext")
            .field("providers", &self.providers)
            .field("storage", &self.storage)
            .field("generation", &self.generation)
            .field("assembly", &self.assembly)
            .finish()
    }
}

impl StageContext {
    /// Engine-created task input with the configured generation defaults underneath
    pub fn new_task(&self, kind: TaskKind, project_id: &str, parameters: Value) -> NewTask {
        let defaults = self.generation.parameters_for(kind, &self.assembly);
        NewTask::for_project(kind, project_id).with_parameters(merged(&defaults, &parameters))
    }

    /// Report progress; fails with [`StageError::Stale`] once the task has left
    /// `processing`, so nothing further is merged.
    pub async fn checkpoint(&self, task: &Task, progress: u8, message: &str) -> StageResult<()> {
        match self
            .tasks
            .update(&task.id, TaskUpdate::progress(progress, message))
            .await
        {
            Ok(_) => Ok(()),
            Err(StoryforgeError::InvalidTransition { .. }) => {
                debug!(task_id = %task.id, progress, "Task no longer processing, abandoning stage");
                Err(StageError::Stale)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Parameters of the wrong variant for the task kind
pub(crate) fn parameter_mismatch(task: &Task) -> StageError {
    StageError::Failed(StoryforgeError::Internal(format!(
        "task {} of kind {} carries {} parameters",
        task.id,
        task.kind,
        task.parameters.kind()
    )))
}

/// Artifact file stem for a shot
pub(crate) fn shot_file_name(order: u32) -> String {
    format!("shot_{order:03}")
}
