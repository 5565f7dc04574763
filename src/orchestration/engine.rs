//! # Orchestration Engine
//!
//! Drives one task through its stage and settles the consequences.
//!
//! ## Overview
//!
//! `run(task_id)`:
//!
//! 1. Claims the task with a compare-and-set `pending -> processing`. A task that
//!    is not pending, or that another run claimed first, is skipped untouched.
//! 2. Executes the stage for the task kind.
//! 3. Finishes the task with the typed result, or fails it with the cause.
//!    Records that depend on the task being done (shot completion, project
//!    status) are applied only after the finish succeeds; if it loses the race,
//!    what the stage already wrote is discarded.
//! 4. Fans out: releases blocked dependents in shot order and submits them to the
//!    work queue; after a shot image, re-derives project readiness from the shots.
//!
//! Stage failures never escape `run` as errors; they become the task's `failed`
//! state. A task that left `processing` mid-stage (cancelled or timed out) has its
//! late outcome discarded.

use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use super::dependency_resolver::DependencyResolver;
use super::dispatcher::{TaskQueue, TaskRunner};
use super::stages::{self, StageContext, StageError, StageResult};
use crate::error::{Result, StoryforgeError};
use crate::logging::log_task_operation;
use crate::models::{ProjectPatch, Task, TaskKind, TaskResult, TaskUpdate};
use crate::state_machine::{ProjectStatus, TaskStatus};

/// What a call to [`OrchestrationEngine::run`] did
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The task was not pending; nothing happened
    Skipped { status: TaskStatus },
    Finished,
    Failed { error: String },
    /// The task left `processing` before the stage completed
    Discarded,
}

#[derive(Debug)]
pub struct OrchestrationEngine {
    ctx: StageContext,
    resolver: DependencyResolver,
    queue: TaskQueue,
}

impl OrchestrationEngine {
    pub fn new(ctx: StageContext, resolver: DependencyResolver, queue: TaskQueue) -> Self {
        Self {
            ctx,
            resolver,
            queue,
        }
    }

    pub fn context(&self) -> &StageContext {
        &self.ctx
    }

    pub fn resolver(&self) -> &DependencyResolver {
        &self.resolver
    }

    #[instrument(skip(self), fields(task_id = %task_id))]
    pub async fn run(&self, task_id: &str) -> Result<RunOutcome> {
        let task = self.ctx.tasks.get(task_id).await?;
        if task.status != TaskStatus::Pending {
            debug!(status = %task.status, "Task not pending, skipping");
            return Ok(RunOutcome::Skipped {
                status: task.status,
            });
        }

        let task = match self.ctx.tasks.update(task_id, TaskUpdate::claim()).await {
            Ok(task) => task,
            Err(StoryforgeError::InvalidTransition { from, .. }) => {
                debug!(status = %from, "Task claimed elsewhere, skipping");
                return Ok(RunOutcome::Skipped { status: from });
            }
            Err(e) => return Err(e),
        };
        log_task_operation(
            "claim",
            &task.id,
            task.kind.as_str(),
            task.project_id.as_deref(),
            task.status.as_str(),
            None,
        );

        let started = Instant::now();
        let outcome = match self.execute_stage(&task).await {
            Ok(result) => self.finish(&task, result).await,
            Err(StageError::Stale) => {
                info!(task_id = %task.id, "Task left processing mid-stage, outcome discarded");
                Ok(RunOutcome::Discarded)
            }
            Err(StageError::Failed(cause)) => self.fail(&task, cause).await,
        };
        debug!(
            task_id = %task.id,
            duration_ms = started.elapsed().as_millis() as u64,
            outcome = ?outcome,
            "Run complete"
        );
        outcome
    }

    async fn execute_stage(&self, task: &Task) -> StageResult<TaskResult> {
        match task.kind {
            TaskKind::Storyboard => stages::storyboard::execute(&self.ctx, task).await,
            TaskKind::ShotImage => stages::shot_image::execute(&self.ctx, task).await,
            TaskKind::Audio => stages::audio::execute(&self.ctx, task).await,
            TaskKind::Video => stages::video::execute(&self.ctx, task).await,
        }
    }

    async fn finish(&self, task: &Task, result: TaskResult) -> Result<RunOutcome> {
        let finished = match self
            .ctx
            .tasks
            .update(&task.id, TaskUpdate::finish(result.clone()))
            .await
        {
            Ok(finished) => finished,
            Err(StoryforgeError::InvalidTransition { from, .. }) => {
                warn!(
                    task_id = %task.id,
                    status = %from,
                    "Discarding late completion"
                );
                self.discard_outputs(task, &result).await;
                return Ok(RunOutcome::Discarded);
            }
            Err(e) => {
                self.discard_outputs(task, &result).await;
                return self.fail(task, e).await;
            }
        };
        log_task_operation(
            "finish",
            &finished.id,
            finished.kind.as_str(),
            finished.project_id.as_deref(),
            finished.status.as_str(),
            None,
        );

        if let Err(e) = self.apply_outputs(&finished).await {
            error!(task_id = %finished.id, error = %e, "Applying outputs after completion failed");
        }
        if let Err(e) = self.fan_out(&finished).await {
            error!(task_id = %finished.id, error = %e, "Fan-out after completion failed");
        }
        if finished.kind == TaskKind::ShotImage {
            if let Some(project_id) = finished.project_id.as_deref() {
                if let Err(e) = self.refresh_project_readiness(project_id).await {
                    error!(project_id = %project_id, error = %e, "Readiness check failed");
                }
            }
        }
        Ok(RunOutcome::Finished)
    }

    /// Project and shot records that only change once a task is `finished`
    async fn apply_outputs(&self, finished: &Task) -> Result<()> {
        match finished.kind {
            TaskKind::Storyboard => stages::storyboard::apply_outputs(&self.ctx, finished).await,
            TaskKind::ShotImage => stages::shot_image::apply_outputs(&self.ctx, finished).await,
            TaskKind::Audio => stages::audio::apply_outputs(&self.ctx, finished).await,
            TaskKind::Video => stages::video::apply_outputs(&self.ctx, finished).await,
        }
    }

    /// Take back records a stage wrote for a result that never became final
    async fn discard_outputs(&self, task: &Task, result: &TaskResult) {
        if let TaskResult::Storyboard(storyboard) = result {
            stages::storyboard::discard_outputs(&self.ctx, task, &storyboard.created_task_ids)
                .await;
        }
    }

    async fn fail(&self, task: &Task, cause: StoryforgeError) -> Result<RunOutcome> {
        let message = failure_message(&cause);
        let failed = match self
            .ctx
            .tasks
            .update(&task.id, TaskUpdate::fail(message.clone()))
            .await
        {
            Ok(failed) => failed,
            Err(StoryforgeError::InvalidTransition { from, .. }) => {
                warn!(task_id = %task.id, status = %from, error = %message, "Discarding late failure");
                return Ok(RunOutcome::Discarded);
            }
            Err(e) => return Err(e),
        };
        log_task_operation(
            "fail",
            &failed.id,
            failed.kind.as_str(),
            failed.project_id.as_deref(),
            failed.status.as_str(),
            Some(&message),
        );

        if failed.kind == TaskKind::ShotImage {
            stages::shot_image::mark_shot_failed(&self.ctx, &failed).await;
        }
        if let Err(e) = self.resolver.cancel_dependents(&failed).await {
            error!(task_id = %failed.id, error = %e, "Cancelling dependents failed");
        }
        Ok(RunOutcome::Failed { error: message })
    }

    /// Release blocked dependents in order and queue them
    async fn fan_out(&self, finished: &Task) -> Result<()> {
        let shots = match (finished.kind, finished.project_id.as_deref()) {
            (TaskKind::Storyboard, Some(project_id)) => {
                self.ctx.projects.list_shots(project_id).await?
            }
            _ => Vec::new(),
        };
        for released in self.resolver.release_dependents(finished, &shots).await? {
            self.queue.submit(released.id);
        }
        Ok(())
    }

    /// Move the project to `ready` once every shot is completed
    pub async fn refresh_project_readiness(&self, project_id: &str) -> Result<bool> {
        let shots = self.ctx.projects.list_shots(project_id).await?;
        let ready = !shots.is_empty() && shots.iter().all(|s| s.status.is_completed());
        if ready {
            self.ctx
                .projects
                .update_project(project_id, ProjectPatch::status(ProjectStatus::Ready))
                .await?;
            info!(project_id = %project_id, shots = shots.len(), "✅ All shots completed, project ready");
        }
        Ok(ready)
    }
}

#[async_trait]
impl TaskRunner for OrchestrationEngine {
    async fn run_task(&self, task_id: &str) {
        if let Err(e) = self.run(task_id).await {
            error!(task_id = %task_id, error = %e, "Run aborted");
        }
    }
}

/// Human-readable cause stored on a failed task
pub fn failure_message(error: &StoryforgeError) -> String {
    match error {
        StoryforgeError::ProviderError(e) => e.to_string(),
        StoryforgeError::AssemblyError(e) => e.to_string(),
        StoryforgeError::ValidationError(m)
        | StoryforgeError::StorageError(m)
        | StoryforgeError::InvalidState(m)
        | StoryforgeError::Internal(m)
        | StoryforgeError::ConfigurationError(m) => m.clone(),
        other => other.to_string(),
    }
}
