//! # Dependency Resolver
//!
//! Fan-out of a finished (or permanently failed) task to the tasks waiting on it.
//!
//! ## Overview
//!
//! Dependents are found through the task store's `depends_on` index, ordered by
//! shot order and then creation order. Release is a compare-and-set
//! `blocked -> pending`; a dependent that was cancelled or released concurrently is
//! skipped, never forced.

use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::error::{Result, StoryforgeError};
use crate::models::{Shot, Task, TaskFilter, TaskParameters, TaskUpdate};
use crate::state_machine::TaskStatus;
use crate::store::TaskStore;

#[derive(Clone)]
pub struct DependencyResolver {
    tasks: Arc<dyn TaskStore>,
    cancel_dependents_on_failure: bool,
}

impl std::fmt::Debug for DependencyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyResolver")
            .field("cancel_dependents_on_failure", &self.cancel_dependents_on_failure)
            .finish()
    }
}

impl DependencyResolver {
    pub fn new(tasks: Arc<dyn TaskStore>, cancel_dependents_on_failure: bool) -> Self {
        Self {
            tasks,
            cancel_dependents_on_failure,
        }
    }

    pub fn cancels_dependents(&self) -> bool {
        self.cancel_dependents_on_failure
    }

    /// Blocked dependents of `parent_id`, in release order
    pub async fn blocked_dependents(&self, parent_id: &str) -> Result<Vec<Task>> {
        let mut dependents = self
            .tasks
            .list_by(&TaskFilter::dependents_of(parent_id).with_status(TaskStatus::Blocked))
            .await?;
        // list_by is insertion-ordered and the sort is stable
        dependents.sort_by_key(|task| task.shot_order().unwrap_or(u32::MAX));
        Ok(dependents)
    }

    /// Release every blocked dependent of a finished parent.
    ///
    /// `shots` are the parent's project shots; shot-image dependents bound by
    /// `shot_order` get the shot's id and prompt injected on release.
    #[instrument(skip(self, parent, shots), fields(parent_id = %parent.id))]
    pub async fn release_dependents(&self, parent: &Task, shots: &[Shot]) -> Result<Vec<Task>> {
        if parent.status != TaskStatus::Finished {
            return Err(StoryforgeError::InvalidState(format!(
                "task {} is {}, dependents are released only by finished tasks",
                parent.id, parent.status
            )));
        }

        let mut released = Vec::new();
        for dependent in self.blocked_dependents(&parent.id).await? {
            let update = release_update(&dependent, shots);
            match self.tasks.update(&dependent.id, update).await {
                Ok(task) => {
                    debug!(task_id = %task.id, kind = %task.kind, "Dependent released");
                    released.push(task);
                }
                Err(StoryforgeError::InvalidTransition { .. }) => {
                    debug!(task_id = %dependent.id, "Dependent left blocked concurrently, skipping");
                }
                Err(e) => return Err(e),
            }
        }

        if !released.is_empty() {
            info!(
                parent_id = %parent.id,
                released = released.len(),
                "🔓 Dependents unblocked"
            );
        }
        Ok(released)
    }

    /// Cancel the blocked dependents of a failed or cancelled task, transitively.
    ///
    /// No-op unless `cancel_dependents_on_failure` is enabled.
    #[instrument(skip(self, parent), fields(parent_id = %parent.id))]
    pub async fn cancel_dependents(&self, parent: &Task) -> Result<Vec<Task>> {
        if !self.cancel_dependents_on_failure {
            return Ok(Vec::new());
        }
        if !matches!(parent.status, TaskStatus::Failed | TaskStatus::Cancelled) {
            return Ok(Vec::new());
        }

        let mut cancelled = Vec::new();
        let mut frontier = vec![(parent.id.clone(), parent.status)];
        while let Some((parent_id, parent_status)) = frontier.pop() {
            for dependent in self.blocked_dependents(&parent_id).await? {
                let update = TaskUpdate {
                    expected_status: Some(TaskStatus::Blocked),
                    ..TaskUpdate::cancel(format!("dependency {parent_id} {parent_status}"))
                };
                match self.tasks.update(&dependent.id, update).await {
                    Ok(task) => {
                        frontier.push((task.id.clone(), task.status));
                        cancelled.push(task);
                    }
                    Err(StoryforgeError::InvalidTransition { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        if !cancelled.is_empty() {
            info!(
                parent_id = %parent.id,
                cancelled = cancelled.len(),
                "Dependents cancelled after upstream {}", parent.status
            );
        }
        Ok(cancelled)
    }
}

/// `blocked -> pending`, injecting shot bindings where the dependent needs them
pub fn release_update(dependent: &Task, shots: &[Shot]) -> TaskUpdate {
    let TaskParameters::ShotImage(params) = &dependent.parameters else {
        return TaskUpdate::release(None, None);
    };

    let shot = match (&dependent.shot_id, params.shot_order) {
        (Some(shot_id), _) => shots.iter().find(|s| &s.id == shot_id),
        (None, Some(order)) => shots.iter().find(|s| s.order == order),
        (None, None) => None,
    };
    let Some(shot) = shot else {
        return TaskUpdate::release(None, None);
    };

    let mut params = params.clone();
    params.shot_order = Some(shot.order);
    if params.prompt.as_deref().map_or(true, |p| p.trim().is_empty()) {
        params.prompt = Some(shot.prompt.clone());
    }
    if params.negative_prompt.is_none() {
        params.negative_prompt = shot.negative_prompt.clone();
    }
    TaskUpdate::release(
        Some(TaskParameters::ShotImage(params)),
        Some(shot.id.clone()),
    )
}
