use chrono::{DateTime, Utc};
use tracing::debug;

use super::guards::{default_guards, StateGuard};
use super::states::TaskStatus;
use crate::error::{Result, StoryforgeError};
use crate::models::{Task, TaskUpdate};

/// Outcome of applying an update to a task record
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedUpdate {
    pub task: Task,
    pub status_changed: bool,
    pub progress_changed: bool,
}

impl AppliedUpdate {
    /// Whether subscribers should hear about this update
    pub fn is_observable(&self) -> bool {
        self.status_changed || self.progress_changed
    }
}

/// Pure task lifecycle validator.
///
/// The store calls [`TaskStateMachine::apply`] while holding the record's lock;
/// the machine never touches storage itself.
pub struct TaskStateMachine {
    guards: Vec<Box<dyn StateGuard + Send + Sync>>,
}

impl Default for TaskStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskStateMachine")
            .field(
                "guards",
                &self.guards.iter().map(|g| g.description()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl TaskStateMachine {
    pub fn new() -> Self {
        Self {
            guards: default_guards(),
        }
    }

    /// Validate `update` against `task` and return the updated record
    pub fn apply(&self, task: &Task, update: TaskUpdate, now: DateTime<Utc>) -> Result<AppliedUpdate> {
        let target = self.determine_target_state(task, &update)?;
        self.check_guards(task, &update, target)?;

        let mut next = task.clone();
        let status_changed = target != task.status;
        next.status = target;

        let previous_progress = task.progress;
        if let Some(progress) = update.progress {
            next.progress = next.progress.max(progress);
        }
        if target == TaskStatus::Finished {
            next.progress = 100;
        }
        let progress_changed = next.progress != previous_progress;

        if let Some(message) = update.message {
            next.message = message;
        }
        if let Some(result) = update.result {
            next.result = Some(result);
        }
        if let Some(error) = update.error {
            next.error = Some(error);
        }
        if let Some(parameters) = update.parameters {
            next.parameters = parameters;
        }
        if let Some(shot_id) = update.shot_id {
            next.shot_id = Some(shot_id);
        }

        if status_changed {
            if target == TaskStatus::Processing {
                next.started_at = Some(now);
            }
            if target.is_terminal() {
                next.finished_at = Some(now);
            }
            debug!(
                task_id = %task.id,
                from = %task.status,
                to = %target,
                "Task state transition"
            );
        }
        next.updated_at = now;

        Ok(AppliedUpdate {
            task: next,
            status_changed,
            progress_changed,
        })
    }

    /// Determine the target state and reject edges outside the lifecycle
    fn determine_target_state(&self, task: &Task, update: &TaskUpdate) -> Result<TaskStatus> {
        let target = update.status.unwrap_or(task.status);
        let invalid = || StoryforgeError::InvalidTransition {
            task_id: task.id.clone(),
            from: task.status,
            to: target.to_string(),
        };

        if task.status.is_terminal() {
            return Err(invalid());
        }
        if let Some(expected) = update.expected_status {
            if expected != task.status {
                return Err(invalid());
            }
        }
        if target != task.status && !task.status.can_transition_to(target) {
            return Err(invalid());
        }
        Ok(target)
    }

    fn check_guards(&self, task: &Task, update: &TaskUpdate, target: TaskStatus) -> Result<()> {
        for guard in &self.guards {
            guard.check(task, update, target)?;
        }
        Ok(())
    }
}
