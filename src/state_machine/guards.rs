//! Update guards. Each guard inspects the current record and the requested
//! update and rejects the combination before anything is written.

use crate::error::{Result, StoryforgeError};
use crate::models::{Task, TaskUpdate};

use super::states::TaskStatus;

/// A single rule a task update must satisfy
pub trait StateGuard {
    fn check(&self, task: &Task, update: &TaskUpdate, target: TaskStatus) -> Result<()>;

    /// Description of this guard for logging
    fn description(&self) -> &'static str;
}

fn violation(task: &Task, message: impl std::fmt::Display) -> StoryforgeError {
    StoryforgeError::ValidationError(format!("task {}: {message}", task.id))
}

/// A result is only accepted with the move to `finished`, and is required there
pub struct ResultMatchesTransitionGuard;

impl StateGuard for ResultMatchesTransitionGuard {
    fn check(&self, task: &Task, update: &TaskUpdate, target: TaskStatus) -> Result<()> {
        let finishing = target == TaskStatus::Finished && task.status != TaskStatus::Finished;
        match (&update.result, finishing) {
            (Some(result), true) if result.kind() != task.kind => Err(violation(
                task,
                format!("{} result on a {} task", result.kind(), task.kind),
            )),
            (Some(_), true) => Ok(()),
            (Some(_), false) => Err(violation(task, "result only accepted when finishing")),
            (None, true) => Err(violation(task, "finishing requires a result")),
            (None, false) => Ok(()),
        }
    }

    fn description(&self) -> &'static str {
        "Result must accompany the transition to finished"
    }
}

/// An error message is only accepted with the move to `failed`, and is required there
pub struct ErrorMatchesTransitionGuard;

impl StateGuard for ErrorMatchesTransitionGuard {
    fn check(&self, task: &Task, update: &TaskUpdate, target: TaskStatus) -> Result<()> {
        let failing = target == TaskStatus::Failed && task.status != TaskStatus::Failed;
        match (&update.error, failing) {
            (Some(error), true) if error.trim().is_empty() => {
                Err(violation(task, "failure requires a non-empty error"))
            }
            (Some(_), true) | (None, false) => Ok(()),
            (Some(_), false) => Err(violation(task, "error only accepted when failing")),
            (None, true) => Err(violation(task, "failure requires an error")),
        }
    }

    fn description(&self) -> &'static str {
        "Error must accompany the transition to failed"
    }
}

/// Progress is bounded and only recorded while processing or finishing
pub struct ProgressGuard;

impl StateGuard for ProgressGuard {
    fn check(&self, task: &Task, update: &TaskUpdate, target: TaskStatus) -> Result<()> {
        let Some(progress) = update.progress else {
            return Ok(());
        };
        if progress > 100 {
            return Err(violation(task, format!("progress {progress} exceeds 100")));
        }
        if !target.accepts_progress() {
            return Err(violation(task, format!("progress not accepted while {target}")));
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Progress must be within 0-100 while processing"
    }
}

/// Parameters may be replaced only before the task runs
pub struct ParametersEditableGuard;

impl StateGuard for ParametersEditableGuard {
    fn check(&self, task: &Task, update: &TaskUpdate, _target: TaskStatus) -> Result<()> {
        let Some(parameters) = &update.parameters else {
            return Ok(());
        };
        if !matches!(task.status, TaskStatus::Blocked | TaskStatus::Pending) {
            return Err(violation(
                task,
                format!("parameters cannot change while {}", task.status),
            ));
        }
        if parameters.kind() != task.kind {
            return Err(violation(
                task,
                format!("{} parameters on a {} task", parameters.kind(), task.kind),
            ));
        }
        parameters.validate()
    }

    fn description(&self) -> &'static str {
        "Parameters are editable only while blocked or pending"
    }
}

/// All guards, in evaluation order
pub fn default_guards() -> Vec<Box<dyn StateGuard + Send + Sync>> {
    vec![
        Box::new(ResultMatchesTransitionGuard),
        Box::new(ErrorMatchesTransitionGuard),
        Box::new(ProgressGuard),
        Box::new(ParametersEditableGuard),
    ]
}
