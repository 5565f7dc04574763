//! # Task Store
//!
//! Task id to task record, with every mutation checked by the
//! [`TaskStateMachine`]. The in-memory implementation keeps one `DashMap` entry
//! per task; an update holds that entry's shard lock while it validates, writes,
//! and publishes, so subscribers see events in update order.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, instrument, warn};

use crate::error::{Result, StoryforgeError};
use crate::events::{ProgressHub, StatusEvent};
use crate::models::{NewTask, Task, TaskFilter, TaskUpdate};
use crate::state_machine::{TaskStateMachine, TaskStatus};

/// Persistence seam for task records
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Normalize parameters and insert a new task, born `blocked` or `pending`
    async fn create(&self, new_task: NewTask) -> Result<Task>;

    async fn get(&self, task_id: &str) -> Result<Task>;

    /// Apply an atomic, state-machine-checked partial update
    async fn update(&self, task_id: &str, update: TaskUpdate) -> Result<Task>;

    /// Matching tasks in insertion order
    async fn list_by(&self, filter: &TaskFilter) -> Result<Vec<Task>>;
}

#[derive(Debug, Clone)]
struct TaskEntry {
    seq: u64,
    task: Task,
}

/// `DashMap`-backed task store
#[derive(Debug)]
pub struct InMemoryTaskStore {
    tasks: DashMap<String, TaskEntry>,
    next_seq: AtomicU64,
    state_machine: TaskStateMachine,
    hub: ProgressHub,
}

impl InMemoryTaskStore {
    pub fn new(hub: ProgressHub) -> Self {
        Self {
            tasks: DashMap::new(),
            next_seq: AtomicU64::new(0),
            state_machine: TaskStateMachine::new(),
            hub,
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn status_of(&self, task_id: &str) -> Option<TaskStatus> {
        self.tasks.get(task_id).map(|entry| entry.task.status)
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    #[instrument(skip(self, new_task), fields(kind = %new_task.kind))]
    async fn create(&self, new_task: NewTask) -> Result<Task> {
        let parameters = new_task.validate()?;

        let status = match parameters.depends_on() {
            None => TaskStatus::Pending,
            Some(dependency) => match self.status_of(dependency) {
                None => {
                    return Err(StoryforgeError::ValidationError(format!(
                        "depends_on references unknown task {dependency}"
                    )))
                }
                Some(s) if s.satisfies_dependencies() => TaskStatus::Pending,
                Some(_) => TaskStatus::Blocked,
            },
        };

        let task = Task::from_new(new_task, parameters, status);
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.tasks.insert(
            task.id.clone(),
            TaskEntry {
                seq,
                task: task.clone(),
            },
        );
        debug!(task_id = %task.id, status = %task.status, "Task created");

        // The dependency may have finished between the check and the insert;
        // its fan-out would not have seen this task, so release it here.
        if task.status == TaskStatus::Blocked {
            let dependency_done = task
                .depends_on()
                .and_then(|d| self.status_of(d))
                .is_some_and(|s| s.satisfies_dependencies());
            if dependency_done {
                match self.update(&task.id, TaskUpdate::release(None, None)).await {
                    Ok(released) => return Ok(released),
                    Err(e) => debug!(task_id = %task.id, error = %e, "Release raced with fan-out"),
                }
                return self.get(&task.id).await;
            }
        }

        Ok(task)
    }

    async fn get(&self, task_id: &str) -> Result<Task> {
        self.tasks
            .get(task_id)
            .map(|entry| entry.task.clone())
            .ok_or_else(|| StoryforgeError::task_not_found(task_id))
    }

    #[instrument(skip(self, update), fields(target = ?update.status))]
    async fn update(&self, task_id: &str, update: TaskUpdate) -> Result<Task> {
        let mut entry = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| StoryforgeError::task_not_found(task_id))?;

        let applied = match self.state_machine.apply(&entry.task, update, Utc::now()) {
            Ok(applied) => applied,
            Err(e @ StoryforgeError::InvalidTransition { .. }) => {
                // Lost compare-and-set races land here routinely
                debug!(task_id = %task_id, error = %e, "Task update lost to a concurrent transition");
                return Err(e);
            }
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Rejected task update");
                return Err(e);
            }
        };

        entry.task = applied.task.clone();
        if applied.is_observable() {
            self.hub.publish(StatusEvent::new(applied.task.snapshot()));
        }
        Ok(applied.task)
    }

    async fn list_by(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let mut matching: Vec<(u64, Task)> = self
            .tasks
            .iter()
            .filter(|entry| filter.matches(&entry.task))
            .map(|entry| (entry.seq, entry.task.clone()))
            .collect();
        matching.sort_by_key(|(seq, _)| *seq);
        Ok(matching.into_iter().map(|(_, task)| task).collect())
    }
}
