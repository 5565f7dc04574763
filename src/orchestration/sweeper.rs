//! # Stuck Task Sweeper
//!
//! Fails tasks that have sat in `processing` longer than the configured timeout.
//! The engine's own final update then loses its compare-and-set and the late
//! provider result is discarded.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::dependency_resolver::DependencyResolver;
use super::stages::{shot_image, StageContext};
use crate::error::{Result, StoryforgeError};
use crate::models::{Task, TaskFilter, TaskKind, TaskUpdate};
use crate::state_machine::TaskStatus;

#[derive(Debug)]
pub struct StuckTaskSweeper {
    ctx: StageContext,
    resolver: DependencyResolver,
    timeout: Duration,
    interval: Duration,
}

impl StuckTaskSweeper {
    pub fn new(
        ctx: StageContext,
        resolver: DependencyResolver,
        timeout: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            ctx,
            resolver,
            timeout,
            interval,
        }
    }

    /// Fail every overdue processing task; returns the tasks it failed
    pub async fn sweep_once(&self) -> Result<Vec<Task>> {
        let now = Utc::now();
        let limit = chrono::Duration::from_std(self.timeout)
            .map_err(|e| StoryforgeError::Internal(format!("invalid sweep timeout: {e}")))?;
        let processing = self
            .ctx
            .tasks
            .list_by(&TaskFilter::default().with_status(TaskStatus::Processing))
            .await?;

        let mut swept = Vec::new();
        for task in processing {
            let Some(started_at) = task.started_at else {
                continue;
            };
            if now - started_at <= limit {
                continue;
            }
            let reason = format!("timed out after {}s in processing", self.timeout.as_secs());
            match self.ctx.tasks.update(&task.id, TaskUpdate::fail(reason)).await {
                Ok(failed) => {
                    warn!(task_id = %failed.id, kind = %failed.kind, "⏱️ Stuck task failed by sweeper");
                    if failed.kind == TaskKind::ShotImage {
                        shot_image::mark_shot_failed(&self.ctx, &failed).await;
                    }
                    self.resolver.cancel_dependents(&failed).await?;
                    swept.push(failed);
                }
                // Finished or cancelled between the scan and the update
                Err(StoryforgeError::InvalidTransition { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(swept)
    }

    /// Run `sweep_once` every interval until `shutdown` flips
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                timeout_secs = self.timeout.as_secs(),
                interval_secs = self.interval.as_secs(),
                "Stuck-task sweeper started"
            );
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {
                        match self.sweep_once().await {
                            Ok(swept) if !swept.is_empty() => {
                                info!(count = swept.len(), "Sweep failed stuck tasks");
                            }
                            Ok(_) => debug!("Sweep found nothing stuck"),
                            Err(e) => error!(error = %e, "Sweep failed"),
                        }
                    }
                }
            }
            debug!("Stuck-task sweeper stopped");
        })
    }
}
