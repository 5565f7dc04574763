//! Storyboard stage: story text to shots, plus the blocked per-shot work.
//!
//! Shots and dependents are written before the task finishes. A run that does
//! not reach `finished` takes them back out with [`discard_outputs`]; the
//! project status only moves in [`apply_outputs`], after the finish.

use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

use super::{parameter_mismatch, StageContext, StageError, StageResult};
use crate::constants::{progress, resource_types};
use crate::error::{Result, StoryforgeError};
use crate::models::{
    GeneratedShot, ProjectPatch, Resource, Shot, StoryboardResult, Task, TaskFilter,
    TaskKind, TaskResult, TaskUpdate,
};
use crate::orchestration::scene_normalizer::normalize_scenes;
use crate::providers::StoryboardRequest;
use crate::state_machine::{ProjectStatus, TaskStatus};

#[instrument(skip(ctx, task), fields(task_id = %task.id, project_id = ?task.project_id))]
pub async fn execute(ctx: &StageContext, task: &Task) -> StageResult<TaskResult> {
    let params = task
        .parameters
        .as_storyboard()
        .ok_or_else(|| parameter_mismatch(task))?;
    let project_id = task.require_project_id()?;
    let project = ctx.projects.get_project(project_id).await?;

    let story = params
        .story
        .clone()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| project.story_text.clone());
    let style = params.style.clone().or_else(|| project.style.clone());
    let request = StoryboardRequest {
        story: story.clone(),
        style: style.clone(),
        scene_count: params.scene_count,
    };

    ctx.checkpoint(task, progress::PROVIDER_CALLED, "generating storyboard")
        .await?;
    let provider = ctx.providers.storyboard();
    let drafts = provider.generate_storyboard(&request).await?;
    let scenes = normalize_scenes(
        provider.name(),
        drafts,
        params.scene_count,
        &story,
        style.as_deref(),
    )?;
    ctx.checkpoint(task, progress::PROVIDER_RETURNED, "storyboard generated")
        .await?;

    let shots = ctx.projects.create_shots(project_id, scenes).await?;
    let mut created = Vec::new();
    let bound = async {
        let mut dependent_task_ids = bind_shot_tasks(ctx, task, &shots, &mut created).await?;
        if params.generate_tts {
            dependent_task_ids.push(ensure_narration_task(ctx, task, project_id, &mut created).await?);
        }
        ctx.checkpoint(task, progress::OUTPUT_PERSISTED, "shots created")
            .await?;
        Ok::<_, StageError>(dependent_task_ids)
    }
    .await;
    let dependent_task_ids = match bound {
        Ok(ids) => ids,
        Err(e) => {
            discard_outputs(ctx, task, &created).await;
            return Err(e);
        }
    };

    info!(
        project_id = %project_id,
        shots = shots.len(),
        dependents = dependent_task_ids.len(),
        "📝 Storyboard stored"
    );

    Ok(TaskResult::Storyboard(StoryboardResult {
        resource: Resource::new(resource_types::STORYBOARD, project_id, "")
            .with_meta("shot_count", shots.len()),
        shots: shots
            .iter()
            .map(|shot| GeneratedShot {
                shot_id: shot.id.clone(),
                order: shot.order,
                title: shot.title.clone(),
                prompt: shot.prompt.clone(),
            })
            .collect(),
        dependent_task_ids,
        created_task_ids: created,
    }))
}

/// Settle a finished storyboard on the project.
///
/// Runs only once the task is `finished`: blocked shot tasks left without a
/// shot are cancelled and the project moves to `text_generated`.
pub async fn apply_outputs(ctx: &StageContext, finished: &Task) -> Result<()> {
    let Some(TaskResult::Storyboard(result)) = &finished.result else {
        return Ok(());
    };
    let project_id = finished.require_project_id()?;

    let unbound = ctx
        .tasks
        .list_by(
            &TaskFilter::dependents_of(&finished.id)
                .with_kind(TaskKind::ShotImage)
                .with_status(TaskStatus::Blocked),
        )
        .await?
        .into_iter()
        .filter(|t| !result.dependent_task_ids.contains(&t.id));
    for extra in unbound {
        debug!(task_id = %extra.id, "Cancelling shot task with no matching shot");
        let update = TaskUpdate {
            expected_status: Some(TaskStatus::Blocked),
            ..TaskUpdate::cancel(format!("storyboard produced {} shots", result.shots.len()))
        };
        match ctx.tasks.update(&extra.id, update).await {
            Ok(_) => {}
            Err(StoryforgeError::InvalidTransition { from, .. }) => {
                debug!(task_id = %extra.id, status = %from, "Shot task already left blocked");
            }
            Err(e) => return Err(e),
        }
    }

    ctx.projects
        .update_project(
            project_id,
            ProjectPatch {
                status: Some(ProjectStatus::TextGenerated),
                shot_count: Some(result.shots.len() as u32),
                ..Default::default()
            },
        )
        .await?;
    Ok(())
}

/// Undo the records of a storyboard run that will not complete.
///
/// Cancels the blocked tasks the run created and drops the project's shots, so a
/// later storyboard starts from an empty project.
pub async fn discard_outputs(ctx: &StageContext, task: &Task, created_task_ids: &[String]) {
    for task_id in created_task_ids {
        let update = TaskUpdate {
            expected_status: Some(TaskStatus::Blocked),
            ..TaskUpdate::cancel(format!("storyboard {} did not finish", task.id))
        };
        match ctx.tasks.update(task_id, update).await {
            Ok(_) | Err(StoryforgeError::InvalidTransition { .. }) => {}
            Err(e) => warn!(task_id = %task_id, error = %e, "Failed to cancel orphaned dependent"),
        }
    }

    let Some(project_id) = task.project_id.as_deref() else {
        return;
    };
    match ctx.projects.delete_shots(project_id).await {
        Ok(removed) => {
            info!(
                task_id = %task.id,
                project_id = %project_id,
                shots = removed,
                cancelled = created_task_ids.len(),
                "Storyboard outputs discarded"
            );
        }
        Err(e) => warn!(project_id = %project_id, error = %e, "Failed to drop storyboard shots"),
    }
}

/// One blocked shot-image task per shot, reusing pre-created ones by shot order
async fn bind_shot_tasks(
    ctx: &StageContext,
    task: &Task,
    shots: &[Shot],
    created: &mut Vec<String>,
) -> StageResult<Vec<String>> {
    let existing = ctx
        .tasks
        .list_by(
            &TaskFilter::dependents_of(&task.id)
                .with_kind(TaskKind::ShotImage)
                .with_status(TaskStatus::Blocked),
        )
        .await?;

    let mut by_order: HashMap<u32, Task> = HashMap::new();
    for dependent in existing {
        if let Some(order) = dependent.shot_order() {
            if order as usize <= shots.len() {
                by_order.entry(order).or_insert(dependent);
            }
        }
    }

    let mut ids = Vec::with_capacity(shots.len());
    for shot in shots {
        let id = match by_order.remove(&shot.order) {
            Some(reused) => reused.id,
            None => {
                let new_task = ctx
                    .new_task(
                        TaskKind::ShotImage,
                        &shot.project_id,
                        json!({ "depends_on": task.id, "shot_order": shot.order }),
                    )
                    .with_shot(&shot.id);
                let id = ctx.tasks.create(new_task).await?.id;
                created.push(id.clone());
                id
            }
        };
        ids.push(id);
    }
    Ok(ids)
}

async fn ensure_narration_task(
    ctx: &StageContext,
    task: &Task,
    project_id: &str,
    created: &mut Vec<String>,
) -> StageResult<String> {
    let existing = ctx
        .tasks
        .list_by(
            &TaskFilter::dependents_of(&task.id)
                .with_kind(TaskKind::Audio)
                .with_status(TaskStatus::Blocked),
        )
        .await?;
    if let Some(audio) = existing.into_iter().find(|t| t.shot_id.is_none()) {
        return Ok(audio.id);
    }

    let new_task = ctx.new_task(TaskKind::Audio, project_id, json!({ "depends_on": task.id }));
    let id = ctx.tasks.create(new_task).await?.id;
    created.push(id.clone());
    Ok(id)
}
