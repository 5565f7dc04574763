//! Shot-image stage: one generated still per shot. The stage writes the file;
//! the shot record only changes in [`apply_outputs`], after the task finishes.

use serde_json::{json, Map};
use tracing::{instrument, warn};

use super::{parameter_mismatch, shot_file_name, StageContext, StageResult};
use crate::constants::{progress, resource_types};
use crate::error::{Result, StoryforgeError};
use crate::models::{ImageResult, ProjectPatch, Resource, Shot, ShotPatch, Task, TaskResult};
use crate::orchestration::scene_normalizer::apply_style;
use crate::providers::ImageRequest;
use crate::state_machine::ShotStatus;
use crate::storage::ArtifactKind;

/// The shot a shot-image task works on: by `shot_id`, else by `shot_order`
pub async fn resolve_shot(ctx: &StageContext, task: &Task) -> Result<Shot> {
    if let Some(shot_id) = &task.shot_id {
        return ctx.projects.get_shot(shot_id).await;
    }
    match (task.project_id.as_deref(), task.shot_order()) {
        (Some(project_id), Some(order)) => ctx.projects.shot_by_order(project_id, order).await,
        _ => Err(StoryforgeError::ValidationError(format!(
            "task {} names neither a shot_id nor a shot_order",
            task.id
        ))),
    }
}

#[instrument(skip(ctx, task), fields(task_id = %task.id, shot_id = ?task.shot_id))]
pub async fn execute(ctx: &StageContext, task: &Task) -> StageResult<TaskResult> {
    let params = task
        .parameters
        .as_shot_image()
        .ok_or_else(|| parameter_mismatch(task))?;
    let project_id = task.require_project_id()?;
    let shot = resolve_shot(ctx, task).await?;
    let project = ctx.projects.get_project(project_id).await?;

    ctx.projects
        .update_shot(&shot.id, ShotPatch::status(ShotStatus::Processing))
        .await?;

    let prompt = params
        .prompt
        .clone()
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| shot.prompt.clone());
    let style = params.style.as_deref().or(project.style.as_deref());
    let request = ImageRequest {
        prompt: apply_style(&prompt, style),
        negative_prompt: params
            .negative_prompt
            .clone()
            .or_else(|| shot.negative_prompt.clone()),
        width: params.width,
        height: params.height,
        scene_id: Some(shot.id.clone()),
    };

    ctx.checkpoint(task, progress::PROVIDER_CALLED, "generating image")
        .await?;
    let bytes = ctx.providers.image().generate_image(&request).await?;
    ctx.checkpoint(task, progress::PROVIDER_RETURNED, "image generated")
        .await?;

    let path = ctx
        .storage
        .write(
            project_id,
            ArtifactKind::Image,
            &shot_file_name(shot.order),
            "png",
            &bytes,
        )
        .await?;
    let url = ctx.storage.url(&path);
    ctx.checkpoint(task, progress::OUTPUT_PERSISTED, "image stored")
        .await?;

    Ok(TaskResult::ShotImage(ImageResult {
        resource: Resource::new(resource_types::IMAGE, &shot.id, url)
            .with_meta("shot_order", shot.order),
        shot_id: shot.id,
        path: path.display().to_string(),
        width: params.width,
        height: params.height,
    }))
}

/// Merge a finished image into its shot, and into the project cover for shot 1.
///
/// Runs only once the task is `finished`, so a cancelled or timed-out run never
/// leaves a completed shot behind.
pub async fn apply_outputs(ctx: &StageContext, finished: &Task) -> Result<()> {
    let Some(TaskResult::ShotImage(result)) = &finished.result else {
        return Ok(());
    };
    let url = result.resource.resource_url.clone();

    let mut metadata = Map::new();
    metadata.insert("image_url".to_string(), json!(url));
    let shot = ctx
        .projects
        .update_shot(
            &result.shot_id,
            ShotPatch {
                image_path: Some(result.path.clone()),
                status: Some(ShotStatus::Completed),
                metadata: Some(metadata),
                ..Default::default()
            },
        )
        .await?;
    if shot.order == 1 {
        ctx.projects
            .update_project(
                &shot.project_id,
                ProjectPatch {
                    cover_image: Some(url),
                    ..Default::default()
                },
            )
            .await?;
    }
    Ok(())
}

/// Mark the task's shot failed; the project then never reaches `ready`
pub async fn mark_shot_failed(ctx: &StageContext, task: &Task) {
    let shot = match resolve_shot(ctx, task).await {
        Ok(shot) => shot,
        Err(e) => {
            warn!(task_id = %task.id, error = %e, "No shot to mark failed");
            return;
        }
    };
    if shot.status.is_completed() {
        return;
    }
    if let Err(e) = ctx
        .projects
        .update_shot(&shot.id, ShotPatch::status(ShotStatus::Failed))
        .await
    {
        warn!(task_id = %task.id, shot_id = %shot.id, error = %e, "Failed to mark shot failed");
    }
}
