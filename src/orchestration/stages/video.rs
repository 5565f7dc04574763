//! Video stage: animate every shot, then mux the clips with the narration track.

use std::path::PathBuf;
use tracing::{info, instrument, warn};

use super::{parameter_mismatch, shot_file_name, StageContext, StageResult};
use crate::assembly::AssemblyRequest;
use crate::constants::{progress, resource_types};
use crate::error::{Result, StoryforgeError};
use crate::models::{ProjectPatch, Resource, Shot, ShotPatch, Task, TaskResult, VideoParams, VideoResult};
use crate::providers::{AnimationRequest, ClipOutput};
use crate::storage::ArtifactKind;

#[instrument(skip(ctx, task), fields(task_id = %task.id, project_id = ?task.project_id))]
pub async fn execute(ctx: &StageContext, task: &Task) -> StageResult<TaskResult> {
    let params = task
        .parameters
        .as_video()
        .ok_or_else(|| parameter_mismatch(task))?;
    let project_id = task.require_project_id()?;
    let project = ctx.projects.get_project(project_id).await?;
    let shots = ctx.projects.list_shots(project_id).await?;
    if shots.is_empty() {
        return Err(StoryforgeError::ValidationError(format!(
            "project {project_id} has no shots to animate"
        ))
        .into());
    }
    if let Some(missing) = shots.iter().find(|s| s.image_path.is_none()) {
        return Err(StoryforgeError::ValidationError(format!(
            "shot {} has no image",
            missing.order
        ))
        .into());
    }

    ctx.checkpoint(task, progress::PROVIDER_CALLED, "animating shots")
        .await?;

    let span = u32::from(progress::PROVIDER_RETURNED - progress::PROVIDER_CALLED);
    let mut clips = Vec::with_capacity(shots.len());
    let mut clip_resources = Vec::with_capacity(shots.len());
    for (index, shot) in shots.iter().enumerate() {
        let clip = animate_shot(ctx, project_id, shot, params).await?;
        let clip_url = ctx.storage.url(&clip);
        ctx.projects
            .update_shot(
                &shot.id,
                ShotPatch {
                    video_path: Some(clip.display().to_string()),
                    duration: Some(params.clip_seconds),
                    transition: params.transition.clone(),
                    ..Default::default()
                },
            )
            .await?;
        clip_resources.push(
            Resource::new(resource_types::CLIP, &shot.id, clip_url)
                .with_meta("shot_order", shot.order),
        );
        clips.push(clip);

        let done = (index + 1) as u32;
        let pct = progress::PROVIDER_CALLED as u32 + span * done / shots.len() as u32;
        ctx.checkpoint(
            task,
            pct as u8,
            &format!("animated shot {done}/{}", shots.len()),
        )
        .await?;
    }

    ctx.checkpoint(task, progress::ASSEMBLING, "assembling video")
        .await?;
    let audio = params
        .audio_path
        .clone()
        .or_else(|| project.narration_path.clone())
        .map(PathBuf::from);
    let output = ctx
        .storage
        .path_for(project_id, ArtifactKind::Video, "final", &params.format);
    ctx.storage.prepare(&output).await?;
    let path = ctx
        .assembler
        .assemble(&AssemblyRequest {
            clips,
            audio,
            output,
            fps: params.fps,
            resolution: params.resolution.clone(),
            format: params.format.clone(),
        })
        .await?;

    let url = ctx.storage.url(&path);
    let duration = params.clip_seconds * shots.len() as f64;
    ctx.checkpoint(task, progress::OUTPUT_PERSISTED, "video stored")
        .await?;

    Ok(TaskResult::Video(VideoResult {
        resource: Resource::new(resource_types::VIDEO, project_id, url),
        path: path.display().to_string(),
        duration,
        fps: params.fps,
        resolution: params.resolution.clone(),
        format: params.format.clone(),
        clips: clip_resources,
    }))
}

/// Publish the finished video on the project
pub async fn apply_outputs(ctx: &StageContext, finished: &Task) -> Result<()> {
    let Some(TaskResult::Video(result)) = &finished.result else {
        return Ok(());
    };
    let project_id = finished.require_project_id()?;
    ctx.projects
        .update_project(
            project_id,
            ProjectPatch {
                video_url: Some(result.resource.resource_url.clone()),
                duration: Some(result.duration),
                shot_count: Some(result.clips.len() as u32),
                ..Default::default()
            },
        )
        .await?;
    info!(project_id = %project_id, duration = result.duration, "🎞️ Project video ready");
    Ok(())
}

/// Animate one shot, falling back to a still clip when enabled
async fn animate_shot(
    ctx: &StageContext,
    project_id: &str,
    shot: &Shot,
    params: &VideoParams,
) -> StageResult<PathBuf> {
    let image = PathBuf::from(shot.image_path.clone().unwrap_or_default());
    let request = AnimationRequest {
        image_path: image.clone(),
        duration: params.clip_seconds,
        fps: params.fps,
    };
    let name = shot_file_name(shot.order);

    match ctx.providers.animation().animate_image(&request).await {
        Ok(ClipOutput::Path(path)) => Ok(path),
        Ok(ClipOutput::Bytes(bytes)) => Ok(ctx
            .storage
            .write(project_id, ArtifactKind::Clip, &name, "mp4", &bytes)
            .await?),
        Err(e) if ctx.assembly.static_fallback => {
            warn!(
                shot_id = %shot.id,
                error = %e,
                "Animation failed, rendering still clip instead"
            );
            let output = ctx
                .storage
                .path_for(project_id, ArtifactKind::Clip, &name, "mp4");
            ctx.storage.prepare(&output).await?;
            Ok(ctx
                .assembler
                .still_clip(&image, params.clip_seconds, params.fps, &output)
                .await?)
        }
        Err(e) => Err(e.into()),
    }
}
