//! Audio stage: narration for one shot, or the project-level track.

use tracing::instrument;

use super::{parameter_mismatch, shot_file_name, StageContext, StageResult};
use crate::constants::{progress, resource_types};
use crate::error::{Result, StoryforgeError};
use crate::models::{AudioResult, ProjectPatch, Resource, ShotPatch, Task, TaskResult};
use crate::providers::SpeechRequest;
use crate::storage::ArtifactKind;

#[instrument(skip(ctx, task), fields(task_id = %task.id, shot_id = ?task.shot_id))]
pub async fn execute(ctx: &StageContext, task: &Task) -> StageResult<TaskResult> {
    let params = task
        .parameters
        .as_audio()
        .ok_or_else(|| parameter_mismatch(task))?;
    let project_id = task.require_project_id()?;

    let shot = match &task.shot_id {
        Some(shot_id) => Some(ctx.projects.get_shot(shot_id).await?),
        None => None,
    };
    let text = match (&params.text, &shot) {
        (Some(text), _) if !text.trim().is_empty() => text.trim().to_string(),
        (_, Some(shot)) => shot.narration.trim().to_string(),
        (_, None) => ctx
            .projects
            .list_shots(project_id)
            .await?
            .iter()
            .map(|s| s.narration.trim())
            .filter(|n| !n.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
    };
    if text.is_empty() {
        return Err(StoryforgeError::ValidationError("no narration text to synthesize".to_string()).into());
    }

    ctx.checkpoint(task, progress::PROVIDER_CALLED, "synthesizing speech")
        .await?;
    let audio = ctx
        .providers
        .speech()
        .synthesize_speech(&SpeechRequest {
            text: text.clone(),
            voice: params.voice.clone(),
            speed: params.speed,
        })
        .await?;
    ctx.checkpoint(task, progress::PROVIDER_RETURNED, "speech synthesized")
        .await?;

    let name = shot
        .as_ref()
        .map_or_else(|| "narration".to_string(), |s| shot_file_name(s.order));
    let path = ctx
        .storage
        .write(project_id, ArtifactKind::Audio, &name, "wav", &audio.bytes)
        .await?;
    let url = ctx.storage.url(&path);
    ctx.checkpoint(task, progress::OUTPUT_PERSISTED, "audio stored")
        .await?;

    let resource_id = shot.as_ref().map_or(project_id, |s| s.id.as_str()).to_string();
    Ok(TaskResult::Audio(AudioResult {
        resource: Resource::new(resource_types::AUDIO, resource_id, url)
            .with_meta("sample_rate", audio.sample_rate),
        shot_id: shot.map(|s| s.id),
        path: path.display().to_string(),
        sample_rate: audio.sample_rate,
        characters: text.chars().count(),
    }))
}

/// Record the finished narration on its shot, or on the project for the full track
pub async fn apply_outputs(ctx: &StageContext, finished: &Task) -> Result<()> {
    let Some(TaskResult::Audio(result)) = &finished.result else {
        return Ok(());
    };
    match &result.shot_id {
        Some(shot_id) => {
            ctx.projects
                .update_shot(
                    shot_id,
                    ShotPatch {
                        audio_path: Some(result.path.clone()),
                        ..Default::default()
                    },
                )
                .await?;
        }
        None => {
            ctx.projects
                .update_project(
                    finished.require_project_id()?,
                    ProjectPatch {
                        narration_path: Some(result.path.clone()),
                        ..Default::default()
                    },
                )
                .await?;
        }
    }
    Ok(())
}
