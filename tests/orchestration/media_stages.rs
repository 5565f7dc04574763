use serde_json::json;

use storyforge_core::models::{NewTask, StoryboardParams, TaskFilter, TaskKind};
use storyforge_core::state_machine::TaskStatus;

use super::assert_outcome_fields;
use crate::common::*;

async fn video_task(harness: &TestHarness, project_id: &str) -> storyforge_core::TaskSnapshot {
    let task = harness
        .orchestrator
        .create_task(NewTask::for_project(TaskKind::Video, project_id))
        .await
        .unwrap();
    let done = harness
        .orchestrator
        .wait_for_terminal(&task.id, WAIT)
        .await
        .unwrap();
    // Project records are merged right after the terminal event
    harness.settle().await;
    done
}

#[tokio::test]
async fn test_tts_flag_schedules_project_narration() {
    let harness = TestHarness::start();
    let project = harness.project("A fox ran. It hid.").await;
    harness
        .orchestrator
        .start_generation(
            &project.id,
            StoryboardParams {
                scene_count: 2,
                generate_tts: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    harness.settle().await;

    let audio = harness
        .orchestrator
        .list_tasks(&TaskFilter::for_project(&project.id).with_kind(TaskKind::Audio))
        .await
        .unwrap();
    assert_eq!(audio.len(), 1);
    assert_eq!(audio[0].status, TaskStatus::Finished);
    assert!(audio[0].shot_id.is_none());

    assert_eq!(harness.speech.texts(), vec!["narration 1\nnarration 2"]);
    let project = harness.orchestrator.get_project(&project.id).await.unwrap();
    let narration = project.narration_path.unwrap();
    assert!(narration.ends_with("audio/narration.wav"), "{narration}");
    assert!(std::path::Path::new(&narration).exists());
    harness.orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_shot_audio_uses_shot_narration() {
    let harness = TestHarness::start();
    let (project, _) = harness.generate("A fox ran. It hid.", 2).await;
    let shots = harness.orchestrator.list_shots(&project.id).await.unwrap();

    let task = harness
        .orchestrator
        .create_task(NewTask::for_project(TaskKind::Audio, &project.id).with_shot(&shots[1].id))
        .await
        .unwrap();
    let done = harness
        .orchestrator
        .wait_for_terminal(&task.id, WAIT)
        .await
        .unwrap();
    assert_eq!(done.status, TaskStatus::Finished);
    assert_eq!(harness.speech.texts(), vec!["narration 2"]);

    harness.settle().await;
    let shot = harness.orchestrator.get_shot(&shots[1].id).await.unwrap();
    assert!(shot.audio_path.unwrap().ends_with("shot_002.wav"));
    harness.orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_empty_narration_fails_audio_task() {
    let harness = TestHarness::builder()
        .storyboard(FakeStoryboard::with_scenes(vec![storyforge_core::providers::SceneDraft {
            title: "Silent".to_string(),
            prompt: "an empty field".to_string(),
            narration: String::new(),
            bgm: None,
        }]))
        .build();
    let (project, _) = harness.generate("A fox ran.", 1).await;

    let task = harness
        .orchestrator
        .create_task(NewTask::for_project(TaskKind::Audio, &project.id))
        .await
        .unwrap();
    let done = harness
        .orchestrator
        .wait_for_terminal(&task.id, WAIT)
        .await
        .unwrap();
    assert_eq!(done.status, TaskStatus::Failed);
    assert_eq!(done.error.as_deref(), Some("no narration text to synthesize"));
    assert_eq!(harness.speech.calls(), 0);
    harness.orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_video_assembles_all_clips() {
    let harness = TestHarness::start();
    let (project, _) = harness.generate("A fox ran. It hid.", 2).await;

    let done = video_task(&harness, &project.id).await;
    assert_eq!(done.status, TaskStatus::Finished);
    let result = done.result.as_ref().unwrap().as_video().unwrap();
    assert_eq!(result.clips.len(), 2);
    assert_eq!(result.duration, 10.0);

    let assembled = harness.assembler.assembled();
    assert_eq!(assembled.len(), 1);
    assert_eq!(assembled[0].clips.len(), 2);
    assert!(assembled[0].audio.is_none());
    assert_eq!(assembled[0].format, "mp4");

    let project = harness.orchestrator.get_project(&project.id).await.unwrap();
    assert_eq!(
        project.video_url.as_deref(),
        Some(format!("/files/{}/video/final.mp4", project.id).as_str())
    );
    assert_eq!(project.duration, Some(10.0));
    for shot in harness.orchestrator.list_shots(&project.id).await.unwrap() {
        assert!(shot.video_path.is_some());
        assert_eq!(shot.duration, Some(5.0));
    }
    assert_outcome_fields(&harness.orchestrator, &project.id).await;
    harness.orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_video_uses_project_narration_track() {
    let harness = TestHarness::start();
    let project = harness.project("A fox ran.").await;
    harness
        .orchestrator
        .start_generation(
            &project.id,
            StoryboardParams {
                scene_count: 1,
                generate_tts: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    harness.settle().await;

    let done = video_task(&harness, &project.id).await;
    assert_eq!(done.status, TaskStatus::Finished);
    let audio = harness.assembler.assembled()[0].audio.clone().unwrap();
    assert!(audio.ends_with("audio/narration.wav"));
    harness.orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_animation_failure_falls_back_to_still_clips() {
    let harness = TestHarness::builder()
        .animation(FakeAnimation::failing())
        .build();
    let (project, _) = harness.generate("A fox ran. It hid.", 2).await;

    let done = video_task(&harness, &project.id).await;
    assert_eq!(done.status, TaskStatus::Finished);
    assert_eq!(harness.animation.calls(), 2);
    assert_eq!(harness.assembler.still_clips(), 2);
    harness.orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_animation_failure_without_fallback_fails_video() {
    let harness = TestHarness::builder()
        .animation(FakeAnimation::failing())
        .configure(|c| c.assembly.static_fallback = false)
        .build();
    let (project, _) = harness.generate("A fox ran.", 1).await;

    let done = video_task(&harness, &project.id).await;
    assert_eq!(done.status, TaskStatus::Failed);
    assert!(done.error.as_deref().unwrap().contains("animation model not loaded"));
    assert!(harness.assembler.assembled().is_empty());
    harness.orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_assembly_failure_fails_video_with_stderr() {
    let harness = TestHarness::builder()
        .assembler(FakeAssembler::failing())
        .build();
    let (project, _) = harness.generate("A fox ran.", 1).await;

    let done = video_task(&harness, &project.id).await;
    assert_eq!(done.status, TaskStatus::Failed);
    assert!(done.error.as_deref().unwrap().contains("invalid data found"));
    let project = harness.orchestrator.get_project(&project.id).await.unwrap();
    assert!(project.video_url.is_none());
    harness.orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_video_without_images_fails() {
    let harness = TestHarness::builder()
        .image(FakeImage::failing_on("prompt 1"))
        .build();
    let (project, _) = harness.generate("A fox ran.", 1).await;

    let task = harness
        .orchestrator
        .create_task(
            NewTask::for_project(TaskKind::Video, &project.id)
                .with_parameters(json!({ "fps": 24, "clip_seconds": 3.0 })),
        )
        .await
        .unwrap();
    let done = harness
        .orchestrator
        .wait_for_terminal(&task.id, WAIT)
        .await
        .unwrap();
    assert_eq!(done.status, TaskStatus::Failed);
    assert_eq!(done.error.as_deref(), Some("shot 1 has no image"));
    assert_eq!(harness.animation.calls(), 0);
    harness.orchestrator.shutdown().await;
}
