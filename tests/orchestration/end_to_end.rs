use storyforge_core::models::{TaskFilter, TaskKind};
use storyforge_core::orchestration::RunOutcome;
use storyforge_core::state_machine::{ProjectStatus, ShotStatus, TaskStatus};

use super::assert_outcome_fields;
use crate::common::*;

#[tokio::test]
async fn test_two_scenes_reach_ready() {
    let harness = TestHarness::start();
    let (project, storyboard) = harness.generate("A", 2).await;
    let orchestrator = &harness.orchestrator;

    assert_eq!(storyboard.status, TaskStatus::Finished);
    let result = storyboard.result.as_ref().unwrap().as_storyboard().unwrap();
    assert_eq!(result.shots.len(), 2);
    assert_eq!(result.dependent_task_ids.len(), 2);

    let shots = orchestrator.list_shots(&project.id).await.unwrap();
    assert_eq!(shots.iter().map(|s| s.order).collect::<Vec<_>>(), vec![1, 2]);
    assert!(shots.iter().all(|s| s.status == ShotStatus::Completed));
    for shot in &shots {
        let path = shot.image_path.as_deref().unwrap();
        assert!(std::path::Path::new(path).exists(), "missing image {path}");
        assert_eq!(shot.narration, format!("narration {}", shot.order));
    }

    let image_tasks = orchestrator
        .list_tasks(&TaskFilter::for_project(&project.id).with_kind(TaskKind::ShotImage))
        .await
        .unwrap();
    assert_eq!(image_tasks.len(), 2);
    assert!(image_tasks.iter().all(|t| t.status == TaskStatus::Finished));

    let project = orchestrator.get_project(&project.id).await.unwrap();
    assert_eq!(project.status, ProjectStatus::Ready);
    assert_eq!(project.shot_count, 2);
    assert_eq!(
        project.cover_image.as_deref(),
        Some(format!("/files/{}/images/shot_001.png", project.id).as_str())
    );

    assert_outcome_fields(orchestrator, &project.id).await;
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_storyboard_failure_creates_nothing() {
    let harness = TestHarness::builder()
        .storyboard(FakeStoryboard::failing("llm offline"))
        .build();
    let (project, storyboard) = harness.generate("A fox ran. It hid.", 3).await;
    let orchestrator = &harness.orchestrator;

    assert_eq!(storyboard.status, TaskStatus::Failed);
    assert_eq!(storyboard.error.as_deref(), Some("llm offline"));
    assert!(storyboard.result.is_none());

    assert!(orchestrator.list_shots(&project.id).await.unwrap().is_empty());
    let tasks = orchestrator
        .list_tasks(&TaskFilter::for_project(&project.id))
        .await
        .unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(
        orchestrator.get_project(&project.id).await.unwrap().status,
        ProjectStatus::Created
    );

    assert_outcome_fields(orchestrator, &project.id).await;
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_shot_tasks_carry_generated_prompts_in_order() {
    let harness = TestHarness::builder()
        .configure(|c| c.orchestration.max_concurrent_tasks = 1)
        .build();
    let (project, _) = harness.generate("A fox ran. It hid. It slept.", 3).await;
    let orchestrator = &harness.orchestrator;

    let tasks = orchestrator
        .list_tasks(&TaskFilter::for_project(&project.id).with_kind(TaskKind::ShotImage))
        .await
        .unwrap();
    assert_eq!(tasks.len(), 3);
    for (i, task) in tasks.iter().enumerate() {
        let params = task.parameters.as_shot_image().unwrap();
        let order = i as u32 + 1;
        assert_eq!(params.shot_order, Some(order));
        assert_eq!(
            params.prompt.as_deref(),
            Some(format!("prompt {order}, watercolor").as_str())
        );
        assert!(task.shot_id.is_some());
    }

    // One worker: released tasks run in shot order
    let prompts: Vec<String> = harness.image.requests().into_iter().map(|r| r.prompt).collect();
    assert_eq!(
        prompts,
        vec![
            "prompt 1, watercolor",
            "prompt 2, watercolor",
            "prompt 3, watercolor"
        ]
    );
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_failed_shot_keeps_project_from_ready() {
    let harness = TestHarness::builder()
        .image(FakeImage::failing_on("prompt 2"))
        .build();
    let (project, storyboard) = harness.generate("A fox ran. It hid. It slept.", 3).await;
    let orchestrator = &harness.orchestrator;
    assert_eq!(storyboard.status, TaskStatus::Finished);

    let shots = orchestrator.list_shots(&project.id).await.unwrap();
    let statuses: Vec<ShotStatus> = shots.iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        vec![ShotStatus::Completed, ShotStatus::Failed, ShotStatus::Completed]
    );

    let failed = orchestrator
        .list_tasks(
            &TaskFilter::for_project(&project.id)
                .with_kind(TaskKind::ShotImage)
                .with_status(TaskStatus::Failed),
        )
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].error.as_deref().unwrap().contains("prompt 2"));

    let project = orchestrator.get_project(&project.id).await.unwrap();
    assert_eq!(project.status, ProjectStatus::TextGenerated);

    assert_outcome_fields(orchestrator, &project.id).await;
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_run_past_pending_is_a_no_op() {
    let harness = TestHarness::start();
    let (project, storyboard) = harness.generate("A", 1).await;
    let orchestrator = &harness.orchestrator;
    let before = orchestrator.get_task(&storyboard.id).await.unwrap();

    let outcome = orchestrator.engine().run(&storyboard.id).await.unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Skipped {
            status: TaskStatus::Finished
        }
    );
    assert_eq!(harness.storyboard.calls(), 1);
    assert_eq!(orchestrator.get_task(&storyboard.id).await.unwrap(), before);
    assert_eq!(orchestrator.list_shots(&project.id).await.unwrap().len(), 1);
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_scene_count_is_normalized() {
    // Backend returns one scene with an empty title for a three-scene request
    let harness = TestHarness::builder()
        .storyboard(FakeStoryboard::with_scenes(vec![storyforge_core::providers::SceneDraft {
            title: String::new(),
            prompt: "a red fox".to_string(),
            narration: "A fox ran.".to_string(),
            bgm: None,
        }]))
        .build();
    let (project, storyboard) = harness.generate("A fox ran. It hid. It slept.", 3).await;
    assert_eq!(storyboard.status, TaskStatus::Finished);

    let shots = harness.orchestrator.list_shots(&project.id).await.unwrap();
    assert_eq!(shots.len(), 3);
    assert_eq!(shots[0].title, "Scene 1");
    assert_eq!(shots[1].narration, "It hid");
    assert_eq!(shots[2].narration, "It slept");
    harness.orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_storyboard_request_uses_project_story_and_style() {
    let harness = TestHarness::start();
    harness.generate("Once upon a time.", 2).await;

    let request = harness.storyboard.last_request().unwrap();
    assert_eq!(request.story, "Once upon a time.");
    assert_eq!(request.style.as_deref(), Some("watercolor"));
    assert_eq!(request.scene_count, 2);
    harness.orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_progress_stream_is_monotonic() {
    let harness = TestHarness::builder()
        .storyboard(FakeStoryboard::delayed(std::time::Duration::from_millis(100)))
        .build();
    let project = harness.project("A fox ran.").await;
    let task = harness
        .orchestrator
        .start_generation(&project.id, Default::default())
        .await
        .unwrap();

    use futures::StreamExt;
    let events: Vec<_> = harness
        .orchestrator
        .subscribe(&task.id)
        .await
        .unwrap()
        .collect()
        .await;

    let last = events.last().unwrap();
    assert_eq!(last.status(), TaskStatus::Finished);
    assert_eq!(last.snapshot.progress, 100);
    let progress: Vec<u8> = events
        .iter()
        .filter(|e| e.status() == TaskStatus::Processing)
        .map(|e| e.snapshot.progress)
        .collect();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{progress:?}");

    harness.settle().await;
    harness.orchestrator.shutdown().await;
}
