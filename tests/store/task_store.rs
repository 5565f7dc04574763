use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;

use storyforge_core::events::ProgressHub;
use storyforge_core::models::{
    NewTask, Resource, StoryboardResult, TaskFilter, TaskKind, TaskResult, TaskUpdate,
};
use storyforge_core::state_machine::TaskStatus;
use storyforge_core::store::{InMemoryTaskStore, TaskStore};
use storyforge_core::StoryforgeError;

fn store() -> (Arc<InMemoryTaskStore>, ProgressHub) {
    let hub = ProgressHub::new(16);
    (Arc::new(InMemoryTaskStore::new(hub.clone())), hub)
}

#[tokio::test]
async fn test_concurrent_claims_admit_one_winner() {
    let (store, _hub) = store();
    let task = store
        .create(NewTask::for_project(TaskKind::Storyboard, "p1"))
        .await
        .unwrap();

    let claims = (0..8).map(|_| {
        let store = Arc::clone(&store);
        let id = task.id.clone();
        tokio::spawn(async move { store.update(&id, TaskUpdate::claim()).await })
    });
    let results = futures::future::join_all(claims).await;

    let winners = results
        .into_iter()
        .map(|r| r.unwrap())
        .filter(|r| r.is_ok())
        .count();
    assert_eq!(winners, 1);
    assert_eq!(store.get(&task.id).await.unwrap().status, TaskStatus::Processing);
}

#[tokio::test]
async fn test_parameters_normalized_with_extras_preserved() {
    let (store, _hub) = store();
    let task = store
        .create(
            NewTask::for_project(TaskKind::ShotImage, "p1")
                .with_parameters(json!({ "prompt": "a fox", "seed": 42 })),
        )
        .await
        .unwrap();

    let params = task.parameters.as_shot_image().unwrap();
    assert_eq!(params.prompt.as_deref(), Some("a fox"));
    assert_eq!(params.width, 384);
    assert_eq!(params.extra.get("seed"), Some(&json!(42)));
}

#[tokio::test]
async fn test_out_of_range_parameters_rejected() {
    let (store, _hub) = store();
    let err = store
        .create(
            NewTask::for_project(TaskKind::Storyboard, "p1")
                .with_parameters(json!({ "scene_count": 0 })),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoryforgeError::ValidationError(_)));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_task_without_project_rejected() {
    let (store, _hub) = store();
    let err = store.create(NewTask::new(TaskKind::Audio)).await.unwrap_err();
    assert!(matches!(err, StoryforgeError::ValidationError(_)));
}

fn storyboard_result() -> TaskResult {
    TaskResult::Storyboard(StoryboardResult {
        resource: Resource::new("storyboard", "p1", ""),
        shots: Vec::new(),
        dependent_task_ids: Vec::new(),
        created_task_ids: Vec::new(),
    })
}

#[tokio::test]
async fn test_dependency_on_finished_task_is_born_pending() {
    let (store, _hub) = store();
    let parent = store
        .create(NewTask::for_project(TaskKind::Storyboard, "p1"))
        .await
        .unwrap();
    store.update(&parent.id, TaskUpdate::claim()).await.unwrap();
    store
        .update(&parent.id, TaskUpdate::finish(storyboard_result()))
        .await
        .unwrap();

    let child = store
        .create(
            NewTask::for_project(TaskKind::Audio, "p1")
                .with_parameters(json!({ "depends_on": parent.id })),
        )
        .await
        .unwrap();
    assert_eq!(child.status, TaskStatus::Pending);
}

/// Children created while their dependency finishes must not stay blocked. The
/// finisher releases what it can see, like the engine's fan-out; children
/// inserted after that scan are released by `create` itself.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dependents_created_during_finish_are_released() {
    for _ in 0..20 {
        let (store, _hub) = store();
        let parent = store
            .create(NewTask::for_project(TaskKind::Storyboard, "p1"))
            .await
            .unwrap();
        store.update(&parent.id, TaskUpdate::claim()).await.unwrap();

        let creators: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                let parent_id = parent.id.clone();
                tokio::spawn(async move {
                    store
                        .create(
                            NewTask::for_project(TaskKind::Audio, "p1")
                                .with_parameters(json!({ "depends_on": parent_id })),
                        )
                        .await
                })
            })
            .collect();
        let finisher = {
            let store = Arc::clone(&store);
            let parent_id = parent.id.clone();
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                store
                    .update(&parent_id, TaskUpdate::finish(storyboard_result()))
                    .await?;
                let blocked = store
                    .list_by(&TaskFilter::dependents_of(&parent_id).with_status(TaskStatus::Blocked))
                    .await?;
                for child in blocked {
                    match store.update(&child.id, TaskUpdate::release(None, None)).await {
                        Ok(_) | Err(StoryforgeError::InvalidTransition { .. }) => {}
                        Err(e) => return Err(e),
                    }
                }
                Ok::<_, StoryforgeError>(())
            })
        };

        for creator in creators {
            creator.await.unwrap().unwrap();
        }
        finisher.await.unwrap().unwrap();

        let stuck = store
            .list_by(&TaskFilter::dependents_of(&parent.id).with_status(TaskStatus::Blocked))
            .await
            .unwrap();
        assert!(stuck.is_empty(), "{} dependents left blocked", stuck.len());
    }
}

#[tokio::test]
async fn test_dependency_on_failed_task_stays_blocked() {
    let (store, _hub) = store();
    let parent = store
        .create(NewTask::for_project(TaskKind::Storyboard, "p1"))
        .await
        .unwrap();
    store.update(&parent.id, TaskUpdate::claim()).await.unwrap();
    store
        .update(&parent.id, TaskUpdate::fail("boom"))
        .await
        .unwrap();

    // A failed dependency never satisfies; the child waits
    let child = store
        .create(
            NewTask::for_project(TaskKind::Audio, "p1")
                .with_parameters(json!({ "depends_on": parent.id })),
        )
        .await
        .unwrap();
    assert_eq!(child.status, TaskStatus::Blocked);
}

#[tokio::test]
async fn test_filters_combine() {
    let (store, _hub) = store();
    let parent = store
        .create(NewTask::for_project(TaskKind::Storyboard, "p1"))
        .await
        .unwrap();
    for order in 1..=3 {
        store
            .create(
                NewTask::for_project(TaskKind::ShotImage, "p1")
                    .with_parameters(json!({ "depends_on": parent.id, "shot_order": order })),
            )
            .await
            .unwrap();
    }
    store
        .create(NewTask::for_project(TaskKind::Audio, "p2"))
        .await
        .unwrap();

    let blocked = store
        .list_by(&TaskFilter::dependents_of(&parent.id).with_status(TaskStatus::Blocked))
        .await
        .unwrap();
    assert_eq!(
        blocked.iter().map(|t| t.shot_order()).collect::<Vec<_>>(),
        vec![Some(1), Some(2), Some(3)]
    );

    let p1_images = store
        .list_by(&TaskFilter::for_project("p1").with_kind(TaskKind::ShotImage))
        .await
        .unwrap();
    assert_eq!(p1_images.len(), 3);

    let p2 = store.list_by(&TaskFilter::for_project("p2")).await.unwrap();
    assert_eq!(p2.len(), 1);
    assert_eq!(p2[0].kind, TaskKind::Audio);
}

#[tokio::test]
async fn test_updates_publish_in_order() {
    let (store, hub) = store();
    let task = store
        .create(NewTask::for_project(TaskKind::Video, "p1"))
        .await
        .unwrap();

    let loader_store = Arc::clone(&store);
    let id = task.id.clone();
    let stream = hub
        .subscribe(&task.id, move || async move {
            loader_store.get(&id).await.map(|t| t.snapshot())
        })
        .await
        .unwrap();

    store.update(&task.id, TaskUpdate::claim()).await.unwrap();
    store
        .update(&task.id, TaskUpdate::progress(40, "clips"))
        .await
        .unwrap();
    // Message-only updates are not observable
    store
        .update(
            &task.id,
            TaskUpdate {
                message: Some("still going".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    store
        .update(&task.id, TaskUpdate::fail("ffmpeg exited 1"))
        .await
        .unwrap();

    let seen: Vec<(TaskStatus, u8)> = stream
        .map(|event| (event.status(), event.snapshot.progress))
        .collect()
        .await;
    assert_eq!(
        seen,
        vec![
            (TaskStatus::Pending, 0),
            (TaskStatus::Processing, 0),
            (TaskStatus::Processing, 40),
            (TaskStatus::Failed, 40),
        ]
    );
}
