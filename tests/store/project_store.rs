use serde_json::json;
use std::sync::Arc;

use storyforge_core::models::{NewProject, NewShot, ProjectPatch, ShotPatch};
use storyforge_core::state_machine::{ProjectStatus, ShotStatus};
use storyforge_core::store::{InMemoryProjectStore, ProjectStore};
use storyforge_core::StoryforgeError;

fn new_shot(i: u32) -> NewShot {
    NewShot {
        title: format!("Scene {i}"),
        narration: format!("narration {i}"),
        prompt: format!("prompt {i}"),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_image_patch_keeps_narration() {
    let store = InMemoryProjectStore::new();
    let project = store
        .create_project(NewProject::new("Fox", "A fox ran."))
        .await
        .unwrap();
    let shots = store
        .create_shots(&project.id, (1..=2).map(new_shot).collect())
        .await
        .unwrap();

    let patched = store
        .update_shot(
            &shots[0].id,
            ShotPatch {
                image_path: Some("data/p/images/shot_001.png".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(patched.image_path.as_deref(), Some("data/p/images/shot_001.png"));
    assert_eq!(patched.narration, "narration 1");
    assert_eq!(patched.prompt, "prompt 1");
}

#[tokio::test]
async fn test_concurrent_shot_patches_do_not_clobber() {
    let store = Arc::new(InMemoryProjectStore::new());
    let project = store
        .create_project(NewProject::new("Fox", "A fox ran."))
        .await
        .unwrap();
    let shots = store
        .create_shots(&project.id, vec![new_shot(1)])
        .await
        .unwrap();
    let shot_id = shots[0].id.clone();

    let image = {
        let store = Arc::clone(&store);
        let id = shot_id.clone();
        tokio::spawn(async move {
            store
                .update_shot(
                    &id,
                    ShotPatch {
                        image_path: Some("image.png".to_string()),
                        status: Some(ShotStatus::Completed),
                        ..Default::default()
                    },
                )
                .await
        })
    };
    let audio = {
        let store = Arc::clone(&store);
        let id = shot_id.clone();
        tokio::spawn(async move {
            store
                .update_shot(
                    &id,
                    ShotPatch {
                        audio_path: Some("audio.wav".to_string()),
                        ..Default::default()
                    },
                )
                .await
        })
    };
    image.await.unwrap().unwrap();
    audio.await.unwrap().unwrap();

    let shot = store.get_shot(&shot_id).await.unwrap();
    assert_eq!(shot.image_path.as_deref(), Some("image.png"));
    assert_eq!(shot.audio_path.as_deref(), Some("audio.wav"));
    assert_eq!(shot.status, ShotStatus::Completed);
}

#[tokio::test]
async fn test_metadata_deep_merges() {
    let store = InMemoryProjectStore::new();
    let mut new_project = NewProject::new("Fox", "A fox ran.");
    new_project.metadata = json!({ "render": { "fps": 12, "codec": "h264" } })
        .as_object()
        .cloned()
        .unwrap();
    let project = store.create_project(new_project).await.unwrap();

    let patch = ProjectPatch {
        metadata: json!({ "render": { "fps": 24 }, "source": "upload" })
            .as_object()
            .cloned(),
        ..Default::default()
    };
    let updated = store.update_project(&project.id, patch).await.unwrap();

    assert_eq!(
        serde_json::Value::Object(updated.metadata),
        json!({ "render": { "fps": 24, "codec": "h264" }, "source": "upload" })
    );
}

#[tokio::test]
async fn test_ready_project_ignores_regression() {
    let store = InMemoryProjectStore::new();
    let project = store
        .create_project(NewProject::new("Fox", "A fox ran."))
        .await
        .unwrap();
    store
        .update_project(&project.id, ProjectPatch::status(ProjectStatus::Ready))
        .await
        .unwrap();
    let after = store
        .update_project(&project.id, ProjectPatch::status(ProjectStatus::TextGenerated))
        .await
        .unwrap();
    assert_eq!(after.status, ProjectStatus::Ready);
}

#[tokio::test]
async fn test_shot_lookups() {
    let store = InMemoryProjectStore::new();
    let project = store
        .create_project(NewProject::new("Fox", "A fox ran."))
        .await
        .unwrap();
    let shots = store
        .create_shots(&project.id, (1..=3).map(new_shot).collect())
        .await
        .unwrap();

    let second = store.shot_by_order(&project.id, 2).await.unwrap();
    assert_eq!(second.id, shots[1].id);
    assert!(matches!(
        store.shot_by_order(&project.id, 4).await,
        Err(StoryforgeError::NotFound { entity: "shot", .. })
    ));
    assert!(matches!(
        store.list_shots("missing").await,
        Err(StoryforgeError::NotFound { entity: "project", .. })
    ));
}
