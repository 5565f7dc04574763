use chrono::Duration as ChronoDuration;
use futures::StreamExt;

use storyforge_core::events::{ProgressHub, StatusEvent};
use storyforge_core::models::{NewTask, Task, TaskKind, TaskParameters, TaskSnapshot};
use storyforge_core::state_machine::TaskStatus;

fn base_task() -> Task {
    let mut task = Task::from_new(
        NewTask::for_project(TaskKind::ShotImage, "p1"),
        TaskParameters::defaults(TaskKind::ShotImage),
        TaskStatus::Pending,
    );
    task.id = "task-1".to_string();
    task
}

/// Snapshot `step` milliseconds after the base task's last update
fn at(task: &Task, step: i64, status: TaskStatus, progress: u8) -> TaskSnapshot {
    let mut next = task.clone();
    next.status = status;
    next.progress = progress;
    next.updated_at = task.updated_at + ChronoDuration::milliseconds(step);
    next.snapshot()
}

#[tokio::test]
async fn test_every_subscriber_sees_terminal_event() {
    let hub = ProgressHub::new(8);
    let task = base_task();
    let current = task.snapshot();

    let first = hub
        .subscribe(&task.id, || {
            let current = current.clone();
            async move { Ok(current) }
        })
        .await
        .unwrap();
    let second = hub
        .subscribe(&task.id, || {
            let current = current.clone();
            async move { Ok(current) }
        })
        .await
        .unwrap();
    assert_eq!(hub.subscriber_count(&task.id), 2);

    hub.publish(StatusEvent::new(at(&task, 1, TaskStatus::Processing, 0)));
    hub.publish(StatusEvent::new(at(&task, 2, TaskStatus::Finished, 100)));

    for stream in [first, second] {
        let statuses: Vec<TaskStatus> = stream.map(|e| e.status()).collect().await;
        assert_eq!(
            statuses,
            vec![TaskStatus::Pending, TaskStatus::Processing, TaskStatus::Finished]
        );
    }
    assert_eq!(hub.channel_count(), 0);
}

#[tokio::test]
async fn test_lagging_subscriber_skips_to_terminal() {
    let hub = ProgressHub::new(2);
    let task = base_task();
    let current = task.snapshot();
    let stream = hub
        .subscribe(&task.id, move || async move { Ok(current) })
        .await
        .unwrap();

    hub.publish(StatusEvent::new(at(&task, 1, TaskStatus::Processing, 0)));
    for (step, progress) in (2..20).zip((5u8..).step_by(5)) {
        hub.publish(StatusEvent::new(at(&task, step, TaskStatus::Processing, progress)));
    }
    hub.publish(StatusEvent::new(at(&task, 30, TaskStatus::Failed, 90)));

    let events: Vec<StatusEvent> = stream.collect().await;
    assert_eq!(events.first().unwrap().status(), TaskStatus::Pending);
    assert_eq!(events.last().unwrap().status(), TaskStatus::Failed);
    assert!(events.len() <= 4, "lagged stream replayed {} events", events.len());
}

#[tokio::test]
async fn test_dropped_subscriber_does_not_block_publish() {
    let hub = ProgressHub::new(1);
    let task = base_task();
    let current = task.snapshot();
    let stream = hub
        .subscribe(&task.id, move || async move { Ok(current) })
        .await
        .unwrap();
    drop(stream);

    for step in 1..10 {
        hub.publish(StatusEvent::new(at(&task, step, TaskStatus::Processing, step as u8)));
    }
    hub.publish(StatusEvent::new(at(&task, 20, TaskStatus::Cancelled, 9)));
    assert_eq!(hub.channel_count(), 0);
}

#[tokio::test]
async fn test_failed_load_releases_channel() {
    let hub = ProgressHub::new(4);
    let result = hub
        .subscribe("ghost", || async {
            Err(storyforge_core::StoryforgeError::task_not_found("ghost"))
        })
        .await;
    assert!(result.is_err());
    assert_eq!(hub.channel_count(), 0);
}

#[tokio::test]
async fn test_stale_events_before_snapshot_are_skipped() {
    let hub = ProgressHub::new(8);
    let task = base_task();
    let processing = at(&task, 5, TaskStatus::Processing, 40);

    let subscription = hub.register(&task.id);
    // Published after registering but already reflected in the loaded snapshot
    hub.publish(StatusEvent::new(at(&task, 3, TaskStatus::Processing, 20)));
    hub.publish(StatusEvent::new(processing.clone()));
    hub.publish(StatusEvent::new(at(&task, 9, TaskStatus::Finished, 100)));

    let progress: Vec<u8> = subscription
        .into_stream(processing)
        .map(|e| e.snapshot.progress)
        .collect()
        .await;
    assert_eq!(progress, vec![40, 100]);
}

#[tokio::test]
async fn test_abandoned_stream_releases_channel_of_unfinished_task() {
    let hub = ProgressHub::new(8);
    let task = base_task();
    let current = at(&task, 1, TaskStatus::Processing, 10);

    let mut stream = hub
        .subscribe(&task.id, || async move { Ok(current) })
        .await
        .unwrap();
    assert_eq!(stream.next().await.unwrap().status(), TaskStatus::Processing);
    hub.publish(StatusEvent::new(at(&task, 2, TaskStatus::Processing, 20)));
    assert_eq!(stream.next().await.unwrap().snapshot.progress, 20);
    assert_eq!(hub.channel_count(), 1);

    // The client goes away while the task is still running
    drop(stream);
    assert_eq!(hub.channel_count(), 0);
    assert_eq!(hub.subscriber_count(&task.id), 0);

    // Later events for the task are dropped without recreating the channel
    hub.publish(StatusEvent::new(at(&task, 3, TaskStatus::Processing, 30)));
    assert_eq!(hub.channel_count(), 0);
}
