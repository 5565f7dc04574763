//! # Progress Hub
//!
//! Per-task broadcast of status snapshots.
//!
//! ## Overview
//!
//! The task store publishes a [`StatusEvent`] for every update that changes a
//! task's status or progress. Each task gets its own bounded `tokio::sync::broadcast`
//! channel, created lazily on subscribe and released once the terminal event has
//! gone out or the last subscriber has gone away.
//!
//! A subscription always starts with the task's current snapshot, so a client that
//! reconnects never misses where the task is now. After that it streams published
//! events until the terminal one. Slow subscribers lose the oldest buffered events
//! (`RecvError::Lagged`) and skip ahead; the terminal event is the last thing ever
//! sent on a channel, so it is always delivered.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::error::Result;
use crate::models::TaskSnapshot;
use crate::state_machine::TaskStatus;

/// A task snapshot as seen by subscribers
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvent {
    pub snapshot: TaskSnapshot,
    pub published_at: DateTime<Utc>,
}

impl StatusEvent {
    pub fn new(snapshot: TaskSnapshot) -> Self {
        Self {
            snapshot,
            published_at: Utc::now(),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.snapshot.id
    }

    pub fn status(&self) -> TaskStatus {
        self.snapshot.status
    }

    pub fn is_terminal(&self) -> bool {
        self.snapshot.status.is_terminal()
    }
}

/// Per-task broadcast registry
#[derive(Debug, Clone)]
pub struct ProgressHub {
    channels: Arc<DashMap<String, broadcast::Sender<StatusEvent>>>,
    capacity: usize,
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new(64)
    }
}

/// A registered receiver that has not yet been turned into a stream.
///
/// Dropping it, or the stream made from it, releases the task's channel once no
/// other receiver is left, so abandoned subscriptions to tasks that never
/// terminate do not pin a channel.
#[derive(Debug)]
pub struct Subscription {
    task_id: String,
    receiver: Option<broadcast::Receiver<StatusEvent>>,
    hub: ProgressHub,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        drop(self.receiver.take());
        self.hub.release_if_idle(&self.task_id);
    }
}

impl ProgressHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Publish an event; never blocks, succeeds with zero subscribers
    pub fn publish(&self, event: StatusEvent) {
        let task_id = event.task_id().to_string();
        let terminal = event.is_terminal();

        if terminal {
            // Send and release in one step so no receiver registers after the final event
            if let Some((_, sender)) = self.channels.remove(&task_id) {
                let delivered = sender.send(event).unwrap_or(0);
                trace!(task_id = %task_id, delivered, "Published terminal status event");
            }
            return;
        }

        if let Some(sender) = self.channels.get(&task_id) {
            let delivered = sender.send(event).unwrap_or(0);
            trace!(task_id = %task_id, delivered, "Published status event");
        }
    }

    /// Register a receiver for `task_id`. Events published from now on are buffered.
    pub fn register(&self, task_id: &str) -> Subscription {
        let capacity = self.capacity;
        let receiver = self
            .channels
            .entry(task_id.to_string())
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe();
        Subscription {
            task_id: task_id.to_string(),
            receiver: Some(receiver),
            hub: self.clone(),
        }
    }

    /// Subscribe to a task, loading its current snapshot after registering
    pub async fn subscribe<F, Fut>(&self, task_id: &str, load: F) -> Result<BoxStream<'static, StatusEvent>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TaskSnapshot>>,
    {
        let subscription = self.register(task_id);
        match load().await {
            Ok(snapshot) => Ok(subscription.into_stream(snapshot)),
            Err(e) => {
                drop(subscription);
                Err(e)
            }
        }
    }

    /// Number of live per-task channels
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn subscriber_count(&self, task_id: &str) -> usize {
        self.channels
            .get(task_id)
            .map_or(0, |sender| sender.receiver_count())
    }

    fn release_if_idle(&self, task_id: &str) {
        if self
            .channels
            .remove_if(task_id, |_, sender| sender.receiver_count() == 0)
            .is_some()
        {
            debug!(task_id = %task_id, "Released idle progress channel");
        }
    }
}

enum StreamState {
    Initial(Subscription, TaskSnapshot),
    Streaming(Subscription, DateTime<Utc>),
    Done,
}

impl Subscription {
    async fn recv(&mut self) -> std::result::Result<StatusEvent, broadcast::error::RecvError> {
        match self.receiver.as_mut() {
            Some(receiver) => receiver.recv().await,
            None => Err(broadcast::error::RecvError::Closed),
        }
    }

    /// Yield `current` first, then live events until the terminal one
    pub fn into_stream(self, current: TaskSnapshot) -> BoxStream<'static, StatusEvent> {
        stream::unfold(StreamState::Initial(self, current), |state| async move {
            match state {
                StreamState::Initial(subscription, snapshot) => {
                    let since = snapshot.updated_at;
                    let event = StatusEvent::new(snapshot);
                    if event.is_terminal() {
                        drop(subscription);
                        Some((event, StreamState::Done))
                    } else {
                        Some((event, StreamState::Streaming(subscription, since)))
                    }
                }
                StreamState::Streaming(mut subscription, since) => loop {
                    match subscription.recv().await {
                        // Already covered by the initial snapshot
                        Ok(event) if event.snapshot.updated_at <= since => continue,
                        Ok(event) => {
                            let since = event.snapshot.updated_at;
                            if event.is_terminal() {
                                break Some((event, StreamState::Done));
                            }
                            break Some((event, StreamState::Streaming(subscription, since)));
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(
                                task_id = %subscription.task_id,
                                skipped,
                                "Progress subscriber lagged, skipping ahead"
                            );
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break None,
                    }
                },
                StreamState::Done => None,
            }
        })
        .boxed()
    }
}
