//! # Task Dispatcher
//!
//! Bounded work queue plus a fixed pool of workers executing `run(task_id)`.
//!
//! ## Overview
//!
//! [`TaskQueue`] is the cheap, cloneable submission side. It is handed to the
//! engine so a finishing task can enqueue its dependents. Submission never
//! blocks: when the queue is full, ids wait in a FIFO overflow buffer that a
//! single drain task feeds into the queue. Submission order is kept either way.
//!
//! [`TaskDispatcher`] owns the receiving side and the workers. Workers share one
//! receiver, so at most `max_concurrent_tasks` runs are in flight at once.
//!
//! The queue counts outstanding submissions (queued or running) so callers can
//! wait until the pipeline drains.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::models::TaskId;

/// Whatever executes a submitted task
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run_task(&self, task_id: &str);
}

/// Submission handle for the work queue
#[derive(Debug, Clone)]
pub struct TaskQueue {
    sender: mpsc::Sender<TaskId>,
    overflow: Arc<Mutex<Overflow>>,
    outstanding: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

/// Submissions that found the queue full, oldest first
#[derive(Debug, Default)]
struct Overflow {
    pending: VecDeque<TaskId>,
    draining: bool,
}

impl TaskQueue {
    /// Enqueue a task id without waiting for queue capacity
    pub fn submit(&self, task_id: TaskId) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        let mut overflow = self.overflow.lock();
        if !overflow.pending.is_empty() {
            overflow.pending.push_back(task_id);
            return;
        }
        match self.sender.try_send(task_id) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(task_id)) => {
                debug!(task_id = %task_id, "Work queue full, deferring submission");
                overflow.pending.push_back(task_id);
                if !overflow.draining {
                    overflow.draining = true;
                    tokio::spawn(self.clone().drain_overflow());
                }
            }
            Err(mpsc::error::TrySendError::Closed(task_id)) => {
                drop(overflow);
                warn!(task_id = %task_id, "Work queue closed, submission dropped");
                self.complete();
            }
        }
    }

    /// Feed overflowed ids into the queue in submission order.
    ///
    /// The head stays in the buffer until its send completes, so a concurrent
    /// `submit` cannot overtake it through `try_send`.
    async fn drain_overflow(self) {
        loop {
            let next = {
                let mut overflow = self.overflow.lock();
                match overflow.pending.front() {
                    Some(task_id) => task_id.clone(),
                    None => {
                        overflow.draining = false;
                        return;
                    }
                }
            };
            let sent = self.sender.send(next).await;
            self.overflow.lock().pending.pop_front();
            if let Err(mpsc::error::SendError(task_id)) = sent {
                warn!(task_id = %task_id, "Work queue closed, submission dropped");
                self.complete();
            }
        }
    }

    /// Submissions queued or running
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Resolve once nothing is queued or running
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn complete(&self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

pub struct TaskDispatcher {
    queue: TaskQueue,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<TaskId>>>,
    shutdown: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for TaskDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDispatcher")
            .field("outstanding", &self.queue.outstanding())
            .field("workers", &self.workers.lock().len())
            .finish()
    }
}

impl TaskDispatcher {
    pub fn new(queue_capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let (shutdown, _) = watch::channel(false);
        Self {
            queue: TaskQueue {
                sender,
                overflow: Arc::new(Mutex::new(Overflow::default())),
                outstanding: Arc::new(AtomicUsize::new(0)),
                idle: Arc::new(Notify::new()),
            },
            receiver: Arc::new(tokio::sync::Mutex::new(receiver)),
            shutdown,
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn queue(&self) -> TaskQueue {
        self.queue.clone()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }

    /// Spawn `workers` workers driving `runner`
    pub fn start(&self, workers: usize, runner: Arc<dyn TaskRunner>) {
        let mut handles = self.workers.lock();
        for worker_id in 0..workers.max(1) {
            let receiver = Arc::clone(&self.receiver);
            let runner = Arc::clone(&runner);
            let queue = self.queue.clone();
            let mut shutdown = self.shutdown.subscribe();

            handles.push(tokio::spawn(async move {
                loop {
                    let next = {
                        let mut receiver = receiver.lock().await;
                        tokio::select! {
                            biased;
                            _ = shutdown.changed() => None,
                            task_id = receiver.recv() => task_id,
                        }
                    };
                    let Some(task_id) = next else {
                        break;
                    };
                    runner.run_task(&task_id).await;
                    queue.complete();
                }
                debug!(worker_id, "Dispatcher worker stopped");
            }));
        }
        info!(workers = handles.len(), "🚀 Task dispatcher started");
    }

    /// Stop accepting work and wait for in-flight runs to finish
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Dispatcher worker ended abnormally");
            }
        }
        let abandoned = self.queue.outstanding();
        if abandoned > 0 {
            warn!(abandoned, "Dispatcher stopped with queued tasks");
        }
        info!("🛑 Task dispatcher stopped");
    }
}
