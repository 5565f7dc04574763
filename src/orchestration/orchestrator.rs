//! # Orchestrator
//!
//! Inbound API of the core, wired from configuration.
//!
//! ## Overview
//!
//! The orchestrator owns the stores, the progress hub, the engine and its worker
//! pool, and the optional stuck-task sweeper. Construction is explicit
//! ([`Orchestrator::bootstrap`] or [`OrchestratorBuilder`]) and so is teardown
//! ([`Orchestrator::shutdown`]); nothing lives in globals.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use storyforge_core::models::{NewProject, StoryboardParams};
//! use storyforge_core::orchestration::Orchestrator;
//!
//! # async fn example() -> storyforge_core::Result<()> {
//! let orchestrator = Orchestrator::bootstrap()?;
//! let project = orchestrator
//!     .create_project(NewProject::new("The Fox", "A fox ran. It hid."))
//!     .await?;
//! let task = orchestrator
//!     .start_generation(&project.id, StoryboardParams::default())
//!     .await?;
//! orchestrator.wait_idle().await;
//! println!("{:?}", orchestrator.get_task(&task.id).await?.status);
//! orchestrator.shutdown().await;
//! # Ok(())
//! # }
//! ```

use futures::stream::{BoxStream, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::dependency_resolver::DependencyResolver;
use super::dispatcher::{TaskDispatcher, TaskQueue};
use super::engine::OrchestrationEngine;
use super::stages::{shot_image, StageContext};
use super::sweeper::StuckTaskSweeper;
use crate::assembly::{FfmpegAssembler, MediaAssembler};
use crate::config::{ConfigManager, StoryforgeConfig};
use crate::error::{Result, StoryforgeError};
use crate::events::{ProgressHub, StatusEvent};
use crate::logging::log_task_operation;
use crate::models::{
    merged, NewProject, NewTask, Project, ShotPatch, ShotSnapshot, StoryboardParams, Task,
    TaskFilter, TaskKind, TaskSnapshot, TaskUpdate,
};
use crate::providers::ProviderRegistry;
use crate::state_machine::TaskStatus;
use crate::storage::ArtifactStorage;
use crate::store::{InMemoryProjectStore, InMemoryTaskStore, ProjectStore, TaskStore};

pub struct Orchestrator {
    config: StoryforgeConfig,
    tasks: Arc<dyn TaskStore>,
    projects: Arc<dyn ProjectStore>,
    hub: ProgressHub,
    storage: ArtifactStorage,
    engine: Arc<OrchestrationEngine>,
    resolver: DependencyResolver,
    dispatcher: TaskDispatcher,
    queue: TaskQueue,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    sweeper_shutdown: watch::Sender<bool>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("engine", &self.engine)
            .field("dispatcher", &self.dispatcher)
            .field("sweeper", &self.sweeper.lock().is_some())
            .finish()
    }
}

impl Orchestrator {
    pub fn builder(config: StoryforgeConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    /// Load layered configuration from the environment and wire everything from it
    pub fn bootstrap() -> Result<Self> {
        let manager = ConfigManager::load()?;
        Self::bootstrap_with(&manager)
    }

    pub fn bootstrap_with(manager: &ConfigManager) -> Result<Self> {
        info!(
            environment = %manager.environment(),
            "🔧 Bootstrapping orchestrator"
        );
        Self::builder(manager.config().clone()).build()
    }

    pub fn config(&self) -> &StoryforgeConfig {
        &self.config
    }

    pub fn hub(&self) -> &ProgressHub {
        &self.hub
    }

    pub fn engine(&self) -> &Arc<OrchestrationEngine> {
        &self.engine
    }

    pub fn task_store(&self) -> &Arc<dyn TaskStore> {
        &self.tasks
    }

    pub fn project_store(&self) -> &Arc<dyn ProjectStore> {
        &self.projects
    }

    // ----- projects -----

    #[instrument(skip(self, new_project), fields(title = %new_project.title))]
    pub async fn create_project(&self, new_project: NewProject) -> Result<Project> {
        new_project.validate()?;
        let project = self.projects.create_project(new_project).await?;
        info!(project_id = %project.id, "Project created");
        Ok(project)
    }

    pub async fn get_project(&self, project_id: &str) -> Result<Project> {
        self.projects.get_project(project_id).await
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        self.projects.list_projects().await
    }

    /// Remove a project, its shots and its artifacts; unfinished tasks are cancelled
    #[instrument(skip(self))]
    pub async fn delete_project(&self, project_id: &str) -> Result<()> {
        self.projects.get_project(project_id).await?;

        let tasks = self
            .tasks
            .list_by(&TaskFilter::for_project(project_id))
            .await?;
        for task in tasks.iter().filter(|t| !t.status.is_terminal()) {
            match self
                .tasks
                .update(&task.id, TaskUpdate::cancel("project deleted"))
                .await
            {
                Ok(_) | Err(StoryforgeError::InvalidTransition { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        self.projects.delete_project(project_id).await?;
        self.storage.remove_project(project_id).await?;
        info!(project_id = %project_id, "🗑️ Project deleted");
        Ok(())
    }

    /// Create the root storyboard task of a project
    pub async fn start_generation(&self, project_id: &str, params: StoryboardParams) -> Result<Task> {
        let parameters = serde_json::to_value(&params)?;
        self.create_task(
            NewTask::for_project(TaskKind::Storyboard, project_id).with_parameters(parameters),
        )
        .await
    }

    // ----- tasks -----

    /// Create a task and, when it is born pending, queue it
    #[instrument(skip(self, new_task), fields(kind = %new_task.kind, project_id = ?new_task.project_id))]
    pub async fn create_task(&self, mut new_task: NewTask) -> Result<Task> {
        if let Some(project_id) = &new_task.project_id {
            self.projects.get_project(project_id).await?;
        }
        let defaults = self
            .config
            .generation
            .parameters_for(new_task.kind, &self.config.assembly);
        new_task.parameters = merged(&defaults, &new_task.parameters);

        let mut task = self.tasks.create(new_task).await?;

        if task.status == TaskStatus::Blocked && self.resolver.cancels_dependents() {
            if let Some(dependency_id) = task.depends_on() {
                let dependency = self.tasks.get(dependency_id).await?;
                if matches!(dependency.status, TaskStatus::Failed | TaskStatus::Cancelled) {
                    self.resolver.cancel_dependents(&dependency).await?;
                    task = self.tasks.get(&task.id).await?;
                }
            }
        }

        log_task_operation(
            "create",
            &task.id,
            task.kind.as_str(),
            task.project_id.as_deref(),
            task.status.as_str(),
            task.depends_on(),
        );
        if task.status == TaskStatus::Pending {
            self.queue.submit(task.id.clone());
        }
        Ok(task)
    }

    pub async fn get_task(&self, task_id: &str) -> Result<TaskSnapshot> {
        Ok(self.tasks.get(task_id).await?.snapshot())
    }

    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<TaskSnapshot>> {
        Ok(self
            .tasks
            .list_by(filter)
            .await?
            .iter()
            .map(Task::snapshot)
            .collect())
    }

    /// Cancel a non-terminal task. An in-flight provider call is left to finish
    /// and its result is discarded.
    #[instrument(skip(self, reason))]
    pub async fn cancel_task(&self, task_id: &str, reason: Option<String>) -> Result<TaskSnapshot> {
        let before = self.tasks.get(task_id).await?;
        let cancelled = self
            .tasks
            .update(
                task_id,
                TaskUpdate::cancel(reason.unwrap_or_else(|| "cancelled".to_string())),
            )
            .await?;
        log_task_operation(
            "cancel",
            &cancelled.id,
            cancelled.kind.as_str(),
            cancelled.project_id.as_deref(),
            cancelled.status.as_str(),
            None,
        );

        if cancelled.kind == TaskKind::ShotImage && before.status == TaskStatus::Processing {
            shot_image::mark_shot_failed(self.engine.context(), &cancelled).await;
        }
        self.resolver.cancel_dependents(&cancelled).await?;
        Ok(cancelled.snapshot())
    }

    // ----- shots -----

    pub async fn list_shots(&self, project_id: &str) -> Result<Vec<ShotSnapshot>> {
        Ok(self
            .projects
            .list_shots(project_id)
            .await?
            .iter()
            .map(|s| s.snapshot())
            .collect())
    }

    pub async fn get_shot(&self, shot_id: &str) -> Result<ShotSnapshot> {
        Ok(self.projects.get_shot(shot_id).await?.snapshot())
    }

    /// Client edit of a shot's content; status stays with the pipeline
    pub async fn update_shot(&self, shot_id: &str, patch: ShotPatch) -> Result<ShotSnapshot> {
        if patch.status.is_some() {
            return Err(StoryforgeError::ValidationError(
                "shot status is managed by the pipeline".to_string(),
            ));
        }
        if patch.is_empty() {
            return Err(StoryforgeError::ValidationError(
                "shot update carries no fields".to_string(),
            ));
        }
        Ok(self.projects.update_shot(shot_id, patch).await?.snapshot())
    }

    // ----- progress -----

    /// Current snapshot first, then live events until the terminal one
    pub async fn subscribe(&self, task_id: &str) -> Result<BoxStream<'static, StatusEvent>> {
        let tasks = Arc::clone(&self.tasks);
        let id = task_id.to_string();
        self.hub
            .subscribe(task_id, move || async move {
                tasks.get(&id).await.map(|t| t.snapshot())
            })
            .await
    }

    /// Wait until the task reaches a terminal state
    pub async fn wait_for_terminal(&self, task_id: &str, timeout: Duration) -> Result<TaskSnapshot> {
        let mut stream = self.subscribe(task_id).await?;
        let terminal = async {
            while let Some(event) = stream.next().await {
                if event.is_terminal() {
                    return Some(event.snapshot);
                }
            }
            None
        };

        match tokio::time::timeout(timeout, terminal).await {
            Ok(Some(snapshot)) => Ok(snapshot),
            Ok(None) => {
                let snapshot = self.get_task(task_id).await?;
                if snapshot.status.is_terminal() {
                    Ok(snapshot)
                } else {
                    Err(StoryforgeError::InvalidState(format!(
                        "progress stream for task {task_id} ended before a terminal state"
                    )))
                }
            }
            Err(_) => Err(StoryforgeError::InvalidState(format!(
                "task {task_id} not terminal after {}ms",
                timeout.as_millis()
            ))),
        }
    }

    /// Resolve once no submitted task is queued or running
    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await;
    }

    /// Stop the sweeper and the worker pool
    pub async fn shutdown(&self) {
        let _ = self.sweeper_shutdown.send(true);
        let sweeper = self.sweeper.lock().take();
        if let Some(handle) = sweeper {
            if let Err(e) = handle.await {
                warn!(error = %e, "Sweeper ended abnormally");
            }
        }
        self.dispatcher.shutdown().await;
        info!("🛑 Orchestrator shut down");
    }
}

/// Wires an [`Orchestrator`], with any collaborator replaceable
pub struct OrchestratorBuilder {
    config: StoryforgeConfig,
    providers: Option<ProviderRegistry>,
    assembler: Option<Arc<dyn MediaAssembler>>,
    tasks: Option<Arc<dyn TaskStore>>,
    projects: Option<Arc<dyn ProjectStore>>,
    hub: Option<ProgressHub>,
}

impl OrchestratorBuilder {
    pub fn new(config: StoryforgeConfig) -> Self {
        Self {
            config,
            providers: None,
            assembler: None,
            tasks: None,
            projects: None,
            hub: None,
        }
    }

    pub fn providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = Some(providers);
        self
    }

    pub fn assembler(mut self, assembler: Arc<dyn MediaAssembler>) -> Self {
        self.assembler = Some(assembler);
        self
    }

    /// A custom task store must publish to the hub passed to [`Self::hub`]
    pub fn task_store(mut self, tasks: Arc<dyn TaskStore>) -> Self {
        self.tasks = Some(tasks);
        self
    }

    pub fn project_store(mut self, projects: Arc<dyn ProjectStore>) -> Self {
        self.projects = Some(projects);
        self
    }

    pub fn hub(mut self, hub: ProgressHub) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Validate configuration and start the worker pool. Must run inside a
    /// tokio runtime.
    pub fn build(self) -> Result<Orchestrator> {
        let config = self.config;
        config.validate()?;

        let hub = self
            .hub
            .unwrap_or_else(|| ProgressHub::new(config.events.channel_capacity));
        let tasks = self
            .tasks
            .unwrap_or_else(|| Arc::new(InMemoryTaskStore::new(hub.clone())));
        let projects = self
            .projects
            .unwrap_or_else(|| Arc::new(InMemoryProjectStore::new()));
        let providers = match self.providers {
            Some(providers) => providers,
            None => ProviderRegistry::from_config(&config.providers)?,
        };
        let assembler = self
            .assembler
            .unwrap_or_else(|| Arc::new(FfmpegAssembler::new(&config.assembly.ffmpeg_path)));
        let storage = ArtifactStorage::from_config(&config.storage);

        let ctx = StageContext {
            tasks: Arc::clone(&tasks),
            projects: Arc::clone(&projects),
            providers,
            storage: storage.clone(),
            assembler,
            generation: config.generation.clone(),
            assembly: config.assembly.clone(),
        };
        let resolver = DependencyResolver::new(
            Arc::clone(&tasks),
            config.orchestration.cancel_dependents_on_failure,
        );

        let dispatcher = TaskDispatcher::new(config.orchestration.queue_capacity);
        let queue = dispatcher.queue();
        let engine = Arc::new(OrchestrationEngine::new(
            ctx.clone(),
            resolver.clone(),
            queue.clone(),
        ));
        dispatcher.start(config.orchestration.max_concurrent_tasks, engine.clone());

        let (sweeper_shutdown, sweeper_rx) = watch::channel(false);
        let sweeper = config.orchestration.processing_timeout().map(|timeout| {
            Arc::new(StuckTaskSweeper::new(
                ctx,
                resolver.clone(),
                timeout,
                config.orchestration.sweep_interval(),
            ))
            .spawn(sweeper_rx)
        });
        if sweeper.is_none() {
            debug!("Stuck-task sweeper disabled");
        }

        info!(
            workers = config.orchestration.max_concurrent_tasks,
            queue_capacity = config.orchestration.queue_capacity,
            cancel_dependents_on_failure = config.orchestration.cancel_dependents_on_failure,
            "✅ Orchestrator ready"
        );

        Ok(Orchestrator {
            config,
            tasks,
            projects,
            hub,
            storage,
            engine,
            resolver,
            dispatcher,
            queue,
            sweeper: Mutex::new(sweeper),
            sweeper_shutdown,
        })
    }
}
