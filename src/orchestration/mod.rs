//! # Orchestration Engine
//!
//! Task execution, dependency resolution, and the inbound API.
//!
//! ## Architecture
//!
//! - **OrchestrationEngine**: claims a task, runs the stage for its kind, finalizes it
//!   and fans out to its dependents
//! - **DependencyResolver**: finds blocked dependents and releases (or cancels) them
//! - **TaskDispatcher**: bounded work queue with a fixed worker pool
//! - **StuckTaskSweeper**: optional timeout for tasks stuck in `processing`
//! - **Orchestrator**: the facade clients talk to
//!
//! ## Control Flow
//!
//! A storyboard task creates the project's shots and one blocked shot-image task
//! per shot. When the storyboard finishes, those tasks are released in shot order
//! and queued. Each finished shot image re-derives whether the project is ready.

pub mod dependency_resolver;
pub mod dispatcher;
pub mod engine;
pub mod orchestrator;
pub mod scene_normalizer;
pub mod stages;
pub mod sweeper;

pub use dependency_resolver::DependencyResolver;
pub use dispatcher::{TaskDispatcher, TaskQueue, TaskRunner};
pub use engine::{OrchestrationEngine, RunOutcome};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use stages::{StageContext, StageError};
pub use sweeper::StuckTaskSweeper;
