#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Storyforge Core
//!
//! Task orchestration and dependency resolution for a story-to-video pipeline.
//!
//! ## Overview
//!
//! A story is decomposed into a storyboard, each scene becomes an image, images
//! become clips, narration is synthesized, and everything is assembled into a
//! final video. This crate tracks each of those units of work as a task, drives
//! them through a state machine, unblocks downstream work when upstream work
//! finishes, and merges partial results into shared project and shot records
//! while concurrent readers observe consistent snapshots.
//!
//! Model serving is out of scope: each capability sits behind a provider trait
//! with HTTP implementations selected from configuration.
//!
//! ## Module Organization
//!
//! - [`models`] - Tasks, projects, shots, typed parameters and results
//! - [`state_machine`] - Task lifecycle and update guards
//! - [`store`] - Task and project/shot stores
//! - [`events`] - Per-task progress broadcast
//! - [`providers`] - Capability traits and HTTP backends
//! - [`orchestration`] - Engine, dependency resolution, work queue, facade
//! - [`assembly`] - Final video muxing via `ffmpeg`
//! - [`storage`] - Artifact files and their public URLs
//! - [`config`] - Layered configuration
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use storyforge_core::logging::init_structured_logging;
//! use storyforge_core::models::{NewProject, StoryboardParams};
//! use storyforge_core::orchestration::Orchestrator;
//!
//! # async fn example() -> storyforge_core::Result<()> {
//! init_structured_logging();
//! let orchestrator = Orchestrator::bootstrap()?;
//!
//! let project = orchestrator
//!     .create_project(NewProject::new("The Fox", "A fox ran. It hid.").with_style("watercolor"))
//!     .await?;
//! let storyboard = orchestrator
//!     .start_generation(&project.id, StoryboardParams { scene_count: 2, ..Default::default() })
//!     .await?;
//!
//! orchestrator.wait_idle().await;
//! for shot in orchestrator.list_shots(&project.id).await? {
//!     println!("{} {:?}", shot.order, shot.image_path);
//! }
//! println!("storyboard {}", orchestrator.get_task(&storyboard.id).await?.status);
//! orchestrator.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod assembly;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod providers;
pub mod state_machine;
pub mod storage;
pub mod store;

pub use config::{ConfigManager, StoryforgeConfig};
pub use error::{Result, StoryforgeError};
pub use events::{ProgressHub, StatusEvent};
pub use models::{
    NewProject, NewTask, Project, Shot, ShotSnapshot, Task, TaskFilter, TaskKind, TaskSnapshot,
};
pub use orchestration::{OrchestrationEngine, Orchestrator, OrchestratorBuilder, RunOutcome};
pub use providers::{ProviderError, ProviderRegistry};
pub use state_machine::{ProjectStatus, ShotStatus, TaskStatus};
