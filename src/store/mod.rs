//! Record stores behind async traits, with in-memory implementations.
//!
//! Updates to a single record are serialized; partial patches merge into the
//! stored record instead of replacing it.
//!
//! ```rust
//! use storyforge_core::models::{NewProject, NewShot, ShotPatch};
//! use storyforge_core::store::{InMemoryProjectStore, ProjectStore};
//!
//! # tokio_test::block_on(async {
//! let store = InMemoryProjectStore::new();
//! let project = store.create_project(NewProject::new("Fox", "A fox ran.")).await.unwrap();
//! let shots = store
//!     .create_shots(&project.id, vec![NewShot { narration: "A fox ran.".into(), ..Default::default() }])
//!     .await
//!     .unwrap();
//!
//! let patch = ShotPatch { image_path: Some("data/shot_001.png".into()), ..Default::default() };
//! let shot = store.update_shot(&shots[0].id, patch).await.unwrap();
//! assert_eq!(shot.narration, "A fox ran.");
//! # });
//! ```

pub mod project_store;
pub mod task_store;

pub use project_store::{InMemoryProjectStore, ProjectStore};
pub use task_store::{InMemoryTaskStore, TaskStore};
