pub mod merge;
pub mod parameters;
pub mod project;
pub mod result;
pub mod shot;
pub mod task;

// Re-export core models for easy access
pub use merge::{deep_merge, merge_maps, merged};
pub use parameters::{AudioParams, ShotImageParams, StoryboardParams, TaskParameters, VideoParams};
pub use project::{NewProject, Project, ProjectPatch};
pub use result::{
    AudioResult, GeneratedShot, ImageResult, Resource, StoryboardResult, TaskResult, VideoResult,
};
pub use shot::{NewShot, Shot, ShotPatch, ShotSnapshot};
pub use task::{NewTask, Task, TaskFilter, TaskId, TaskKind, TaskSnapshot, TaskUpdate};
