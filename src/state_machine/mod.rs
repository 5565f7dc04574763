// State machine module for task lifecycle management
//
// Task status moves only along the edges declared in `states`; every update is
// validated by `TaskStateMachine` and its guards before a store commits it.

pub mod guards;
pub mod states;
pub mod task_state_machine;

// Re-export main types for convenient access
pub use states::{ProjectStatus, ShotStatus, TaskStatus};
pub use task_state_machine::{AppliedUpdate, TaskStateMachine};

// Common traits and utilities
pub use guards::StateGuard;
