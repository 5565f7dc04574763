//! Error types for the Storyforge core.

use thiserror::Error;

use crate::assembly::AssemblyError;
use crate::providers::ProviderError;
use crate::state_machine::TaskStatus;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoryforgeError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("Invalid transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: String,
    },
    #[error("Provider error: {0}")]
    ProviderError(#[from] ProviderError),
    #[error("Assembly error: {0}")]
    AssemblyError(#[from] AssemblyError),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoryforgeError {
    pub fn task_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "task",
            id: id.into(),
        }
    }

    pub fn project_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "project",
            id: id.into(),
        }
    }

    pub fn shot_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "shot",
            id: id.into(),
        }
    }

    /// True for errors caused by the caller rather than by a collaborator
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::ValidationError(_) | Self::NotFound { .. } | Self::InvalidTransition { .. }
        )
    }
}

impl From<serde_json::Error> for StoryforgeError {
    fn from(error: serde_json::Error) -> Self {
        StoryforgeError::ValidationError(format!("JSON serialization error: {error}"))
    }
}

impl From<std::io::Error> for StoryforgeError {
    fn from(error: std::io::Error) -> Self {
        StoryforgeError::StorageError(error.to_string())
    }
}

impl From<crate::config::ConfigurationError> for StoryforgeError {
    fn from(error: crate::config::ConfigurationError) -> Self {
        StoryforgeError::ConfigurationError(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoryforgeError>;
