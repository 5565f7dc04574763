use serde::{Deserialize, Serialize};
use std::fmt;

/// Task lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Ready to run
    #[default]
    Pending,
    /// Waiting for the task named in `depends_on` to finish
    Blocked,
    /// Claimed by the engine, provider call in flight
    Processing,
    /// Completed successfully, result recorded
    Finished,
    /// Execution failed, error recorded
    Failed,
    /// Cancelled explicitly or because its dependency can never finish
    Cancelled,
}

impl TaskStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Cancelled)
    }

    /// Check if this is an active state (task is being processed)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Processing)
    }

    /// Whether a dependent of a task in this state may be released
    pub fn satisfies_dependencies(&self) -> bool {
        matches!(self, Self::Finished)
    }

    /// Whether progress values may be recorded in this state
    pub fn accepts_progress(&self) -> bool {
        matches!(self, Self::Processing | Self::Finished)
    }

    /// The allowed edges of the task state machine
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Finished)
                | (Self::Processing, Self::Failed)
                | (Self::Blocked, Self::Pending)
                | (Self::Blocked, Self::Cancelled)
                | (Self::Pending, Self::Cancelled)
                | (Self::Processing, Self::Cancelled)
        )
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Blocked => "blocked",
            Self::Processing => "processing",
            Self::Finished => "finished",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "blocked" => Ok(Self::Blocked),
            "processing" => Ok(Self::Processing),
            "finished" => Ok(Self::Finished),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid task status: {s}")),
        }
    }
}

/// Per-shot generation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShotStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ShotStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for ShotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Project lifecycle; only ever advances
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Created,
    TextGenerated,
    Ready,
}

impl ProjectStatus {
    /// Returns the later of the two states
    pub fn advance_to(self, target: ProjectStatus) -> ProjectStatus {
        self.max(target)
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::TextGenerated => write!(f, "text_generated"),
            Self::Ready => write!(f, "ready"),
        }
    }
}
