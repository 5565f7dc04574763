//! Error types for provider backends.

use thiserror::Error;

/// Failure of a provider capability call
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    /// The backend rejected the request (HTTP 4xx)
    #[error("{backend} rejected the request ({status}): {body}")]
    BadRequest {
        backend: String,
        status: u16,
        body: String,
    },

    /// The backend failed while serving the request (HTTP 5xx)
    #[error("{backend} upstream error ({status}): {body}")]
    Upstream {
        backend: String,
        status: u16,
        body: String,
    },

    /// Connection-level failure
    #[error("{backend} transport error: {message}")]
    Transport { backend: String, message: String },

    #[error("{backend} request timed out")]
    Timeout { backend: String },

    /// The body could not be decoded into the expected shape
    #[error("{backend} returned a malformed response: {message}")]
    MalformedResponse { backend: String, message: String },

    /// The backend answered but could not produce the artifact
    #[error("{message}")]
    Generation { backend: String, message: String },
}

impl ProviderError {
    pub fn generation(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Generation {
            backend: backend.into(),
            message: message.into(),
        }
    }

    pub fn malformed(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Map an HTTP error status to the matching variant
    pub fn from_status(backend: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        let backend = backend.into();
        let body = body.into();
        if (400..500).contains(&status) {
            Self::BadRequest {
                backend,
                status,
                body,
            }
        } else {
            Self::Upstream {
                backend,
                status,
                body,
            }
        }
    }

    /// Map a reqwest failure that happened before a status was available
    pub fn from_reqwest(backend: impl Into<String>, error: &reqwest::Error) -> Self {
        let backend = backend.into();
        if error.is_timeout() {
            Self::Timeout { backend }
        } else if error.is_decode() {
            Self::MalformedResponse {
                backend,
                message: error.to_string(),
            }
        } else {
            Self::Transport {
                backend,
                message: error.to_string(),
            }
        }
    }

    pub fn backend(&self) -> &str {
        match self {
            Self::BadRequest { backend, .. }
            | Self::Upstream { backend, .. }
            | Self::Transport { backend, .. }
            | Self::Timeout { backend }
            | Self::MalformedResponse { backend, .. }
            | Self::Generation { backend, .. } => backend,
        }
    }

    /// Check if this error is worth retrying by the caller
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Upstream { .. } | Self::Transport { .. } | Self::Timeout { .. }
        )
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;
