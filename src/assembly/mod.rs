//! # Media Assembly
//!
//! Final video muxing is delegated to an external command-line tool. The engine
//! talks to [`MediaAssembler`]; [`FfmpegAssembler`] is the production
//! implementation.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod ffmpeg;

pub use ffmpeg::FfmpegAssembler;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AssemblyError {
    #[error("no clips to assemble")]
    NoClips,
    #[error("failed to launch {program}: {message}")]
    Spawn { program: String, message: String },
    #[error("{program} exited with status {code:?}: {stderr}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("assembly I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for AssemblyError {
    fn from(error: std::io::Error) -> Self {
        AssemblyError::Io(error.to_string())
    }
}

pub type AssemblyResult<T> = std::result::Result<T, AssemblyError>;

/// Everything needed to mux one final video
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyRequest {
    /// Clips in playback order
    pub clips: Vec<PathBuf>,
    /// Optional narration track laid under the whole video
    pub audio: Option<PathBuf>,
    pub output: PathBuf,
    pub fps: u32,
    /// `WIDTHxHEIGHT`
    pub resolution: String,
    pub format: String,
}

#[async_trait]
pub trait MediaAssembler: Send + Sync {
    /// Concatenate clips (plus narration) into `request.output`
    async fn assemble(&self, request: &AssemblyRequest) -> AssemblyResult<PathBuf>;

    /// Render a still image into a clip of `duration` seconds
    async fn still_clip(
        &self,
        image: &Path,
        duration: f64,
        fps: u32,
        output: &Path,
    ) -> AssemblyResult<PathBuf>;
}
