//! # Artifact Storage
//!
//! Generated media lands under a configured root, one directory per project and
//! artifact class. Stored paths are exposed to clients as URLs under a public
//! prefix.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::StorageConfig;
use crate::error::{Result, StoryforgeError};

/// Artifact class, which is also the directory name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Image,
    Audio,
    Clip,
    Video,
}

impl ArtifactKind {
    pub fn dir(&self) -> &'static str {
        match self {
            Self::Image => "images",
            Self::Audio => "audio",
            Self::Clip => "clips",
            Self::Video => "video",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactStorage {
    root: PathBuf,
    public_prefix: String,
}

impl ArtifactStorage {
    /// A relative `root` is resolved against the working directory here
    pub fn new(root: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        let prefix = public_prefix.into();
        Self {
            root: absolutize(root.into()),
            public_prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(&config.root, &config.public_prefix)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Target path for an artifact, without touching the filesystem
    pub fn path_for(&self, project_id: &str, kind: ArtifactKind, name: &str, ext: &str) -> PathBuf {
        self.root
            .join(sanitize(project_id))
            .join(kind.dir())
            .join(format!("{}.{}", sanitize(name), ext.trim_start_matches('.')))
    }

    /// Create the parent directory of `path`
    pub async fn prepare(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoryforgeError::StorageError(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        Ok(())
    }

    pub async fn write(
        &self,
        project_id: &str,
        kind: ArtifactKind,
        name: &str,
        ext: &str,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        let path = self.path_for(project_id, kind, name, ext);
        self.prepare(&path).await?;
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            StoryforgeError::StorageError(format!("cannot write {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), bytes = bytes.len(), "Artifact stored");
        Ok(path)
    }

    /// Public URL for a stored path; paths outside the root pass through
    pub fn url(&self, path: &Path) -> String {
        let path = absolutize(path.to_path_buf());
        match path.strip_prefix(&self.root) {
            Ok(relative) => {
                let relative = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                format!("{}/{}", self.public_prefix, relative)
            }
            Err(_) => path.display().to_string(),
        }
    }

    /// Remove a project's artifact tree, if any
    pub async fn remove_project(&self, project_id: &str) -> Result<()> {
        let dir = self.root.join(sanitize(project_id));
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoryforgeError::StorageError(format!(
                "cannot remove {}: {e}",
                dir.display()
            ))),
        }
    }
}

/// Absolute form of `path` without touching the filesystem
pub fn absolutize(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    std::path::absolute(&path).unwrap_or(path)
}

fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}
