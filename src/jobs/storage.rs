use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::models::JobId;

/// On-disk areas owned by the service, all under one root:
///
/// ```text
/// <root>/workspaces/<job-id>/     generated + scaffolded project, build output
/// <root>/previews/<job-id>/       published build output, served under /previews
/// <root>/downloads/<job-id>.zip   downloadable archive
/// ```
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn workspaces_dir(&self) -> PathBuf {
        self.root.join("workspaces")
    }

    pub fn previews_dir(&self) -> PathBuf {
        self.root.join("previews")
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join("downloads")
    }

    pub fn workspace_path(&self, id: JobId) -> PathBuf {
        self.workspaces_dir().join(id.to_string())
    }

    pub fn preview_path(&self, id: JobId) -> PathBuf {
        self.previews_dir().join(id.to_string())
    }

    pub fn archive_path(&self, id: JobId) -> PathBuf {
        self.downloads_dir().join(format!("{}.zip", id))
    }

    /// Where the archive is written before being renamed into place.
    pub fn partial_archive_path(&self, id: JobId) -> PathBuf {
        self.archive_path(id).with_extension("zip.part")
    }

    /// Create the three storage areas. Called once at startup; failure is fatal.
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [self.workspaces_dir(), self.previews_dir(), self.downloads_dir()] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create storage directory {}", dir.display()))?;
        }
        Ok(())
    }

    /// Create the job's workspace directory.
    pub async fn allocate_workspace(&self, id: JobId) -> Result<PathBuf> {
        let path = self.workspace_path(id);
        tokio::fs::create_dir_all(&path)
            .await
            .with_context(|| format!("Failed to create workspace {}", path.display()))?;
        Ok(path)
    }

    pub async fn remove_workspace(&self, id: JobId) -> Result<bool> {
        remove_dir_if_exists(&self.workspace_path(id)).await
    }

    pub async fn remove_preview(&self, id: JobId) -> Result<bool> {
        remove_dir_if_exists(&self.preview_path(id)).await
    }

    /// Remove the archive and any partial archive left by an interrupted write.
    pub async fn remove_archive(&self, id: JobId) -> Result<bool> {
        let partial = remove_file_if_exists(&self.partial_archive_path(id)).await?;
        let archive = remove_file_if_exists(&self.archive_path(id)).await?;
        Ok(archive || partial)
    }
}

async fn remove_file_if_exists(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

/// Returns `Ok(false)` when there was nothing to remove.
async fn remove_dir_if_exists(path: &Path) -> Result<bool> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}
