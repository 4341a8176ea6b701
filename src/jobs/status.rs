use std::path::PathBuf;

use super::models::{JobId, JobRecord, JobState};
use super::registry::JobRegistry;
use super::storage::ArtifactStore;
use crate::errors::{DownloadError, RegistryError};

/// Read-only view of the job table for pollers. Never mutates, never waits
/// on in-flight stage work.
#[derive(Clone)]
pub struct StatusService {
    registry: JobRegistry,
    store: ArtifactStore,
}

impl StatusService {
    pub fn new(registry: JobRegistry, store: ArtifactStore) -> Self {
        Self { registry, store }
    }

    /// Latest committed snapshot of the job.
    pub fn get_status(&self, id: JobId) -> Result<JobRecord, RegistryError> {
        self.registry.get(id)
    }

    /// Resolve the archive for a completed job.
    pub async fn archive_for_download(&self, id: JobId) -> Result<PathBuf, DownloadError> {
        let record = self.registry.get(id).map_err(|e| match e {
            RegistryError::NotFound { .. } => DownloadError::JobNotFound,
            other => DownloadError::Registry(other),
        })?;
        if record.state != JobState::Completed {
            return Err(DownloadError::NotCompleted {
                state: record.state,
            });
        }

        let path = self.store.archive_path(id);
        match tokio::fs::try_exists(&path).await {
            Ok(true) => Ok(path),
            _ => Err(DownloadError::ArchiveMissing),
        }
    }
}
