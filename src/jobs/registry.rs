use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;

use super::models::{InputPayload, JobId, JobPatch, JobRecord};
use crate::errors::RegistryError;

/// The authoritative in-memory job table.
///
/// Cloning is cheap and every clone shares the same table. The lock is held
/// only for the duration of a map operation, never across an `.await`, so
/// status readers never wait on stage work.
#[derive(Clone, Default)]
pub struct JobRegistry {
    inner: Arc<RwLock<HashMap<JobId, JobRecord>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh `queued` record for `id`.
    pub fn create(
        &self,
        id: JobId,
        input: InputPayload,
        workspace_path: std::path::PathBuf,
    ) -> Result<JobRecord, RegistryError> {
        let mut jobs = self.inner.write().map_err(|_| RegistryError::LockPoisoned)?;
        if jobs.contains_key(&id) {
            return Err(RegistryError::DuplicateId { id });
        }
        let record = JobRecord::new(id, input, workspace_path);
        jobs.insert(id, record.clone());
        Ok(record)
    }

    /// Snapshot of the record for `id`.
    pub fn get(&self, id: JobId) -> Result<JobRecord, RegistryError> {
        let jobs = self.inner.read().map_err(|_| RegistryError::LockPoisoned)?;
        jobs.get(&id).cloned().ok_or(RegistryError::NotFound { id })
    }

    /// Merge `patch` into the record and bump `updated_at`.
    ///
    /// The merged record replaces the old one as a whole, so readers see
    /// either the previous or the new version. Missing ids report
    /// `NotFound`; patches that would break the lifecycle rules report
    /// `InvalidTransition` and leave the record unchanged.
    pub fn update(&self, id: JobId, patch: &JobPatch) -> Result<JobRecord, RegistryError> {
        let mut jobs = self.inner.write().map_err(|_| RegistryError::LockPoisoned)?;
        let current = jobs.get(&id).ok_or(RegistryError::NotFound { id })?;
        let next = current
            .merged(patch, Utc::now())
            .map_err(|reason| RegistryError::InvalidTransition {
                id,
                from: current.state,
                reason,
            })?;
        jobs.insert(id, next.clone());
        Ok(next)
    }

    /// Remove the record. Returns whether anything was removed; absent ids
    /// are not an error.
    pub fn delete(&self, id: JobId) -> Result<bool, RegistryError> {
        let mut jobs = self.inner.write().map_err(|_| RegistryError::LockPoisoned)?;
        Ok(jobs.remove(&id).is_some())
    }

    /// Snapshot of every record, in no particular order.
    pub fn list(&self) -> Result<Vec<JobRecord>, RegistryError> {
        let jobs = self.inner.read().map_err(|_| RegistryError::LockPoisoned)?;
        Ok(jobs.values().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|jobs| jobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
