//! Typed error hierarchy for design-forge.
//!
//! - `RegistryError`: job table access and transition validation
//! - `StageError`: failures raised by a pipeline stage adapter
//! - `SubmitError`: synchronous rejection of a submission
//! - `DownloadError`: artifact lookup for a job

use std::time::Duration;

use thiserror::Error;

use crate::jobs::models::{JobId, JobState};

/// Errors from the in-memory job registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Job {id} already exists")]
    DuplicateId { id: JobId },

    #[error("Job {id} not found")]
    NotFound { id: JobId },

    #[error("Invalid transition for job {id} from {from}: {reason}")]
    InvalidTransition {
        id: JobId,
        from: JobState,
        reason: String,
    },

    #[error("Job registry lock poisoned")]
    LockPoisoned,
}

/// Errors from a single pipeline stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Failed to fetch design data: {0}")]
    Fetch(String),

    #[error("Failed to generate project: {0}")]
    Generate(String),

    #[error("Failed to transcribe audio: {0}")]
    Transcribe(String),

    #[error("Failed to create project: {0}")]
    Materialize(String),

    #[error("Failed to build project: {0}")]
    Build(String),

    #[error("Failed to create project archive: {0}")]
    Package(String),

    #[error("Failed to publish preview: {0}")]
    Publish(String),

    #[error("Stage '{stage}' timed out after {}s", after.as_secs())]
    Timeout { stage: &'static str, after: Duration },
}

/// Errors returned synchronously by a submission entry point.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("{field} is required")]
    EmptyInput { field: &'static str },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Errors from the artifact download lookup.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Job not found")]
    JobNotFound,

    #[error("Job is not completed yet")]
    NotCompleted { state: JobState },

    #[error("Download file not found")]
    ArchiveMissing,

    #[error(transparent)]
    Registry(RegistryError),
}
