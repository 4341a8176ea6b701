//! Stage adapter seams.
//!
//! The orchestrator only knows these traits. Production implementations live
//! in `crate::adapters`; tests plug in fakes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::models::JobId;
use crate::errors::StageError;

/// Design document as returned by the design API or synthesised from text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DesignTree(pub serde_json::Value);

/// Generated project files, keyed by file name.
pub type ProjectFiles = BTreeMap<String, String>;

/// Result of running the external build toolchain.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOutcome {
    pub success: bool,
    /// Captured stdout/stderr of the toolchain.
    pub diagnostics: String,
    /// Directory holding the built site when `success` is true.
    pub output_dir: PathBuf,
}

#[async_trait]
pub trait DesignFetcher: Send + Sync {
    async fn fetch_design(&self, source_key: &str) -> Result<DesignTree, StageError>;
}

#[async_trait]
pub trait StructureGenerator: Send + Sync {
    async fn generate_structure(&self, text: &str) -> Result<DesignTree, StageError>;
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, StageError>;
}

#[async_trait]
pub trait CodeGenerator: Send + Sync {
    async fn generate_project_files(&self, design: &DesignTree) -> Result<ProjectFiles, StageError>;
}

#[async_trait]
pub trait ProjectMaterializer: Send + Sync {
    async fn materialize(&self, workspace: &Path, files: &ProjectFiles) -> Result<(), StageError>;
}

#[async_trait]
pub trait ProjectBuilder: Send + Sync {
    async fn build(&self, workspace: &Path) -> Result<BuildOutcome, StageError>;
}

/// Packaging and preview publication. Both write into the artifact store.
#[async_trait]
pub trait ArtifactPublisher: Send + Sync {
    /// Write the downloadable archive for `workspace` to `archive_path`.
    async fn package_archive(
        &self,
        workspace: &Path,
        archive_path: &Path,
    ) -> Result<PathBuf, StageError>;

    /// Make `build_output` browsable and return its preview URL.
    async fn publish_preview(&self, job_id: JobId, build_output: &Path) -> Result<String, StageError>;
}

/// Every adapter the pipeline needs, shared across job runs.
#[derive(Clone)]
pub struct StageAdapters {
    pub fetcher: Arc<dyn DesignFetcher>,
    pub structure: Arc<dyn StructureGenerator>,
    pub transcriber: Arc<dyn Transcriber>,
    pub generator: Arc<dyn CodeGenerator>,
    pub materializer: Arc<dyn ProjectMaterializer>,
    pub builder: Arc<dyn ProjectBuilder>,
    pub publisher: Arc<dyn ArtifactPublisher>,
}
