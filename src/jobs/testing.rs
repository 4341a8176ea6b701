//! In-process fake stage adapters for orchestrator, reclaimer and API tests.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::models::{JobId, JobRecord};
use super::registry::JobRegistry;
use super::stages::*;
use super::storage::ArtifactStore;
use crate::errors::StageError;

#[derive(Clone)]
pub struct FakeAdapters {
    pub fail_fetch: Option<String>,
    /// Only this design key fails to fetch.
    pub fail_fetch_for: Option<String>,
    pub structure_inputs: Arc<Mutex<Vec<String>>>,
    pub generate_nothing: bool,
    pub panic_in_materialize: bool,
    pub build_succeeds: bool,
    pub build_diagnostics: String,
    pub build_delay: Option<Duration>,
    pub transcript: Option<String>,
}

impl Default for FakeAdapters {
    fn default() -> Self {
        Self {
            fail_fetch: None,
            fail_fetch_for: None,
            structure_inputs: Arc::new(Mutex::new(Vec::new())),
            generate_nothing: false,
            panic_in_materialize: false,
            build_succeeds: true,
            build_diagnostics: "build ok".into(),
            build_delay: None,
            transcript: None,
        }
    }
}

impl FakeAdapters {
    pub fn into_adapters(self, store: &ArtifactStore) -> StageAdapters {
        let fake = Arc::new(Fake {
            cfg: self,
            store: store.clone(),
        });
        StageAdapters {
            fetcher: fake.clone(),
            structure: fake.clone(),
            transcriber: fake.clone(),
            generator: fake.clone(),
            materializer: fake.clone(),
            builder: fake.clone(),
            publisher: fake,
        }
    }
}

struct Fake {
    cfg: FakeAdapters,
    store: ArtifactStore,
}

#[async_trait]
impl DesignFetcher for Fake {
    async fn fetch_design(&self, source_key: &str) -> Result<DesignTree, StageError> {
        if let Some(ref reason) = self.cfg.fail_fetch {
            return Err(StageError::Fetch(reason.clone()));
        }
        if self.cfg.fail_fetch_for.as_deref() == Some(source_key) {
            return Err(StageError::Fetch(format!("file {} not found", source_key)));
        }
        Ok(DesignTree(json!({"name": source_key, "document": {"children": []}})))
    }
}

#[async_trait]
impl StructureGenerator for Fake {
    async fn generate_structure(&self, text: &str) -> Result<DesignTree, StageError> {
        self.cfg
            .structure_inputs
            .lock()
            .unwrap()
            .push(text.to_string());
        Ok(DesignTree(json!({"name": "generated", "description": text})))
    }
}

#[async_trait]
impl Transcriber for Fake {
    async fn transcribe(&self, _audio: &[u8]) -> Result<String, StageError> {
        self.cfg
            .transcript
            .clone()
            .ok_or_else(|| StageError::Transcribe("no speech detected".into()))
    }
}

#[async_trait]
impl CodeGenerator for Fake {
    async fn generate_project_files(&self, _design: &DesignTree) -> Result<ProjectFiles, StageError> {
        let mut files = ProjectFiles::new();
        if !self.cfg.generate_nothing {
            files.insert("app.component.html".into(), "<h1>Hello</h1>".into());
            files.insert("app.component.css".into(), "h1 { color: red; }".into());
        }
        Ok(files)
    }
}

#[async_trait]
impl ProjectMaterializer for Fake {
    async fn materialize(&self, workspace: &Path, files: &ProjectFiles) -> Result<(), StageError> {
        if self.cfg.panic_in_materialize {
            panic!("materializer exploded");
        }
        for (name, content) in files {
            tokio::fs::write(workspace.join(name), content)
                .await
                .map_err(|e| StageError::Materialize(e.to_string()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ProjectBuilder for Fake {
    async fn build(&self, workspace: &Path) -> Result<BuildOutcome, StageError> {
        if let Some(delay) = self.cfg.build_delay {
            tokio::time::sleep(delay).await;
        }
        let output_dir = workspace.join("dist");
        if self.cfg.build_succeeds {
            tokio::fs::create_dir_all(&output_dir)
                .await
                .map_err(|e| StageError::Build(e.to_string()))?;
            tokio::fs::write(output_dir.join("index.html"), "<app-root></app-root>")
                .await
                .map_err(|e| StageError::Build(e.to_string()))?;
        }
        Ok(BuildOutcome {
            success: self.cfg.build_succeeds,
            diagnostics: self.cfg.build_diagnostics.clone(),
            output_dir,
        })
    }
}

#[async_trait]
impl ArtifactPublisher for Fake {
    async fn package_archive(&self, _workspace: &Path, archive_path: &Path) -> Result<PathBuf, StageError> {
        tokio::fs::write(archive_path, b"PK\x03\x04fake")
            .await
            .map_err(|e| StageError::Package(e.to_string()))?;
        Ok(archive_path.to_path_buf())
    }

    async fn publish_preview(&self, job_id: JobId, build_output: &Path) -> Result<String, StageError> {
        let target = self.store.preview_path(job_id);
        tokio::fs::create_dir_all(&target)
            .await
            .map_err(|e| StageError::Publish(e.to_string()))?;
        tokio::fs::copy(build_output.join("index.html"), target.join("index.html"))
            .await
            .map_err(|e| StageError::Publish(e.to_string()))?;
        Ok(format!("/previews/{}/index.html", job_id))
    }
}

/// Poll until the job is terminal. Panics after ten seconds.
pub async fn wait_for_terminal(registry: &JobRegistry, id: JobId) -> JobRecord {
    for _ in 0..1000 {
        let record = registry.get(id).expect("job disappeared while waiting");
        if record.state.is_terminal() {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} did not finish in time", id);
}
