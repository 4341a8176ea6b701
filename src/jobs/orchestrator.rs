use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use super::models::{InputPayload, JobId, JobPatch, JobRecord, ResultLinks, Stage};
use super::reclaimer::Reclaimer;
use super::registry::JobRegistry;
use super::stages::{DesignTree, StageAdapters};
use super::storage::ArtifactStore;
use crate::errors::{RegistryError, StageError, SubmitError};

/// Default per-stage timeout, matching the sandboxed pipeline timeout.
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(1800);

/// How a run stopped before reaching `completed`.
#[derive(Debug)]
enum RunError {
    Stage(StageError),
    Registry(RegistryError),
}

impl From<StageError> for RunError {
    fn from(e: StageError) -> Self {
        Self::Stage(e)
    }
}

impl From<RegistryError> for RunError {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

/// Drives jobs from `queued` to a terminal state.
///
/// Each submission mints a fresh `JobId`, so at most one run ever exists per
/// job. Runs are spawned on the shared `TaskTracker` and the submitter never
/// awaits them.
#[derive(Clone)]
pub struct Orchestrator {
    registry: JobRegistry,
    store: ArtifactStore,
    adapters: StageAdapters,
    reclaimer: Reclaimer,
    tracker: TaskTracker,
    stage_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        registry: JobRegistry,
        store: ArtifactStore,
        adapters: StageAdapters,
        reclaimer: Reclaimer,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            registry,
            store,
            adapters,
            reclaimer,
            tracker,
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
        }
    }

    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Start a job seeded by a design-file key.
    pub fn submit_design_key(&self, key: &str) -> Result<JobRecord, SubmitError> {
        let key = non_empty(key, "figmaKey")?;
        self.submit(InputPayload::DesignKey(key))
    }

    /// Start a job seeded by a free-text description.
    pub fn submit_description(&self, text: &str) -> Result<JobRecord, SubmitError> {
        let text = non_empty(text, "description")?;
        self.submit(InputPayload::Description(text))
    }

    /// Start a job seeded by a voice transcript.
    pub fn submit_transcript(&self, text: &str) -> Result<JobRecord, SubmitError> {
        let text = non_empty(text, "transcription")?;
        self.submit(InputPayload::Transcript(text))
    }

    /// Transcribe a voice command. Runs before any job exists, so a failure
    /// here never allocates a record.
    pub async fn transcribe(&self, audio: &[u8]) -> Result<String, StageError> {
        let transcript = self
            .within("transcribe", self.adapters.transcriber.transcribe(audio))
            .await?;
        Ok(transcript.trim().to_string())
    }

    fn submit(&self, input: InputPayload) -> Result<JobRecord, SubmitError> {
        let id = JobId::new();
        let record = self
            .registry
            .create(id, input.clone(), self.store.workspace_path(id))?;
        info!(job_id = %id, input = input.kind(), "job queued");

        let this = self.clone();
        self.tracker.spawn(async move { this.supervise(id, input).await });
        Ok(record)
    }

    /// Run the pipeline on its own task so that a panicking adapter still
    /// ends in a `failed` record instead of a job stuck in `processing`.
    async fn supervise(self, id: JobId, input: InputPayload) {
        let this = self.clone();
        let run = tokio::spawn(async move { this.run(id, input).await });
        if let Err(join_err) = run.await {
            error!(job_id = %id, "pipeline task panicked: {}", join_err);
            self.fail(id, format!("internal error: {}", join_err)).await;
        }
    }

    /// Execute every stage for `id` and commit the terminal transition.
    pub async fn run(&self, id: JobId, input: InputPayload) {
        match self.execute(id, &input).await {
            Ok(links) => match self.registry.update(id, &JobPatch::completed(links)) {
                Ok(record) => {
                    info!(job_id = %id, state = %record.state, progress = record.progress, "{}", record.message);
                    self.reclaimer
                        .schedule(id, self.reclaimer.policy().completed_retention);
                }
                Err(e) => self.abandon(id, e).await,
            },
            Err(RunError::Stage(e)) => {
                error!(job_id = %id, "stage failed: {}", e);
                self.fail(id, &e).await;
            }
            Err(RunError::Registry(e)) => self.abandon(id, e).await,
        }
    }

    async fn execute(&self, id: JobId, input: &InputPayload) -> Result<ResultLinks, RunError> {
        let workspace = self
            .store
            .allocate_workspace(id)
            .await
            .map_err(|e| StageError::Materialize(format!("{:#}", e)))?;

        let design = match input {
            InputPayload::DesignKey(key) => {
                self.advance(id, Stage::FetchDesign)?;
                self.within(
                    Stage::FetchDesign.name(),
                    self.adapters.fetcher.fetch_design(key),
                )
                .await?
            }
            InputPayload::Description(text) | InputPayload::Transcript(text) => {
                self.advance(id, Stage::DesignFromText)?;
                self.within(
                    Stage::DesignFromText.name(),
                    self.adapters.structure.generate_structure(text),
                )
                .await?
            }
        };

        self.build_from_design(id, &workspace, &design).await
    }

    /// Shared tail of every entry point: generate, materialize, build, package.
    async fn build_from_design(
        &self,
        id: JobId,
        workspace: &Path,
        design: &DesignTree,
    ) -> Result<ResultLinks, RunError> {
        self.advance(id, Stage::Generate)?;
        let files = self
            .within(
                Stage::Generate.name(),
                self.adapters.generator.generate_project_files(design),
            )
            .await?;
        if files.is_empty() {
            return Err(StageError::Generate("generator returned no files".into()).into());
        }

        self.advance(id, Stage::Materialize)?;
        self.within(
            Stage::Materialize.name(),
            self.adapters.materializer.materialize(workspace, &files),
        )
        .await?;

        self.advance(id, Stage::Build)?;
        let outcome = self
            .within(Stage::Build.name(), self.adapters.builder.build(workspace))
            .await?;
        if !outcome.success {
            return Err(StageError::Build(build_failure_summary(&outcome.diagnostics)).into());
        }

        self.advance(id, Stage::Package)?;
        let preview_url = self
            .within(
                Stage::Package.name(),
                self.adapters.publisher.publish_preview(id, &outcome.output_dir),
            )
            .await?;
        let archive_path: PathBuf = self.store.archive_path(id);
        self.within(
            Stage::Package.name(),
            self.adapters.publisher.package_archive(workspace, &archive_path),
        )
        .await?;

        Ok(ResultLinks {
            preview_url,
            download_url: format!("/api/download/{}", id),
        })
    }

    fn advance(&self, id: JobId, stage: Stage) -> Result<(), RegistryError> {
        let record = self.registry.update(id, &JobPatch::stage(stage))?;
        info!(job_id = %id, state = %record.state, progress = record.progress, "{}", record.message);
        Ok(())
    }

    async fn within<T>(
        &self,
        stage: &'static str,
        fut: impl Future<Output = Result<T, StageError>>,
    ) -> Result<T, StageError> {
        match tokio::time::timeout(self.stage_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StageError::Timeout {
                stage,
                after: self.stage_timeout,
            }),
        }
    }

    /// Terminal failure: record the reason, then best-effort workspace removal.
    async fn fail(&self, id: JobId, reason: impl std::fmt::Display + Send) {
        match self.registry.update(id, &JobPatch::failed(reason)) {
            Ok(record) => {
                info!(job_id = %id, state = %record.state, progress = record.progress, "{}", record.message);
            }
            Err(RegistryError::InvalidTransition { from, .. }) if from.is_terminal() => {
                warn!(job_id = %id, "job already {}; failure not recorded", from);
            }
            Err(e) => warn!(job_id = %id, "failed to record failure: {}", e),
        }
        self.discard_workspace(id).await;
    }

    /// The record vanished or refused the transition mid-run; stop quietly.
    async fn abandon(&self, id: JobId, err: RegistryError) {
        warn!(job_id = %id, "abandoning pipeline run: {}", err);
        let still_live = matches!(
            self.registry.get(id),
            Ok(ref record) if !record.state.is_terminal()
        );
        if still_live {
            self.fail(id, err).await;
        } else {
            self.discard_workspace(id).await;
        }
    }

    async fn discard_workspace(&self, id: JobId) {
        if let Err(e) = self.store.remove_workspace(id).await {
            warn!(job_id = %id, "failed to clean up workspace: {:#}", e);
        }
    }
}

fn non_empty(value: &str, field: &'static str) -> Result<String, SubmitError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SubmitError::EmptyInput { field });
    }
    Ok(trimmed.to_string())
}

/// Keep the tail of the toolchain output; the useful error is usually last.
fn build_failure_summary(diagnostics: &str) -> String {
    const MAX_CHARS: usize = 2000;
    let trimmed = diagnostics.trim();
    if trimmed.is_empty() {
        return "build exited unsuccessfully".to_string();
    }
    let count = trimmed.chars().count();
    if count <= MAX_CHARS {
        return trimmed.to_string();
    }
    let tail: String = trimmed.chars().skip(count - MAX_CHARS).collect();
    format!("...{}", tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::models::JobState;
    use crate::jobs::reclaimer::RetentionPolicy;
    use crate::jobs::testing::{FakeAdapters, wait_for_terminal};
    use tokio_util::sync::CancellationToken;

    struct Harness {
        _dir: tempfile::TempDir,
        store: ArtifactStore,
        registry: JobRegistry,
        orchestrator: Orchestrator,
    }

    fn harness(fakes: FakeAdapters) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.ensure_layout().unwrap();
        let registry = JobRegistry::new();
        let tracker = TaskTracker::new();
        let reclaimer = Reclaimer::new(
            registry.clone(),
            store.clone(),
            RetentionPolicy::default(),
            tracker.clone(),
            CancellationToken::new(),
        );
        let orchestrator = Orchestrator::new(
            registry.clone(),
            store.clone(),
            fakes.into_adapters(&store),
            reclaimer,
            tracker,
        )
        .with_stage_timeout(Duration::from_secs(5));
        Harness {
            _dir: dir,
            store,
            registry,
            orchestrator,
        }
    }

    #[tokio::test]
    async fn test_design_key_job_completes_with_links() {
        let h = harness(FakeAdapters::default());
        let record = h.orchestrator.submit_design_key("FILE123").unwrap();
        assert_eq!(record.state, JobState::Queued);
        assert_eq!(record.progress, 0);

        let done = wait_for_terminal(&h.registry, record.id).await;
        assert_eq!(done.state, JobState::Completed);
        assert_eq!(done.progress, 100);
        let links = done.result_links.expect("links on completion");
        assert_eq!(links.download_url, format!("/api/download/{}", record.id));
        assert_eq!(links.preview_url, format!("/previews/{}/index.html", record.id));
        assert!(h.store.archive_path(record.id).exists());
        assert!(h.store.preview_path(record.id).join("index.html").exists());
    }

    #[tokio::test]
    async fn test_text_job_uses_structure_generator() {
        let fakes = FakeAdapters::default();
        let seen = fakes.structure_inputs.clone();
        let h = harness(fakes);
        let record = h.orchestrator.submit_description("  a pricing page  ").unwrap();
        assert_eq!(record.input, InputPayload::Description("a pricing page".into()));

        let done = wait_for_terminal(&h.registry, record.id).await;
        assert_eq!(done.state, JobState::Completed);
        assert_eq!(seen.lock().unwrap().as_slice(), ["a pricing page".to_string()]);
    }

    #[tokio::test]
    async fn test_blank_input_is_rejected_without_a_record() {
        let h = harness(FakeAdapters::default());
        let err = h.orchestrator.submit_design_key("   ").unwrap_err();
        assert!(matches!(err, SubmitError::EmptyInput { field: "figmaKey" }));
        assert!(h.orchestrator.submit_description("").is_err());
        assert!(h.orchestrator.submit_transcript("\n").is_err());
        assert!(h.registry.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_fails_job_and_removes_workspace() {
        let h = harness(FakeAdapters {
            fail_fetch: Some("network unreachable".into()),
            ..Default::default()
        });
        let record = h.orchestrator.submit_design_key("FILE123").unwrap();
        let done = wait_for_terminal(&h.registry, record.id).await;

        assert_eq!(done.state, JobState::Failed);
        assert_eq!(done.progress, 0);
        assert!(done.message.contains("network unreachable"));
        assert!(done.result_links.is_none());
        assert!(!h.store.workspace_path(record.id).exists());
    }

    #[tokio::test]
    async fn test_build_failure_carries_diagnostics() {
        let h = harness(FakeAdapters {
            build_succeeds: false,
            build_diagnostics: "error TS2307: Cannot find module".into(),
            ..Default::default()
        });
        let record = h.orchestrator.submit_design_key("FILE123").unwrap();
        let done = wait_for_terminal(&h.registry, record.id).await;

        assert_eq!(done.state, JobState::Failed);
        assert_eq!(done.progress, 0);
        assert!(done.message.contains("TS2307"));
        assert!(!h.store.workspace_path(record.id).exists());
        assert!(!h.store.archive_path(record.id).exists());
    }

    #[tokio::test]
    async fn test_empty_generation_fails_job() {
        let h = harness(FakeAdapters {
            generate_nothing: true,
            ..Default::default()
        });
        let record = h.orchestrator.submit_description("hero section").unwrap();
        let done = wait_for_terminal(&h.registry, record.id).await;
        assert_eq!(done.state, JobState::Failed);
        assert!(done.message.contains("no files"));
    }

    #[tokio::test]
    async fn test_hung_stage_times_out() {
        let h = harness(FakeAdapters {
            build_delay: Some(Duration::from_secs(60)),
            ..Default::default()
        });
        let orchestrator = h.orchestrator.clone().with_stage_timeout(Duration::from_millis(100));
        let record = orchestrator.submit_design_key("FILE123").unwrap();
        let done = wait_for_terminal(&h.registry, record.id).await;
        assert_eq!(done.state, JobState::Failed);
        assert!(done.message.contains("timed out"), "{}", done.message);
    }

    #[tokio::test]
    async fn test_panicking_adapter_still_ends_failed() {
        let h = harness(FakeAdapters {
            panic_in_materialize: true,
            ..Default::default()
        });
        let record = h.orchestrator.submit_design_key("FILE123").unwrap();
        let done = wait_for_terminal(&h.registry, record.id).await;
        assert_eq!(done.state, JobState::Failed);
        assert!(done.message.contains("internal error"));
    }

    #[tokio::test]
    async fn test_observed_progress_is_monotonic() {
        let h = harness(FakeAdapters {
            build_delay: Some(Duration::from_millis(50)),
            ..Default::default()
        });
        let record = h.orchestrator.submit_design_key("FILE123").unwrap();

        let mut observed = Vec::new();
        loop {
            let snapshot = h.registry.get(record.id).unwrap();
            if snapshot.state == JobState::Processing {
                observed.push(snapshot.progress);
            }
            if snapshot.state.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert!(observed.windows(2).all(|w| w[0] <= w[1]), "{:?}", observed);
    }

    #[tokio::test]
    async fn test_concurrent_jobs_are_isolated() {
        let h = harness(FakeAdapters {
            fail_fetch_for: Some("BROKEN".into()),
            ..Default::default()
        });
        let good = h.orchestrator.submit_design_key("GOOD").unwrap();
        let bad = h.orchestrator.submit_design_key("BROKEN").unwrap();
        assert_ne!(good.id, bad.id);
        assert_ne!(good.workspace_path, bad.workspace_path);

        let good_done = wait_for_terminal(&h.registry, good.id).await;
        let bad_done = wait_for_terminal(&h.registry, bad.id).await;
        assert_eq!(good_done.state, JobState::Completed);
        assert_eq!(bad_done.state, JobState::Failed);
        assert!(h.store.archive_path(good.id).exists());
    }

    #[tokio::test]
    async fn test_reclaimed_mid_run_stops_quietly() {
        let h = harness(FakeAdapters {
            build_delay: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let record = h.orchestrator.submit_design_key("FILE123").unwrap();
        // Wait until the build is underway, then drop the record.
        while h.registry.get(record.id).unwrap().progress < Stage::Build.progress() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        h.registry.delete(record.id).unwrap();

        for _ in 0..200 {
            if !h.store.workspace_path(record.id).exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(h.registry.get(record.id).is_err());
        assert!(!h.store.workspace_path(record.id).exists());
    }

    #[tokio::test]
    async fn test_transcribe_trims_output() {
        let h = harness(FakeAdapters {
            transcript: Some("  a contact form \n".into()),
            ..Default::default()
        });
        let text = h.orchestrator.transcribe(b"RIFF").await.unwrap();
        assert_eq!(text, "a contact form");
        assert!(h.registry.is_empty());
    }

    #[test]
    fn test_build_failure_summary_keeps_tail() {
        assert_eq!(build_failure_summary("  "), "build exited unsuccessfully");
        assert_eq!(build_failure_summary("short"), "short");
        let long = format!("{}END", "x".repeat(5000));
        let summary = build_failure_summary(&long);
        assert!(summary.starts_with("..."));
        assert!(summary.ends_with("END"));
        assert_eq!(summary.chars().count(), 2003);
    }
}
