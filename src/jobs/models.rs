use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque job identifier. Minted from a random v4 UUID, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| format!("Invalid job id: {}", s))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid job state: {}", s)),
        }
    }
}

/// The original submission. Immutable once the record exists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum InputPayload {
    DesignKey(String),
    Description(String),
    Transcript(String),
}

impl InputPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DesignKey(_) => "design_key",
            Self::Description(_) => "description",
            Self::Transcript(_) => "transcript",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultLinks {
    pub preview_url: String,
    pub download_url: String,
}

/// Named sub-stages of `processing`. These only drive `progress`/`message`;
/// they are not separate states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FetchDesign,
    DesignFromText,
    Generate,
    Materialize,
    Build,
    Package,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::FetchDesign => "fetch",
            Self::DesignFromText => "structure",
            Self::Generate => "generate",
            Self::Materialize => "materialize",
            Self::Build => "build",
            Self::Package => "package",
        }
    }

    pub fn progress(&self) -> u8 {
        match self {
            Self::FetchDesign | Self::DesignFromText => 10,
            Self::Generate => 30,
            Self::Materialize => 50,
            Self::Build => 70,
            Self::Package => 90,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::FetchDesign => "Fetching design data",
            Self::DesignFromText => "Generating design structure from description",
            Self::Generate => "Generating project files from design",
            Self::Materialize => "Creating project",
            Self::Build => "Building project",
            Self::Package => "Packaging project",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: JobId,
    #[serde(rename = "status")]
    pub state: JobState,
    pub progress: u8,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub input: InputPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_links: Option<ResultLinks>,
    #[serde(skip)]
    pub workspace_path: Option<PathBuf>,
}

impl JobRecord {
    pub fn new(id: JobId, input: InputPayload, workspace_path: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id,
            state: JobState::Queued,
            progress: 0,
            message: "Job queued".to_string(),
            created_at: now,
            updated_at: now,
            input,
            result_links: None,
            workspace_path: Some(workspace_path),
        }
    }

    /// Merge `patch` into a copy of this record and validate the result.
    /// The original is left untouched when the patch is rejected.
    pub fn merged(&self, patch: &JobPatch, now: DateTime<Utc>) -> Result<Self, String> {
        if self.state.is_terminal() {
            return Err(format!("job is already {}", self.state));
        }

        let mut next = self.clone();
        if let Some(state) = patch.state {
            next.state = state;
        }
        if let Some(progress) = patch.progress {
            next.progress = progress;
        }
        if let Some(ref message) = patch.message {
            next.message = message.clone();
        }
        if let Some(ref links) = patch.result_links {
            next.result_links = Some(links.clone());
        }
        if next.state == JobState::Failed {
            next.workspace_path = None;
        }
        next.updated_at = now;

        match (self.state, next.state) {
            (JobState::Processing, JobState::Queued) => {
                return Err("cannot return to queued".to_string());
            }
            (JobState::Queued, JobState::Completed) => {
                return Err("cannot complete a job that never started".to_string());
            }
            (JobState::Processing, JobState::Processing) if next.progress < self.progress => {
                return Err(format!(
                    "progress cannot decrease ({} -> {})",
                    self.progress, next.progress
                ));
            }
            _ => {}
        }

        next.check_invariants()?;
        Ok(next)
    }

    fn check_invariants(&self) -> Result<(), String> {
        let completed = self.state == JobState::Completed;
        if completed != self.result_links.is_some() {
            return Err("result links must be present exactly when completed".to_string());
        }
        if completed != (self.progress == 100) {
            return Err(format!(
                "progress {} is inconsistent with state {}",
                self.progress, self.state
            ));
        }
        if matches!(self.state, JobState::Queued | JobState::Failed) && self.progress != 0 {
            return Err(format!("progress must be 0 when {}", self.state));
        }
        if self.progress > 100 {
            return Err(format!("progress {} out of range", self.progress));
        }
        Ok(())
    }
}

/// Partial update applied through `JobRegistry::update`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub state: Option<JobState>,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub result_links: Option<ResultLinks>,
}

impl JobPatch {
    /// Enter (or stay in) `processing` at the checkpoint for `stage`.
    pub fn stage(stage: Stage) -> Self {
        Self {
            state: Some(JobState::Processing),
            progress: Some(stage.progress()),
            message: Some(stage.message().to_string()),
            result_links: None,
        }
    }

    pub fn completed(links: ResultLinks) -> Self {
        Self {
            state: Some(JobState::Completed),
            progress: Some(100),
            message: Some("Conversion completed successfully".to_string()),
            result_links: Some(links),
        }
    }

    pub fn failed(reason: impl fmt::Display) -> Self {
        Self {
            state: Some(JobState::Failed),
            progress: Some(0),
            message: Some(format!("Conversion failed: {}", reason)),
            result_links: None,
        }
    }
}
