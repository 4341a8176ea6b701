use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, bail};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;
use uuid::Uuid;

use crate::config::TranscriberSection;
use crate::errors::StageError;
use crate::jobs::stages::Transcriber;

/// Runs an external speech-to-text command on an uploaded audio file.
///
/// The audio is written to a scratch file whose path is appended to the
/// configured arguments. Stdout is the transcript.
#[derive(Debug, Clone)]
pub struct CommandTranscriber {
    command: String,
    args: Vec<String>,
    scratch_dir: PathBuf,
}

impl CommandTranscriber {
    pub fn new(config: &TranscriberSection, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            scratch_dir: scratch_dir.into(),
        }
    }

    async fn run(&self, audio: &[u8]) -> anyhow::Result<String> {
        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.scratch_dir.display()))?;
        let scratch = ScratchFile(
            self.scratch_dir
                .join(format!("voice-{}.audio", Uuid::new_v4())),
        );
        tokio::fs::write(scratch.path(), audio)
            .await
            .context("Failed to write uploaded audio")?;

        let output = Command::new(&self.command)
            .args(&self.args)
            .arg(scratch.path())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to spawn transcriber: {}", self.command))?;
        drop(scratch);

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "transcriber exited with {}: {}",
                output.status,
                stderr.trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Uploaded audio on disk; removed when dropped, including when the
/// transcription future is cancelled.
struct ScratchFile(PathBuf);

impl ScratchFile {
    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            debug!("failed to remove scratch audio {}: {}", self.0.display(), e);
        }
    }
}

#[async_trait]
impl Transcriber for CommandTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, StageError> {
        self.run(audio)
            .await
            .map_err(|e| StageError::Transcribe(format!("{:#}", e)))
    }
}
