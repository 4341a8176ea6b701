use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::ToolchainSection;
use crate::errors::StageError;
use crate::jobs::stages::{BuildOutcome, ProjectBuilder};

static STYLESHEET_LINK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<link\s+rel="stylesheet"\s+href="styles\.css"\s*/?>"#).unwrap());

/// Installs dependencies and runs the Angular CLI build in a workspace.
#[derive(Debug, Clone)]
pub struct NpmBuilder {
    npm_cmd: String,
    npx_cmd: String,
    output_dir: PathBuf,
}

/// Exit status plus combined output of one toolchain command.
struct CommandRun {
    success: bool,
    transcript: String,
}

impl NpmBuilder {
    pub fn new(config: &ToolchainSection) -> Self {
        Self {
            npm_cmd: config.npm_cmd.clone(),
            npx_cmd: config.npx_cmd.clone(),
            output_dir: config.output_dir.clone(),
        }
    }

    async fn run_command(
        &self,
        program: &str,
        args: &[&str],
        workspace: &Path,
    ) -> Result<CommandRun, StageError> {
        info!(workspace = %workspace.display(), "running {} {}", program, args.join(" "));
        let output = Command::new(program)
            .args(args)
            .current_dir(workspace)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| StageError::Build(format!("Failed to spawn {}: {}", program, e)))?;

        let mut transcript = format!("$ {} {}\n", program, args.join(" "));
        transcript.push_str(&String::from_utf8_lossy(&output.stdout));
        transcript.push_str(&String::from_utf8_lossy(&output.stderr));
        if !output.status.success() {
            transcript.push_str(&format!("\n{} exited with {}\n", program, output.status));
        }
        Ok(CommandRun {
            success: output.status.success(),
            transcript,
        })
    }
}

#[async_trait]
impl ProjectBuilder for NpmBuilder {
    async fn build(&self, workspace: &Path) -> Result<BuildOutcome, StageError> {
        let output_dir = workspace.join(&self.output_dir);
        let mut diagnostics = String::new();

        let install = self.run_command(&self.npm_cmd, &["install"], workspace).await?;
        diagnostics.push_str(&install.transcript);
        if !install.success {
            return Ok(BuildOutcome {
                success: false,
                diagnostics,
                output_dir,
            });
        }

        let build = self
            .run_command(&self.npx_cmd, &["ng", "build"], workspace)
            .await?;
        diagnostics.push_str(&build.transcript);
        if !build.success {
            return Ok(BuildOutcome {
                success: false,
                diagnostics,
                output_dir,
            });
        }

        if !tokio::fs::try_exists(output_dir.join("index.html"))
            .await
            .unwrap_or(false)
        {
            return Err(StageError::Build(format!(
                "build produced no index.html in {}",
                self.output_dir.display()
            )));
        }
        relink_stylesheet(&output_dir).await?;

        Ok(BuildOutcome {
            success: true,
            diagnostics,
            output_dir,
        })
    }
}

/// Point the built `index.html` at the content-hashed global stylesheet.
async fn relink_stylesheet(output_dir: &Path) -> Result<(), StageError> {
    let io_err = |e: std::io::Error| StageError::Build(format!("post-build fixup: {}", e));

    let mut style_file = None;
    let mut entries = tokio::fs::read_dir(output_dir).await.map_err(io_err)?;
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with("styles.") && name.ends_with(".css") {
            style_file = Some(name);
            break;
        }
    }
    let Some(style_file) = style_file else {
        warn!(dir = %output_dir.display(), "no global stylesheet in build output");
        return Ok(());
    };

    let index_path = output_dir.join("index.html");
    let html = tokio::fs::read_to_string(&index_path).await.map_err(io_err)?;
    let fixed = link_stylesheet(&html, &style_file);
    if fixed != html {
        tokio::fs::write(&index_path, fixed).await.map_err(io_err)?;
    }
    Ok(())
}

/// Replace a plain `styles.css` link with `style_file`, or add one when the
/// page has no stylesheet link at all.
pub fn link_stylesheet(html: &str, style_file: &str) -> String {
    let replacement = format!(r#"<link rel="stylesheet" href="{}">"#, style_file);
    let html = STYLESHEET_LINK_REGEX
        .replace(html, regex::NoExpand(&replacement))
        .into_owned();
    if html.contains(r#"<link rel="stylesheet""#) {
        return html;
    }
    html.replacen("</head>", &format!("  {}\n</head>", replacement), 1)
}
