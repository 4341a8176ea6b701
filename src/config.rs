//! Service configuration.
//!
//! Layered: built-in defaults → `design-forge.toml` → environment → CLI flags.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 3000
//! dev_mode = false
//!
//! [storage]
//! root = "./data"
//!
//! [retention]
//! completed_secs = 7200
//! failed_secs = 1800
//! sweep_interval_secs = 900
//!
//! [pipeline]
//! stage_timeout_secs = 1800
//!
//! [figma]
//! api_base = "https://api.figma.com/v1"
//!
//! [generator]
//! model = "gemini-1.5-flash-002"
//!
//! [toolchain]
//! npm_cmd = "npm"
//! npx_cmd = "npx"
//! output_dir = "dist/figma-angular"
//!
//! [transcriber]
//! command = "python3"
//! args = ["transcribe.py"]
//! ```

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::jobs::RetentionPolicy;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "design-forge.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub retention: RetentionSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub figma: FigmaSection,
    #[serde(default)]
    pub generator: GeneratorSection,
    #[serde(default)]
    pub toolchain: ToolchainSection,
    #[serde(default)]
    pub transcriber: TranscriberSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Enables permissive CORS for a separately served UI.
    #[serde(default)]
    pub dev_mode: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dev_mode: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSection {
    /// Holds `workspaces/`, `previews/` and `downloads/`.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionSection {
    #[serde(default = "default_completed_secs")]
    pub completed_secs: u64,
    #[serde(default = "default_failed_secs")]
    pub failed_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for RetentionSection {
    fn default() -> Self {
        Self {
            completed_secs: default_completed_secs(),
            failed_secs: default_failed_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl RetentionSection {
    pub fn policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            completed_retention: Duration::from_secs(self.completed_secs),
            failed_retention: Duration::from_secs(self.failed_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
        }
    }
}

fn default_completed_secs() -> u64 {
    2 * 60 * 60
}

fn default_failed_secs() -> u64 {
    30 * 60
}

fn default_sweep_interval_secs() -> u64 {
    15 * 60
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSection {
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            stage_timeout_secs: default_stage_timeout_secs(),
        }
    }
}

impl PipelineSection {
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }
}

fn default_stage_timeout_secs() -> u64 {
    1800
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FigmaSection {
    #[serde(default = "default_figma_api_base")]
    pub api_base: String,
    /// Personal access token. Usually supplied through `FIGMA_TOKEN`.
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for FigmaSection {
    fn default() -> Self {
        Self {
            api_base: default_figma_api_base(),
            token: None,
        }
    }
}

fn default_figma_api_base() -> String {
    "https://api.figma.com/v1".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorSection {
    #[serde(default = "default_generator_api_base")]
    pub api_base: String,
    #[serde(default = "default_generator_model")]
    pub model: String,
    /// Usually supplied through `GEMINI_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for GeneratorSection {
    fn default() -> Self {
        Self {
            api_base: default_generator_api_base(),
            model: default_generator_model(),
            api_key: None,
        }
    }
}

fn default_generator_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_generator_model() -> String {
    "gemini-1.5-flash-002".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolchainSection {
    #[serde(default = "default_npm_cmd")]
    pub npm_cmd: String,
    #[serde(default = "default_npx_cmd")]
    pub npx_cmd: String,
    /// Build output directory, relative to the workspace.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for ToolchainSection {
    fn default() -> Self {
        Self {
            npm_cmd: default_npm_cmd(),
            npx_cmd: default_npx_cmd(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_npm_cmd() -> String {
    "npm".to_string()
}

fn default_npx_cmd() -> String {
    "npx".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("dist/figma-angular")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriberSection {
    #[serde(default = "default_transcriber_command")]
    pub command: String,
    /// Arguments placed before the audio file path.
    #[serde(default = "default_transcriber_args")]
    pub args: Vec<String>,
}

impl Default for TranscriberSection {
    fn default() -> Self {
        Self {
            command: default_transcriber_command(),
            args: default_transcriber_args(),
        }
    }
}

fn default_transcriber_command() -> String {
    "python3".to_string()
}

fn default_transcriber_args() -> Vec<String> {
    vec!["transcribe.py".to_string()]
}

/// Values taken from the command line. `None` leaves the lower layer alone.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
    pub dev_mode: bool,
}

impl ServiceConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse design-forge.toml")
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Resolve the full layered configuration.
    pub fn resolve(config_path: Option<&Path>, cli: &CliOverrides) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => Self::load(path)?,
            None => Self::load_or_default(Path::new(CONFIG_FILE))?,
        };
        config.apply_env_with(|key| std::env::var(key).ok())?;
        config.apply_cli(cli);
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Reject values the runtime cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.retention.sweep_interval_secs == 0 {
            bail!("retention.sweep_interval_secs must be greater than 0");
        }
        if self.pipeline.stage_timeout_secs == 0 {
            bail!("pipeline.stage_timeout_secs must be greater than 0");
        }
        Ok(())
    }

    /// Overlay environment variables read through `lookup`.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(token) = lookup("FIGMA_TOKEN").filter(|v| !v.is_empty()) {
            self.figma.token = Some(token);
        }
        if let Some(key) = lookup("GEMINI_API_KEY").filter(|v| !v.is_empty()) {
            self.generator.api_key = Some(key);
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid PORT value '{}'", port))?;
        }
        if let Some(dir) = lookup("DESIGN_FORGE_DATA_DIR").filter(|v| !v.is_empty()) {
            self.storage.root = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn apply_cli(&mut self, cli: &CliOverrides) {
        if let Some(ref host) = cli.host {
            self.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(ref dir) = cli.data_dir {
            self.storage.root = dir.clone();
        }
        if cli.dev_mode {
            self.server.dev_mode = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(!config.server.dev_mode);
        assert_eq!(config.retention.completed_secs, 7200);
        assert_eq!(config.retention.failed_secs, 1800);
        assert_eq!(config.retention.sweep_interval_secs, 900);
        assert_eq!(config.pipeline.stage_timeout(), Duration::from_secs(1800));
        assert_eq!(config.figma.api_base, "https://api.figma.com/v1");
        assert_eq!(config.toolchain.output_dir, PathBuf::from("dist/figma-angular"));
        assert_eq!(config.transcriber.args, vec!["transcribe.py".to_string()]);
    }

    #[test]
    fn test_retention_policy_matches_defaults() {
        assert_eq!(
            RetentionSection::default().policy(),
            RetentionPolicy::default()
        );
    }

    #[test]
    fn test_parse_empty_is_default() {
        assert_eq!(ServiceConfig::parse("").unwrap(), ServiceConfig::default());
    }

    #[test]
    fn test_parse_partial_sections() {
        let config = ServiceConfig::parse(
            r#"
[server]
port = 8080

[retention]
failed_secs = 60

[transcriber]
command = "whisper-cli"
args = []
"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.retention.failed_secs, 60);
        assert_eq!(config.retention.completed_secs, 7200);
        assert_eq!(config.transcriber.command, "whisper-cli");
        assert!(config.transcriber.args.is_empty());
    }

    #[test]
    fn test_validate_rejects_zero_sweep_interval() {
        let config = ServiceConfig::parse("[retention]\nsweep_interval_secs = 0").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sweep_interval_secs"));
    }

    #[test]
    fn test_validate_rejects_zero_stage_timeout() {
        let config = ServiceConfig::parse("[pipeline]\nstage_timeout_secs = 0").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("stage_timeout_secs"));
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(ServiceConfig::default().validate().is_ok());
    }

    #[test]
    fn test_resolve_rejects_zero_sweep_interval_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("design-forge.toml");
        std::fs::write(&path, "[retention]\nsweep_interval_secs = 0\n").unwrap();
        let err = ServiceConfig::resolve(Some(&path), &CliOverrides::default()).unwrap_err();
        assert_eq!(err.to_string(), "Invalid configuration");
        assert!(format!("{:#}", err).contains("sweep_interval_secs must be greater than 0"));
    }

    #[test]
    fn test_parse_invalid_toml() {
        assert!(ServiceConfig::parse("[server\nport = ").is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig::load_or_default(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, ServiceConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[storage]\nroot = \"/srv/forge\"\n").unwrap();
        let config = ServiceConfig::load(&path).unwrap();
        assert_eq!(config.storage.root, PathBuf::from("/srv/forge"));
    }

    #[test]
    fn test_env_overlays_file() {
        let mut config = ServiceConfig::parse("[server]\nport = 8080\n").unwrap();
        config
            .apply_env_with(env(&[
                ("PORT", "9000"),
                ("FIGMA_TOKEN", "figd_abc"),
                ("GEMINI_API_KEY", "key"),
                ("DESIGN_FORGE_DATA_DIR", "/tmp/forge"),
            ]))
            .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.figma.token.as_deref(), Some("figd_abc"));
        assert_eq!(config.generator.api_key.as_deref(), Some("key"));
        assert_eq!(config.storage.root, PathBuf::from("/tmp/forge"));
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let mut config = ServiceConfig::default();
        config.figma.token = Some("from-file".into());
        config.apply_env_with(env(&[("FIGMA_TOKEN", "")])).unwrap();
        assert_eq!(config.figma.token.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_invalid_port_env() {
        let mut config = ServiceConfig::default();
        let err = config
            .apply_env_with(env(&[("PORT", "eighty")]))
            .unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_cli_overrides_env() {
        let mut config = ServiceConfig::default();
        config.apply_env_with(env(&[("PORT", "9000")])).unwrap();
        config.apply_cli(&CliOverrides {
            port: Some(4000),
            host: Some("127.0.0.1".into()),
            data_dir: Some(PathBuf::from("/var/forge")),
            dev_mode: true,
        });
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.storage.root, PathBuf::from("/var/forge"));
        assert!(config.server.dev_mode);
    }

    #[test]
    fn test_cli_without_values_keeps_lower_layers() {
        let mut config = ServiceConfig::parse("[server]\ndev_mode = true\n").unwrap();
        config.apply_cli(&CliOverrides::default());
        assert!(config.server.dev_mode);
        assert_eq!(config.server.port, 3000);
    }
}
