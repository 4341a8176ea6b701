//! `design-forge config`: view the resolved configuration or write a default file.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use design_forge::config::{CONFIG_FILE, CliOverrides, ServiceConfig};

use super::super::{Cli, ConfigCommands};

const REDACTED: &str = "<redacted>";

pub fn cmd_config(cli: &Cli, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            let mut config =
                ServiceConfig::resolve(cli.config.as_deref(), &CliOverrides::default())?;
            if config.figma.token.is_some() {
                config.figma.token = Some(REDACTED.to_string());
            }
            if config.generator.api_key.is_some() {
                config.generator.api_key = Some(REDACTED.to_string());
            }
            let rendered =
                toml::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("{}", rendered);
        }
        Some(ConfigCommands::Init { force }) => {
            let path = cli
                .config
                .clone()
                .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
            if path.exists() && !force {
                bail!(
                    "{} already exists. Use --force to overwrite it.",
                    path.display()
                );
            }
            let rendered = toml::to_string_pretty(&ServiceConfig::default())
                .context("Failed to render configuration")?;
            std::fs::write(&path, rendered)
                .with_context(|| format!("Failed to write config file: {}", path.display()))?;
            println!("Wrote default configuration to {}", path.display());
        }
    }
    Ok(())
}
