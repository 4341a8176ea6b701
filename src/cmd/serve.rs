//! `design-forge serve`.

use std::path::PathBuf;

use anyhow::Result;

use design_forge::config::{CliOverrides, ServiceConfig};

use super::super::Cli;

pub async fn cmd_serve(
    cli: &Cli,
    port: Option<u16>,
    host: Option<String>,
    data_dir: Option<PathBuf>,
    dev: bool,
) -> Result<()> {
    let config = ServiceConfig::resolve(
        cli.config.as_deref(),
        &CliOverrides {
            host,
            port,
            data_dir,
            dev_mode: dev,
        },
    )?;

    design_forge::server::start_server(config).await
}
