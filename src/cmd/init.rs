//! `design-forge init`: create the storage layout without starting the server.

use std::path::PathBuf;

use anyhow::Result;

use design_forge::config::{CliOverrides, ServiceConfig};
use design_forge::jobs::ArtifactStore;

use super::super::Cli;

pub fn cmd_init(cli: &Cli, data_dir: Option<PathBuf>) -> Result<()> {
    let config = ServiceConfig::resolve(
        cli.config.as_deref(),
        &CliOverrides {
            data_dir,
            ..Default::default()
        },
    )?;

    let store = ArtifactStore::new(&config.storage.root);
    store.ensure_layout()?;
    println!("Storage initialized at {}", store.root().display());
    for dir in [store.workspaces_dir(), store.previews_dir(), store.downloads_dir()] {
        println!("  {}", dir.display());
    }
    Ok(())
}
