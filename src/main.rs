use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use design_forge::logging::{LogOptions, init_tracing};

mod cmd;

#[derive(Parser)]
#[command(name = "design-forge")]
#[command(
    version,
    about = "Turns design files, descriptions and voice commands into built, downloadable web projects"
)]
pub struct Cli {
    /// Debug-level logging when RUST_LOG is unset
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Also write JSON logs to a daily-rolling file in this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Config file (defaults to ./design-forge.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP service
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Root directory for workspaces, previews and downloads
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Enable dev mode (permissive CORS for a separately served UI)
        #[arg(long)]
        dev: bool,
    },
    /// Create the storage layout and exit
    Init {
        /// Root directory for workspaces, previews and downloads
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// View or initialize configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the resolved configuration (secrets redacted)
    Show,
    /// Write a default design-forge.toml
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; real environment variables still apply.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(&LogOptions {
        verbose: cli.verbose,
        json: cli.log_json,
        log_dir: cli.log_dir.clone(),
    })?;

    match &cli.command {
        Commands::Serve {
            port,
            host,
            data_dir,
            dev,
        } => {
            cmd::cmd_serve(&cli, *port, host.clone(), data_dir.clone(), *dev).await?;
        }
        Commands::Init { data_dir } => cmd::cmd_init(&cli, data_dir.clone())?,
        Commands::Config { command } => cmd::cmd_config(&cli, command.clone())?,
    }

    Ok(())
}
