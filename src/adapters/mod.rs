//! Production stage adapters.
//!
//! | Adapter              | Stage trait(s)                              | Backend                      |
//! |----------------------|---------------------------------------------|------------------------------|
//! | `FigmaClient`        | `DesignFetcher`                             | Figma REST API               |
//! | `GeminiClient`       | `CodeGenerator`, `StructureGenerator`       | generateContent endpoint     |
//! | `CommandTranscriber` | `Transcriber`                               | external speech-to-text CLI  |
//! | `AngularScaffold`    | `ProjectMaterializer`                       | local filesystem             |
//! | `NpmBuilder`         | `ProjectBuilder`                            | `npm install` + `npx ng build` |
//! | `StorePublisher`     | `ArtifactPublisher`                         | zip archive + preview copy   |

pub mod figma;
pub mod gemini;
pub mod publish;
pub mod scaffold;
pub mod toolchain;
pub mod transcriber;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::warn;

use crate::config::ServiceConfig;
use crate::jobs::stages::StageAdapters;
use crate::jobs::storage::ArtifactStore;

pub use figma::FigmaClient;
pub use gemini::GeminiClient;
pub use publish::StorePublisher;
pub use scaffold::AngularScaffold;
pub use toolchain::NpmBuilder;
pub use transcriber::CommandTranscriber;

/// Wire the production adapters from configuration.
///
/// Missing API credentials are not fatal here; jobs that need them fail
/// at the corresponding stage with a descriptive message.
pub fn production_adapters(config: &ServiceConfig, store: &ArtifactStore) -> Result<StageAdapters> {
    if config.figma.token.is_none() {
        warn!("FIGMA_TOKEN not set; design-key jobs will fail to fetch");
    }
    if config.generator.api_key.is_none() {
        warn!("GEMINI_API_KEY not set; project generation will fail");
    }

    let http = reqwest::Client::builder()
        .user_agent(concat!("design-forge/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;

    let gemini = Arc::new(GeminiClient::new(http.clone(), &config.generator));
    Ok(StageAdapters {
        fetcher: Arc::new(FigmaClient::new(http, &config.figma)),
        structure: gemini.clone(),
        transcriber: Arc::new(CommandTranscriber::new(
            &config.transcriber,
            store.root().join("uploads"),
        )),
        generator: gemini,
        materializer: Arc::new(AngularScaffold::new(config.toolchain.output_dir.clone())),
        builder: Arc::new(NpmBuilder::new(&config.toolchain)),
        publisher: Arc::new(StorePublisher::new(store.clone())),
    })
}
