//! HTTP surface and process wiring.

pub mod api;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::adapters::production_adapters;
use crate::config::ServiceConfig;
use crate::jobs::{
    ArtifactStore, JobRegistry, Orchestrator, Reclaimer, RetentionPolicy, StageAdapters,
    StatusService,
};

pub use api::{AppState, SharedState};

/// How long shutdown waits for in-flight jobs before giving up on them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Long-lived service objects shared by the HTTP layer and background tasks.
pub struct Services {
    pub state: SharedState,
    pub reclaimer: Reclaimer,
    pub tracker: TaskTracker,
    pub shutdown: CancellationToken,
}

impl Services {
    pub fn new(
        store: ArtifactStore,
        adapters: StageAdapters,
        policy: RetentionPolicy,
        stage_timeout: Duration,
    ) -> Self {
        let registry = JobRegistry::new();
        let tracker = TaskTracker::new();
        let shutdown = CancellationToken::new();
        let reclaimer = Reclaimer::new(
            registry.clone(),
            store.clone(),
            policy,
            tracker.clone(),
            shutdown.clone(),
        );
        let orchestrator = Orchestrator::new(
            registry.clone(),
            store.clone(),
            adapters,
            reclaimer.clone(),
            tracker.clone(),
        )
        .with_stage_timeout(stage_timeout);
        let status = StatusService::new(registry, store);

        Self {
            state: Arc::new(AppState {
                orchestrator,
                status,
            }),
            reclaimer,
            tracker,
            shutdown,
        }
    }

    /// Stop background timers and wait briefly for running jobs.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        if tokio::time::timeout(SHUTDOWN_GRACE, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                in_flight = self.tracker.len(),
                "shutdown grace period elapsed; abandoning in-flight jobs"
            );
        }
    }
}

/// Build the full application router: API routes plus the preview area.
pub fn build_router(state: SharedState, previews_dir: PathBuf) -> Router {
    api::api_router()
        .nest_service("/previews", ServeDir::new(previews_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the service and block until a shutdown signal arrives.
pub async fn start_server(config: ServiceConfig) -> Result<()> {
    let store = ArtifactStore::new(&config.storage.root);
    store
        .ensure_layout()
        .context("Failed to initialise storage")?;

    let adapters = production_adapters(&config, &store)?;
    let services = Services::new(
        store.clone(),
        adapters,
        config.retention.policy(),
        config.pipeline.stage_timeout(),
    );
    services.reclaimer.start();

    let mut app = build_router(services.state.clone(), store.previews_dir());
    if config.server.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!(
        storage = %store.root().display(),
        "Design Forge running at http://{}",
        local_addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    services.shutdown().await;
    info!("Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = sigint.recv() => {}
                }
            }
            _ => {
                warn!("failed to register signal handlers; falling back to ctrl-c");
                wait_for_ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    wait_for_ctrl_c().await;

    info!("Shutting down...");
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}
