use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::models::{JobId, JobRecord, JobState};
use super::registry::JobRegistry;
use super::storage::ArtifactStore;

/// How long terminal jobs are kept, and how often the sweep runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub completed_retention: Duration,
    pub failed_retention: Duration,
    pub sweep_interval: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            completed_retention: Duration::from_secs(2 * 60 * 60),
            failed_retention: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(15 * 60),
        }
    }
}

impl RetentionPolicy {
    /// Whether `record` has outlived its retention window at `now`.
    /// Live jobs never expire.
    pub fn is_expired(&self, record: &JobRecord, now: DateTime<Utc>) -> bool {
        let retention = match record.state {
            JobState::Completed => self.completed_retention,
            JobState::Failed => self.failed_retention,
            JobState::Queued | JobState::Processing => return false,
        };
        let age = (now - record.updated_at).to_std().unwrap_or_default();
        age > retention
    }
}

/// Deletes terminal jobs and their on-disk artifacts.
///
/// Two sources feed the same idempotent `reclaim`: a one-shot timer armed
/// when a job completes, and the periodic sweep. They may race on the same
/// job; the loser finds nothing left to remove.
#[derive(Clone)]
pub struct Reclaimer {
    registry: JobRegistry,
    store: ArtifactStore,
    policy: RetentionPolicy,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl Reclaimer {
    pub fn new(
        registry: JobRegistry,
        store: ArtifactStore,
        policy: RetentionPolicy,
        tracker: TaskTracker,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            store,
            policy,
            tracker,
            shutdown,
        }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Remove the workspace, preview and archive for `id`, then its record.
    ///
    /// Each removal is independent and best-effort; failures are logged and
    /// never change the outcome. Returns whether a record was deleted.
    pub async fn reclaim(&self, id: JobId) -> bool {
        if let Err(e) = self.store.remove_workspace(id).await {
            warn!(job_id = %id, "failed to remove workspace: {:#}", e);
        }
        if let Err(e) = self.store.remove_preview(id).await {
            warn!(job_id = %id, "failed to remove preview: {:#}", e);
        }
        if let Err(e) = self.store.remove_archive(id).await {
            warn!(job_id = %id, "failed to remove archive: {:#}", e);
        }

        match self.registry.delete(id) {
            Ok(true) => {
                info!(job_id = %id, "cleanup completed");
                true
            }
            Ok(false) => {
                debug!(job_id = %id, "already reclaimed");
                false
            }
            Err(e) => {
                warn!(job_id = %id, "failed to delete job record: {}", e);
                false
            }
        }
    }

    /// Arm a one-shot reclamation of `id` after `delay`. Dropped on shutdown.
    pub fn schedule(&self, id: JobId, delay: Duration) {
        let this = self.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    this.reclaim(id).await;
                }
                _ = this.shutdown.cancelled() => {
                    debug!(job_id = %id, "scheduled cleanup dropped on shutdown");
                }
            }
        });
    }

    /// Ids of terminal jobs whose retention window has elapsed at `now`.
    pub fn expired(&self, now: DateTime<Utc>) -> Vec<JobId> {
        match self.registry.list() {
            Ok(records) => records
                .iter()
                .filter(|record| self.policy.is_expired(record, now))
                .map(|record| record.id)
                .collect(),
            Err(e) => {
                warn!("sweep could not list jobs: {}", e);
                Vec::new()
            }
        }
    }

    /// Reclaim every expired job as of `now`. Returns the ids swept.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Vec<JobId> {
        let expired = self.expired(now);
        for &id in &expired {
            self.reclaim(id).await;
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "sweep reclaimed expired jobs");
        }
        expired
    }

    pub async fn sweep(&self) -> Vec<JobId> {
        self.sweep_at(Utc::now()).await
    }

    /// Start the periodic sweep. The first pass runs one interval after start.
    pub fn start(&self) -> JoinHandle<()> {
        let this = self.clone();
        let period = self.policy.sweep_interval;
        self.tracker.spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        this.sweep().await;
                    }
                    _ = this.shutdown.cancelled() => {
                        debug!("reclamation sweep stopped");
                        break;
                    }
                }
            }
        })
    }
}
