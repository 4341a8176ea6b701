//! Job lifecycle core.
//!
//! ## Module Map
//!
//! ```text
//!   submit_*()  ──> registry.create (queued) ──> TaskTracker::spawn
//!                                                   │
//!                                   orchestrator.rs │ stage by stage
//!                                                   v
//!      fetch/structure → generate → materialize → build → package
//!                 │                                          │
//!                 │ any failure                              │ success
//!                 v                                          v
//!          failed + workspace removed           completed + reclaimer.schedule()
//!                 │                                          │
//!                 └──────────── reclaimer.rs (sweep) ────────┘
//!                                     │
//!                                     v
//!                   workspace, preview, archive, record removed
//! ```
//!
//! | Module         | Responsibility                                          |
//! |----------------|---------------------------------------------------------|
//! | `models`       | `JobRecord`, `JobState`, `JobPatch`, stage checkpoints  |
//! | `registry`     | In-memory job table with validated updates              |
//! | `storage`      | Workspace / preview / archive paths and removal         |
//! | `stages`       | Stage adapter traits consumed by the orchestrator       |
//! | `orchestrator` | Submission entry points and the per-job stage sequence  |
//! | `reclaimer`    | One-shot and periodic reclamation of terminal jobs      |
//! | `status`       | Read-only status and download lookup                    |

pub mod models;
pub mod orchestrator;
pub mod reclaimer;
pub mod registry;
pub mod stages;
pub mod status;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use models::{InputPayload, JobId, JobPatch, JobRecord, JobState, ResultLinks, Stage};
pub use orchestrator::Orchestrator;
pub use reclaimer::{Reclaimer, RetentionPolicy};
pub use registry::JobRegistry;
pub use stages::StageAdapters;
pub use status::StatusService;
pub use storage::ArtifactStore;
