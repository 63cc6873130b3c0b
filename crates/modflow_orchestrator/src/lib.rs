//! Modflow Orchestrator
//!
//! Client-side orchestration of long-running, human-gated analysis and
//! code-generation jobs exposed by a remote service.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                     Orchestrator (facade)                      │
//! ├────────────────────────────────────────────────────────────────┤
//! │  PipelineSequencer │ upload → epics → refinement → planning →  │
//! │                    │ features, one job cycle per stage         │
//! │  ApprovalGate      │ approve / reject / refine                 │
//! │  JobSubmitter      │ POST /start-analysis, seeds the record    │
//! │  StatusPoller      │ GET /status/{id} on a Scheduler timer     │
//! │  ReportFetcher     │ report endpoint → status endpoint fallback│
//! ├────────────────────────────────────────────────────────────────┤
//! │  JobRegistry       │ job id → JobRecord, per-record lock,      │
//! │                    │ sequence-guarded writes, subscribers      │
//! │  RemoteApi         │ HTTP contract (reqwest) or a test double  │
//! │  Scheduler / Clock │ injected timing seams                     │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Design Principles
//!
//! 1. **One canonical vocabulary:** every raw status token the service emits
//!    is mapped through a single total table into [`CanonicalStatus`].
//!    Unknown tokens land in `PROCESSING`.
//!
//! 2. **Failures are record changes:** transient network errors are logged
//!    and retried on the next tick. Only `FAILED`, `TIMED_OUT` and `REJECTED`
//!    change what callers see, and they do so through the [`JobRecord`].
//!
//! 3. **Single poller per job:** the [`Scheduler`] keeps at most one timer per
//!    job id, and `stop(job_id)` is the one way to cancel it.

pub mod clock;
pub mod config;
pub mod error;
pub mod jobs;
pub mod orchestrator;
pub mod pipeline;
pub mod protocol;
pub mod scheduler;

mod approval;
mod poller;
mod report;
mod shared;
mod submitter;

// Re-exports for convenience
pub use clock::{Clock, SystemClock};
pub use config::OrchestratorConfig;
pub use error::{OrchestratorError, Result};
pub use jobs::{
    AnalysisRequest, CanonicalStatus, JobId, JobOutcome, JobRecord, JobRegistry, Subscription,
};
pub use orchestrator::Orchestrator;
pub use pipeline::{
    PipelineRequest, PipelineSequencer, PipelineState, StageDefinition, StageState, StageStatus,
    STAGES,
};
pub use protocol::{HttpRemoteApi, RemoteApi, TransportError};
pub use scheduler::{Scheduler, TickControl, TickFn, TokioScheduler};
