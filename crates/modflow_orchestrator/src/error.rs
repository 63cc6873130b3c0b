//! Error types for orchestration operations.
//!
//! Only conditions a caller can act on are errors here. Terminal job
//! outcomes (remote failure, timeout, rejection) are reported through
//! [`crate::JobRecord::outcome`] instead.

use crate::jobs::{CanonicalStatus, JobId};
use crate::protocol::TransportError;
use thiserror::Error;

pub type Result<T, E = OrchestratorError> = std::result::Result<T, E>;

/// Errors returned by the public orchestration API
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Mandatory submission fields missing; no network call was made
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The remote call failed or answered with a non-2xx status
    #[error("Remote call failed: {0}")]
    Transport(#[from] TransportError),

    /// No record with this id in the registry
    #[error("Unknown job: {0}")]
    UnknownJob(JobId),

    /// The service answered a submission with an id that is already tracked
    #[error("Service returned job id {0}, which is already tracked")]
    DuplicateJob(JobId),

    /// The job already reached a terminal state
    #[error("Job {job_id} is already terminal ({status})")]
    AlreadyTerminal {
        job_id: JobId,
        status: CanonicalStatus,
    },

    /// Approval operations need a job sitting at the approval gate
    #[error("Job {job_id} is not awaiting approval ({status})")]
    NotAwaitingApproval {
        job_id: JobId,
        status: CanonicalStatus,
    },

    /// Another approve/reject call for the job has not returned yet
    #[error("Job {0} already has an approval decision in flight")]
    DecisionInFlight(JobId),

    /// The stage exists but an earlier stage is not completed yet
    #[error("Stage '{0}' is not reachable yet")]
    StageLocked(String),

    /// The stage was already completed and cannot be restarted
    #[error("Stage '{0}' is already completed")]
    StageCompleted(String),

    /// The stage still has a non-terminal job
    #[error("Stage '{stage}' already has an active job ({job_id})")]
    StageBusy { stage: String, job_id: JobId },

    /// The stage has not been started
    #[error("Stage '{0}' has no job")]
    StageIdle(String),

    /// No stage with this name
    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    /// Every stage is completed
    #[error("Pipeline for project '{0}' is already finished")]
    PipelineFinished(String),

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),
}

impl OrchestratorError {
    /// Whether the error was raised before anything was sent to the service
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
