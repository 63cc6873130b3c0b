//! Job Subsystem
//!
//! Local representation of remote units of work:
//! - [`JobRecord`]: status, progress, report and submission parameters
//! - [`JobRegistry`]: job id → record, serialized per job
//! - [`status`]: the raw → canonical status table
//!
//! # Lifecycle
//!
//! A record is created by the submitter, mutated only through the registry
//! (poller, report fetcher, approval gate) and frozen once terminal. The one
//! exception is a `COMPLETED` record whose report is still missing: a later
//! report fetch may attach it.

mod registry;
mod request;
pub mod status;

pub use registry::{JobRegistry, Subscription};
pub use request::AnalysisRequest;
pub use status::{map_raw_status, CanonicalStatus, StatusMapping};

use crate::error::{OrchestratorError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Prefix of ids generated locally when the service returned none
const PLACEHOLDER_PREFIX: &str = "local-";

/// Remote job identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Create from an existing string
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Display-only id for a submission the service did not identify
    pub fn placeholder() -> Self {
        Self(format!("{}{}", PLACEHOLDER_PREFIX, Uuid::new_v4()))
    }

    /// Placeholder ids are unknown to the remote service
    pub fn is_placeholder(&self) -> bool {
        self.0.starts_with(PLACEHOLDER_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// How a job ended, as seen by callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Not terminal yet
    Pending,
    /// Completed; the report may still be missing
    Succeeded { report: Option<String> },
    /// Remote job failure
    Failed { error: String },
    /// Local wall-clock budget exceeded; the remote job may still be running
    TimedOut { error: String },
    /// Rejected at the approval gate
    Rejected,
}

/// One decoded status observation, ready to be applied to a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub status: CanonicalStatus,
    pub raw_status: Option<String>,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub report: Option<String>,
}

impl Observation {
    /// Build an observation from a raw token, filling progress from the table
    pub fn from_raw(raw: &str, progress: Option<u8>) -> Self {
        let mapping = map_raw_status(raw);
        Self {
            status: mapping.status,
            raw_status: Some(raw.to_string()),
            progress: progress.or(mapping.progress),
            message: None,
            report: None,
        }
    }

    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }

    pub fn with_report(mut self, report: Option<String>) -> Self {
        self.report = report;
        self
    }
}

/// Full job record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Remote job id (or a placeholder)
    pub id: JobId,

    /// Canonical status
    pub status: CanonicalStatus,

    /// Progress 0..=100, non-decreasing while non-terminal
    pub progress: u8,

    /// Human-readable status line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Final report, set once terminal success was observed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,

    /// Report content seen before terminal success (e.g. the plan to approve)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft_report: Option<String>,

    /// Failure description for FAILED / TIMED_OUT
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Submission parameters
    pub request: AnalysisRequest,

    /// Whether the job stops at the approval gate
    pub requires_approval: bool,

    /// Pipeline stage this job belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,

    /// Last raw token the service reported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_raw_status: Option<String>,

    /// When the job passed the approval gate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,

    /// An approve/reject call for this job is on its way to the service
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub decision_in_flight: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Create a record with a seeded status
    pub fn new(
        id: JobId,
        request: AnalysisRequest,
        status: CanonicalStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            status,
            progress: status.default_progress().unwrap_or(0),
            message: None,
            report: None,
            draft_report: None,
            error: None,
            requires_approval: request.requires_approval(),
            request,
            stage: None,
            last_raw_status: None,
            approved_at: None,
            decision_in_flight: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Sitting at the approval gate, waiting for a human
    pub fn is_awaiting_approval(&self) -> bool {
        self.requires_approval && self.status == CanonicalStatus::PendingApproval
    }

    /// Completed but the report never arrived
    pub fn is_missing_report(&self) -> bool {
        self.status == CanonicalStatus::Completed && self.report.is_none()
    }

    /// Caller-facing outcome
    pub fn outcome(&self) -> JobOutcome {
        match self.status {
            CanonicalStatus::Completed => JobOutcome::Succeeded {
                report: self.report.clone(),
            },
            CanonicalStatus::Failed => JobOutcome::Failed {
                error: self
                    .error
                    .clone()
                    .unwrap_or_else(|| "remote job failed".to_string()),
            },
            CanonicalStatus::TimedOut => JobOutcome::TimedOut {
                error: self
                    .error
                    .clone()
                    .unwrap_or_else(|| "timed out".to_string()),
            },
            CanonicalStatus::Rejected => JobOutcome::Rejected,
            CanonicalStatus::PendingApproval
            | CanonicalStatus::Approved
            | CanonicalStatus::Processing
            | CanonicalStatus::GeneratingReport => JobOutcome::Pending,
        }
    }

    /// Apply a status observation. Returns false if the record is frozen.
    pub fn apply(&mut self, observation: Observation, now: DateTime<Utc>) -> bool {
        if self.is_terminal() {
            return false;
        }

        let mut status = observation.status;
        // The service may lag behind a local approval
        if status == CanonicalStatus::PendingApproval && self.approved_at.is_some() {
            status = CanonicalStatus::Approved;
        }

        match status {
            CanonicalStatus::Completed => {
                self.progress = 100;
                if observation.report.is_some() {
                    self.report = observation.report;
                }
            }
            CanonicalStatus::Failed | CanonicalStatus::TimedOut => {
                self.error = Some(
                    observation
                        .message
                        .clone()
                        .unwrap_or_else(|| format!("remote job ended as {}", status)),
                );
            }
            CanonicalStatus::Rejected => {}
            CanonicalStatus::PendingApproval
            | CanonicalStatus::Approved
            | CanonicalStatus::Processing
            | CanonicalStatus::GeneratingReport => {
                let observed = observation
                    .progress
                    .or_else(|| status.default_progress())
                    .unwrap_or(self.progress)
                    .min(100);
                self.progress = self.progress.max(observed);
                if observation.report.is_some() {
                    self.draft_report = observation.report;
                }
            }
        }

        if observation.message.is_some() {
            self.message = observation.message;
        }
        if observation.raw_status.is_some() {
            self.last_raw_status = observation.raw_status;
        }
        self.status = status;
        self.updated_at = now;
        true
    }

    /// Force TIMED_OUT. Returns false if already terminal.
    pub fn mark_timed_out(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = CanonicalStatus::TimedOut;
        self.error = Some(error.into());
        self.updated_at = now;
        true
    }

    /// Force FAILED. Returns false if already terminal.
    pub fn mark_failed(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = CanonicalStatus::Failed;
        self.error = Some(error.into());
        self.updated_at = now;
        true
    }

    /// Check that the approval gate applies to this record and that no other
    /// decision is being sent
    pub fn ensure_awaiting_approval(&self) -> Result<()> {
        self.ensure_gated()?;
        if self.decision_in_flight {
            return Err(OrchestratorError::DecisionInFlight(self.id.clone()));
        }
        Ok(())
    }

    fn ensure_gated(&self) -> Result<()> {
        if self.is_terminal() {
            return Err(OrchestratorError::AlreadyTerminal {
                job_id: self.id.clone(),
                status: self.status,
            });
        }
        if !self.is_awaiting_approval() {
            return Err(OrchestratorError::NotAwaitingApproval {
                job_id: self.id.clone(),
                status: self.status,
            });
        }
        Ok(())
    }

    /// Claim the gate for one approve/reject call
    pub fn begin_decision(&mut self) -> Result<()> {
        self.ensure_awaiting_approval()?;
        self.decision_in_flight = true;
        Ok(())
    }

    /// Release the gate after a decision the service did not accept
    pub fn abandon_decision(&mut self) {
        self.decision_in_flight = false;
    }

    /// PENDING_APPROVAL → APPROVED
    pub fn approve(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_gated()?;
        self.decision_in_flight = false;
        self.status = CanonicalStatus::Approved;
        self.progress = self.progress.max(30);
        self.approved_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// PENDING_APPROVAL → REJECTED
    pub fn reject(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_gated()?;
        self.decision_in_flight = false;
        self.status = CanonicalStatus::Rejected;
        self.updated_at = now;
        Ok(())
    }

    /// Attach a report fetched after completion. Only fills a missing report.
    pub fn attach_report(&mut self, report: String, now: DateTime<Utc>) -> bool {
        if !self.is_missing_report() {
            return false;
        }
        self.report = Some(report);
        self.updated_at = now;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: CanonicalStatus) -> JobRecord {
        JobRecord::new(
            JobId::from_string("job-1"),
            AnalysisRequest::new("refactor", "apollo"),
            status,
            Utc::now(),
        )
    }

    #[test]
    fn test_new_record_seeds_progress() {
        assert_eq!(record(CanonicalStatus::Completed).progress, 100);
        assert_eq!(record(CanonicalStatus::PendingApproval).progress, 20);
        assert!(record(CanonicalStatus::Processing).requires_approval);
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut job = record(CanonicalStatus::Processing);
        job.apply(Observation::from_raw("pushing", None), Utc::now());
        assert_eq!(job.progress, 85);

        job.apply(Observation::from_raw("reading_files", None), Utc::now());
        assert_eq!(job.progress, 85);

        job.apply(Observation::from_raw("processing", Some(40)), Utc::now());
        assert_eq!(job.progress, 85);

        job.apply(Observation::from_raw("processing", Some(90)), Utc::now());
        assert_eq!(job.progress, 90);
    }

    #[test]
    fn test_report_only_on_completion() {
        let mut job = record(CanonicalStatus::Processing);
        job.apply(
            Observation::from_raw("generating_report", None).with_report(Some("draft".into())),
            Utc::now(),
        );
        assert!(job.report.is_none());
        assert_eq!(job.draft_report.as_deref(), Some("draft"));

        job.apply(
            Observation::from_raw("completed", None).with_report(Some("final".into())),
            Utc::now(),
        );
        assert_eq!(job.report.as_deref(), Some("final"));
        assert_eq!(job.progress, 100);
        assert_eq!(
            job.outcome(),
            JobOutcome::Succeeded {
                report: Some("final".into())
            }
        );
    }

    #[test]
    fn test_terminal_record_is_frozen() {
        let mut job = record(CanonicalStatus::Processing);
        job.apply(
            Observation::from_raw("failed", None).with_message(Some("boom".into())),
            Utc::now(),
        );
        assert_eq!(job.status, CanonicalStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("boom"));

        assert!(!job.apply(Observation::from_raw("completed", None), Utc::now()));
        assert!(!job.mark_timed_out("late", Utc::now()));
        assert_eq!(job.status, CanonicalStatus::Failed);
    }

    #[test]
    fn test_lagging_pending_after_approval_is_approved() {
        let mut job = record(CanonicalStatus::PendingApproval);
        job.approve(Utc::now()).unwrap();

        job.apply(Observation::from_raw("pending_approval", None), Utc::now());
        assert_eq!(job.status, CanonicalStatus::Approved);
        assert!(!job.is_awaiting_approval());
    }

    #[test]
    fn test_approve_and_reject_require_gate() {
        let mut job = record(CanonicalStatus::Processing);
        assert!(matches!(
            job.approve(Utc::now()),
            Err(OrchestratorError::NotAwaitingApproval { .. })
        ));

        let mut job = record(CanonicalStatus::PendingApproval);
        job.reject(Utc::now()).unwrap();
        assert_eq!(job.outcome(), JobOutcome::Rejected);
        assert!(matches!(
            job.approve(Utc::now()),
            Err(OrchestratorError::AlreadyTerminal { .. })
        ));
    }

    #[test]
    fn test_one_decision_at_a_time() {
        let mut job = record(CanonicalStatus::PendingApproval);
        job.begin_decision().unwrap();
        assert!(job.is_awaiting_approval());
        assert!(matches!(
            job.begin_decision(),
            Err(OrchestratorError::DecisionInFlight(_))
        ));

        job.abandon_decision();
        job.begin_decision().unwrap();
        job.approve(Utc::now()).unwrap();
        assert!(!job.decision_in_flight);
        assert_eq!(job.status, CanonicalStatus::Approved);
    }

    #[test]
    fn test_fast_mode_record_never_awaits_approval() {
        let mut job = JobRecord::new(
            JobId::from_string("job-2"),
            AnalysisRequest::new("refactor", "apollo").report_only(true),
            CanonicalStatus::GeneratingReport,
            Utc::now(),
        );
        job.apply(Observation::from_raw("pending_approval", None), Utc::now());
        assert_eq!(job.status, CanonicalStatus::PendingApproval);
        assert!(!job.is_awaiting_approval());
    }

    #[test]
    fn test_attach_report_fills_missing_only() {
        let mut job = record(CanonicalStatus::Processing);
        assert!(!job.attach_report("early".into(), Utc::now()));

        job.apply(Observation::from_raw("done", None), Utc::now());
        assert!(job.is_missing_report());
        assert!(job.attach_report("late".into(), Utc::now()));
        assert!(!job.attach_report("again".into(), Utc::now()));
        assert_eq!(job.report.as_deref(), Some("late"));
    }

    #[test]
    fn test_placeholder_id() {
        let id = JobId::placeholder();
        assert!(id.is_placeholder());
        assert!(!JobId::from_string("abc").is_placeholder());
    }
}
