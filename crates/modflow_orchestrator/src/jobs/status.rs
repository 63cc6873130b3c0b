//! Canonical status vocabulary
//!
//! The remote service reports an open-ended set of sub-status tokens
//! ("reading_files", "refactoring", "grouping_commits", ...). Every token is
//! normalized and looked up in [`RAW_STATUS_TABLE`]; anything not listed maps
//! to [`CanonicalStatus::Processing`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of statuses every raw token is mapped into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CanonicalStatus {
    /// Waiting for a human decision
    PendingApproval,
    /// Human approved; remote work resumes
    Approved,
    /// Remote work in progress
    Processing,
    /// Remote work done, report being written
    GeneratingReport,
    /// Finished successfully
    Completed,
    /// Remote job failed
    Failed,
    /// Human rejected at the approval gate
    Rejected,
    /// No terminal status within the local wall-clock budget
    TimedOut,
}

impl CanonicalStatus {
    /// Wire/display form
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingApproval => "PENDING_APPROVAL",
            Self::Approved => "APPROVED",
            Self::Processing => "PROCESSING",
            Self::GeneratingReport => "GENERATING_REPORT",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Rejected => "REJECTED",
            Self::TimedOut => "TIMED_OUT",
        }
    }

    /// No automatic transition leaves a terminal status
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Completed | Self::Failed | Self::Rejected | Self::TimedOut => true,
            Self::PendingApproval | Self::Approved | Self::Processing | Self::GeneratingReport => {
                false
            }
        }
    }

    /// Approximate progress used when the backend omits a number.
    ///
    /// `None` means "keep whatever progress the record already has".
    pub fn default_progress(&self) -> Option<u8> {
        match self {
            Self::PendingApproval => Some(20),
            Self::Approved => Some(30),
            Self::Processing => Some(50),
            Self::GeneratingReport => Some(80),
            Self::Completed => Some(100),
            Self::Failed | Self::Rejected | Self::TimedOut => None,
        }
    }
}

impl fmt::Display for CanonicalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Known raw tokens with their canonical status and approximate progress
pub static RAW_STATUS_TABLE: &[(&str, CanonicalStatus, Option<u8>)] = &[
    // Approval gate
    ("pending_approval", CanonicalStatus::PendingApproval, Some(20)),
    ("awaiting_approval", CanonicalStatus::PendingApproval, Some(20)),
    ("waiting_approval", CanonicalStatus::PendingApproval, Some(20)),
    ("waiting_for_approval", CanonicalStatus::PendingApproval, Some(20)),
    ("approval_required", CanonicalStatus::PendingApproval, Some(20)),
    ("needs_approval", CanonicalStatus::PendingApproval, Some(20)),
    ("approved", CanonicalStatus::Approved, Some(30)),
    ("approval_received", CanonicalStatus::Approved, Some(30)),
    ("resumed", CanonicalStatus::Approved, Some(30)),
    // Work in progress
    ("pending", CanonicalStatus::Processing, Some(5)),
    ("queued", CanonicalStatus::Processing, Some(5)),
    ("started", CanonicalStatus::Processing, Some(10)),
    ("starting", CanonicalStatus::Processing, Some(10)),
    ("initializing", CanonicalStatus::Processing, Some(10)),
    ("cloning", CanonicalStatus::Processing, Some(15)),
    ("cloning_repository", CanonicalStatus::Processing, Some(15)),
    ("reading", CanonicalStatus::Processing, Some(25)),
    ("reading_files", CanonicalStatus::Processing, Some(25)),
    ("reading_codebase", CanonicalStatus::Processing, Some(25)),
    ("analyzing", CanonicalStatus::Processing, Some(40)),
    ("analysing", CanonicalStatus::Processing, Some(40)),
    ("analyzing_code", CanonicalStatus::Processing, Some(40)),
    ("processing", CanonicalStatus::Processing, Some(50)),
    ("running", CanonicalStatus::Processing, Some(50)),
    ("in_progress", CanonicalStatus::Processing, Some(50)),
    ("refactoring", CanonicalStatus::Processing, Some(60)),
    ("refactoring_code", CanonicalStatus::Processing, Some(60)),
    ("modernizing", CanonicalStatus::Processing, Some(60)),
    ("writing_files", CanonicalStatus::Processing, Some(70)),
    ("writing_code", CanonicalStatus::Processing, Some(70)),
    ("applying_changes", CanonicalStatus::Processing, Some(70)),
    ("grouping_commits", CanonicalStatus::Processing, Some(75)),
    ("committing", CanonicalStatus::Processing, Some(80)),
    ("creating_branch", CanonicalStatus::Processing, Some(80)),
    ("pushing", CanonicalStatus::Processing, Some(85)),
    ("creating_pull_request", CanonicalStatus::Processing, Some(90)),
    // Report
    ("generating_report", CanonicalStatus::GeneratingReport, Some(80)),
    ("report_generation", CanonicalStatus::GeneratingReport, Some(80)),
    ("generating_documentation", CanonicalStatus::GeneratingReport, Some(80)),
    ("writing_report", CanonicalStatus::GeneratingReport, Some(85)),
    ("summarizing", CanonicalStatus::GeneratingReport, Some(85)),
    // Terminal
    ("completed", CanonicalStatus::Completed, Some(100)),
    ("complete", CanonicalStatus::Completed, Some(100)),
    ("done", CanonicalStatus::Completed, Some(100)),
    ("finished", CanonicalStatus::Completed, Some(100)),
    ("success", CanonicalStatus::Completed, Some(100)),
    ("succeeded", CanonicalStatus::Completed, Some(100)),
    ("failed", CanonicalStatus::Failed, None),
    ("failure", CanonicalStatus::Failed, None),
    ("error", CanonicalStatus::Failed, None),
    ("errored", CanonicalStatus::Failed, None),
    ("aborted", CanonicalStatus::Failed, None),
    ("cancelled", CanonicalStatus::Failed, None),
    ("canceled", CanonicalStatus::Failed, None),
    ("timeout", CanonicalStatus::Failed, None),
    ("timed_out", CanonicalStatus::Failed, None),
    ("rejected", CanonicalStatus::Rejected, None),
    ("declined", CanonicalStatus::Rejected, None),
    ("denied", CanonicalStatus::Rejected, None),
];

/// Result of mapping one raw token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusMapping {
    pub status: CanonicalStatus,
    /// Approximate progress for this token, if any
    pub progress: Option<u8>,
    /// False when the token fell through to the `PROCESSING` bucket
    pub recognized: bool,
}

/// Normalize a raw token: trim, lowercase, `-` and spaces become `_`
pub fn normalize_token(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|ch| match ch {
            '-' | ' ' => '_',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

/// Map a raw status token into the canonical vocabulary. Total: never fails.
pub fn map_raw_status(raw: &str) -> StatusMapping {
    let token = normalize_token(raw);
    match RAW_STATUS_TABLE.iter().find(|(known, _, _)| *known == token) {
        Some((_, status, progress)) => StatusMapping {
            status: *status,
            progress: *progress,
            recognized: true,
        },
        None => StatusMapping {
            status: CanonicalStatus::Processing,
            progress: CanonicalStatus::Processing.default_progress(),
            recognized: false,
        },
    }
}
