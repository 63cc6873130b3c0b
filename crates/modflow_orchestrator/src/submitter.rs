//! Job Submitter
//!
//! Validates a request, calls `POST /start-analysis`, and seeds the first
//! [`JobRecord`] from the schema-flexible response:
//!
//! | Fast mode | Inline report | Seeded status |
//! |---|---|---|
//! | yes | yes | `COMPLETED` (report set, progress 100) |
//! | yes | no | `GENERATING_REPORT` |
//! | no | any | `PENDING_APPROVAL` (inline report kept as draft) |
//!
//! A response without `job_id`/`id` gets a `local-` placeholder id for
//! display. The remote job cannot be tracked, so unless it already completed
//! the record is marked `FAILED` and no poller is armed.

use crate::error::{OrchestratorError, Result};
use crate::jobs::{AnalysisRequest, CanonicalStatus, JobId, JobRecord};
use crate::poller::StatusPoller;
use crate::protocol::decode::{decode_start, StartDecoded};
use crate::protocol::StartAnalysisRequest;
use crate::shared::Shared;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct JobSubmitter {
    shared: Arc<Shared>,
}

impl JobSubmitter {
    pub fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Submit a job, optionally tagged with a pipeline stage
    pub async fn submit(&self, request: AnalysisRequest, stage: Option<&str>) -> Result<JobId> {
        request.validate()?;

        let body = StartAnalysisRequest::from(&request);
        let response = self.shared.api.start_analysis(&body).await?;
        let decoded = decode_start(&response);

        let mut record = seed_record(decoded, request, self.shared.now());
        if let Some(stage) = stage {
            record = record.with_stage(stage);
        }

        let job_id = record.id.clone();
        let status = record.status;
        let arm = !job_id.is_placeholder() && !record.is_terminal();

        if !self.shared.registry.insert(record) {
            warn!("Service reused job id {}", job_id);
            return Err(OrchestratorError::DuplicateJob(job_id));
        }
        info!("Submitted job {} ({})", job_id, status);

        if arm {
            StatusPoller::new(Arc::clone(&self.shared)).arm(&job_id);
        }
        Ok(job_id)
    }
}

fn seed_record(decoded: StartDecoded, request: AnalysisRequest, now: DateTime<Utc>) -> JobRecord {
    let status = match (request.report_only, decoded.report.is_some()) {
        (true, true) => CanonicalStatus::Completed,
        (true, false) => CanonicalStatus::GeneratingReport,
        (false, _) => CanonicalStatus::PendingApproval,
    };

    let id = match decoded.job_id {
        Some(id) => JobId::from_string(id),
        None => JobId::placeholder(),
    };

    let mut record = JobRecord::new(id, request, status, now);
    record.message = decoded.message;
    record.last_raw_status = decoded.raw_status;
    if status == CanonicalStatus::Completed {
        record.report = decoded.report;
    } else {
        record.draft_report = decoded.report;
    }

    if record.id.is_placeholder() && !record.is_terminal() {
        warn!("Start response carried no job id; {} cannot be tracked", record.id);
        record.mark_failed("service returned no job id", now);
    }
    record
}
