//! Report Fetcher
//!
//! Fallback chain for a job that completed without an inline report:
//!
//! 1. `GET /jobs/{id}/report`, first non-empty field among
//!    [`REPORT_FIELDS`](crate::protocol::decode::REPORT_FIELDS)
//! 2. `GET /status/{id}` again, same aliases
//!
//! Every failure along the chain is logged and absorbed. If nothing yields a
//! report the record stays `COMPLETED` with no report, and
//! [`ReportFetcher::retry`] can be called later.

use crate::error::{OrchestratorError, Result};
use crate::jobs::{JobId, JobRecord};
use crate::protocol::decode::decode_report;
use crate::shared::Shared;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub(crate) struct ReportFetcher {
    shared: Arc<Shared>,
}

impl ReportFetcher {
    pub fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Run the fallback chain. `None` when every source came up empty.
    pub async fn fetch(&self, job_id: &JobId) -> Option<String> {
        match self.shared.api.job_report(job_id).await {
            Ok(Some(body)) => match decode_report(&body) {
                Some(report) => return Some(report),
                None => debug!("Report endpoint for job {} had no report field", job_id),
            },
            Ok(None) => debug!("Report endpoint for job {} not available yet", job_id),
            Err(e) => warn!("Report endpoint for job {} failed: {}", job_id, e),
        }

        match self.shared.api.job_status(job_id).await {
            Ok(Some(body)) => {
                let report = decode_report(&body);
                if report.is_none() {
                    debug!("Status endpoint for job {} carried no report", job_id);
                }
                report
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Status re-query for job {} failed: {}", job_id, e);
                None
            }
        }
    }

    /// Fetch again for a `COMPLETED` job whose report is missing. Any other
    /// record is returned unchanged without a network call.
    pub async fn retry(&self, job_id: &JobId) -> Result<JobRecord> {
        let record = self
            .shared
            .registry
            .get(job_id)
            .ok_or_else(|| OrchestratorError::UnknownJob(job_id.clone()))?;
        if !record.is_missing_report() {
            return Ok(record);
        }

        match self.fetch(job_id).await {
            Some(report) => {
                let now = self.shared.now();
                if self
                    .shared
                    .registry
                    .mutate(job_id, |r| r.attach_report(report, now))?
                {
                    info!("Report attached to job {}", job_id);
                }
            }
            None => warn!("Job {} is completed but no report is available", job_id),
        }

        self.shared
            .registry
            .get(job_id)
            .ok_or_else(|| OrchestratorError::UnknownJob(job_id.clone()))
    }
}
