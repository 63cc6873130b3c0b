//! Approval Gate
//!
//! Applies to records with `requires_approval` sitting at
//! `PENDING_APPROVAL`. Every operation fails with
//! [`OrchestratorError::AlreadyTerminal`] on a terminal record and with
//! [`OrchestratorError::NotAwaitingApproval`] on any other non-gated state;
//! nothing is sent to the service in either case.
//!
//! The remote call goes first. The local record changes only once the
//! service accepted the decision, so a failed call leaves the job at the
//! gate and can be retried.
//!
//! A decision claims the gate under the job lock before anything is sent:
//! a concurrent approve/reject on the same job fails with
//! [`OrchestratorError::DecisionInFlight`] without a network call. The poll
//! timer is stopped while the call is out and re-armed if it fails.

use crate::error::{OrchestratorError, Result};
use crate::jobs::{CanonicalStatus, JobId, JobRecord, Observation};
use crate::poller::StatusPoller;
use crate::protocol::decode::decode_update;
use crate::protocol::UpdateJobStatusRequest;
use crate::shared::Shared;
use crate::submitter::JobSubmitter;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub(crate) struct ApprovalGate {
    shared: Arc<Shared>,
}

/// Holds the gate claim; releases it on drop unless the decision was recorded
struct DecisionClaim<'a> {
    gate: &'a ApprovalGate,
    job_id: &'a JobId,
    recorded: bool,
}

impl Drop for DecisionClaim<'_> {
    fn drop(&mut self) {
        if !self.recorded {
            self.gate.abandon(self.job_id);
        }
    }
}

impl ApprovalGate {
    pub fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    fn claim<'a>(&'a self, job_id: &'a JobId) -> Result<DecisionClaim<'a>> {
        self.shared
            .registry
            .get(job_id)
            .ok_or_else(|| OrchestratorError::UnknownJob(job_id.clone()))?
            .ensure_awaiting_approval()?;
        self.shared.registry.mutate(job_id, |r| r.begin_decision())??;
        self.shared.scheduler.stop(job_id);
        Ok(DecisionClaim {
            gate: self,
            job_id,
            recorded: false,
        })
    }

    fn abandon(&self, job_id: &JobId) {
        let released = self.shared.registry.mutate(job_id, |r| {
            r.abandon_decision();
            !r.is_terminal()
        });
        if matches!(released, Ok(true)) {
            debug!("Decision for job {} not recorded, polling resumes", job_id);
            StatusPoller::new(Arc::clone(&self.shared)).arm(job_id);
        }
    }

    /// PENDING_APPROVAL → APPROVED, then drive the job to completion
    pub async fn approve(&self, job_id: &JobId, instructions: Option<String>) -> Result<JobRecord> {
        let mut claim = self.claim(job_id)?;

        let body = UpdateJobStatusRequest::approve(job_id, instructions);
        let response = self.shared.api.update_job_status(&body).await?;

        let now = self.shared.now();
        self.shared.registry.mutate(job_id, |r| r.approve(now))??;
        claim.recorded = true;
        info!("Job {} approved", job_id);

        let poller = StatusPoller::new(Arc::clone(&self.shared));
        let update = decode_update(&response);
        let settled = update.raw_status.as_deref().map(|raw| {
            Observation::from_raw(raw, None).with_message(update.message.clone())
        });

        match settled {
            // The service finished the job while answering
            Some(observation)
                if matches!(
                    observation.status,
                    CanonicalStatus::Completed | CanonicalStatus::Failed
                ) =>
            {
                let seq = self.shared.registry.issue_sequence(job_id)?;
                poller.settle(job_id, seq, observation).await;
            }
            _ => poller.arm(job_id),
        }

        self.shared
            .registry
            .get(job_id)
            .ok_or_else(|| OrchestratorError::UnknownJob(job_id.clone()))
    }

    /// PENDING_APPROVAL → REJECTED. No further calls are made for the job.
    pub async fn reject(&self, job_id: &JobId) -> Result<JobRecord> {
        let mut claim = self.claim(job_id)?;

        let body = UpdateJobStatusRequest::reject(job_id);
        self.shared.api.update_job_status(&body).await?;

        let now = self.shared.now();
        let record = self.shared.registry.mutate(job_id, |r| {
            r.reject(now)?;
            Ok::<_, OrchestratorError>(r.clone())
        })??;
        claim.recorded = true;
        info!("Job {} rejected", job_id);
        Ok(record)
    }

    /// Reject the gated job and resubmit its request with new instructions.
    /// The new job belongs to the same stage.
    pub async fn refine(&self, job_id: &JobId, instructions: String) -> Result<JobId> {
        let record = self.reject(job_id).await?;
        self.resubmit(&record, instructions).await
    }

    /// Submit a fresh job from an earlier record's request
    pub async fn resubmit(&self, record: &JobRecord, instructions: String) -> Result<JobId> {
        let request = record.request.clone().with_instructions(instructions);
        let new_id = JobSubmitter::new(Arc::clone(&self.shared))
            .submit(request, record.stage.as_deref())
            .await?;
        info!("Job {} refined as {}", record.id, new_id);
        Ok(new_id)
    }
}
