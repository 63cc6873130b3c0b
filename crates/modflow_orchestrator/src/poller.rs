//! Status Poller
//!
//! Drives a non-terminal job to a terminal state, one `GET /status/{id}`
//! per tick.
//!
//! # Tick
//!
//! 1. Stop if the record is gone or terminal. A job waiting at the approval
//!    gate is still polled so its plan and any remote failure reach the
//!    record while the human decides.
//! 2. Past the deadline: mark `TIMED_OUT` and stop.
//! 3. Reserve a sequence number, then fetch status bounded by the time left.
//! 4. Decode, map the raw token, fetch the report if the job completed
//!    without one, and apply under the reserved sequence number.
//!
//! Transport errors, 404s and undecodable bodies are logged and retried on
//! the next tick. Only the deadline turns them into a terminal state.

use crate::error::{OrchestratorError, Result};
use crate::jobs::{CanonicalStatus, JobId, JobRecord, Observation};
use crate::protocol::decode::decode_status;
use crate::report::ReportFetcher;
use crate::scheduler::{TickControl, TickFn};
use crate::shared::Shared;
use futures::FutureExt;
use serde_json::Value;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub(crate) struct StatusPoller {
    shared: Arc<Shared>,
}

impl StatusPoller {
    pub fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Arm (or re-arm) the poll timer with a fresh deadline
    pub fn arm(&self, job_id: &JobId) {
        if job_id.is_placeholder() {
            debug!("Not polling placeholder job {}", job_id);
            return;
        }

        let deadline = Instant::now() + self.shared.config.timeout();
        let poller = self.clone();
        let id = job_id.clone();
        let on_tick: TickFn = Arc::new(move || {
            let poller = poller.clone();
            let id = id.clone();
            async move { poller.tick(&id, deadline).await }.boxed()
        });

        self.shared
            .scheduler
            .start(job_id, self.shared.config.poll_interval(), on_tick);
    }

    async fn tick(&self, job_id: &JobId, deadline: Instant) -> TickControl {
        let Some(record) = self.shared.registry.get(job_id) else {
            return TickControl::Stop;
        };
        if control_for(&record) == TickControl::Stop {
            return TickControl::Stop;
        }

        let now = Instant::now();
        if now >= deadline {
            self.time_out(job_id);
            return TickControl::Stop;
        }

        let seq = match self.shared.registry.issue_sequence(job_id) {
            Ok(seq) => seq,
            Err(_) => return TickControl::Stop,
        };

        let call = self.shared.api.job_status(job_id);
        let body = match tokio::time::timeout(deadline - now, call).await {
            Err(_) => {
                self.time_out(job_id);
                return TickControl::Stop;
            }
            Ok(Err(e)) => {
                warn!("Status poll for job {} failed, retrying next tick: {}", job_id, e);
                return TickControl::Continue;
            }
            Ok(Ok(None)) => {
                debug!("Status for job {} not available yet", job_id);
                return TickControl::Continue;
            }
            Ok(Ok(Some(body))) => body,
        };

        self.observe(job_id, seq, &body).await
    }

    /// Decode a status body and apply it under `seq`
    pub async fn observe(&self, job_id: &JobId, seq: u64, body: &Value) -> TickControl {
        let decoded = match decode_status(body) {
            Ok(decoded) => decoded,
            Err(mismatch) => {
                debug!("Ignoring status body for job {}: {}", job_id, mismatch);
                return TickControl::Continue;
            }
        };
        debug!(
            "Job {} raw status '{}' progress {:?}",
            job_id, decoded.raw_status, decoded.progress
        );

        let observation = Observation::from_raw(&decoded.raw_status, decoded.progress)
            .with_message(decoded.message)
            .with_report(decoded.report);
        self.settle(job_id, seq, observation).await
    }

    /// Apply an observation, fetching the report first when the job
    /// completed without one so watchers see both in a single update
    pub async fn settle(
        &self,
        job_id: &JobId,
        seq: u64,
        mut observation: Observation,
    ) -> TickControl {
        if observation.status == CanonicalStatus::Completed && observation.report.is_none() {
            observation.report = ReportFetcher::new(Arc::clone(&self.shared))
                .fetch(job_id)
                .await;
        }

        let now = self.shared.now();
        let applied = self.shared.registry.apply(job_id, seq, |record| {
            let changed = record.apply(observation, now);
            (changed, record.clone())
        });

        match applied {
            Ok(Some((changed, record))) => {
                if changed {
                    log_transition(&record);
                }
                control_for(&record)
            }
            Ok(None) => match self.shared.registry.get(job_id) {
                Some(record) => control_for(&record),
                None => TickControl::Stop,
            },
            Err(_) => TickControl::Stop,
        }
    }

    /// One immediate status fetch through the tick's apply path. Terminal
    /// records are returned without a call; transport errors surface.
    pub async fn refresh(&self, job_id: &JobId) -> Result<JobRecord> {
        let record = self.record(job_id)?;
        if record.is_terminal() || job_id.is_placeholder() {
            return Ok(record);
        }

        let seq = self.shared.registry.issue_sequence(job_id)?;
        if let Some(body) = self.shared.api.job_status(job_id).await? {
            self.observe(job_id, seq, &body).await;
        }
        self.record(job_id)
    }

    fn time_out(&self, job_id: &JobId) {
        let timeout = self.shared.config.timeout();
        let now = self.shared.now();
        let marked = self.shared.registry.mutate(job_id, |r| {
            r.mark_timed_out(
                format!("no terminal status within {}s", timeout.as_secs()),
                now,
            )
        });
        if matches!(marked, Ok(true)) {
            warn!("Job {} timed out after {:?}", job_id, timeout);
        }
    }

    fn record(&self, job_id: &JobId) -> Result<JobRecord> {
        self.shared
            .registry
            .get(job_id)
            .ok_or_else(|| OrchestratorError::UnknownJob(job_id.clone()))
    }
}

/// Polling continues until the job is terminal
pub(crate) fn control_for(record: &JobRecord) -> TickControl {
    if record.is_terminal() {
        TickControl::Stop
    } else {
        TickControl::Continue
    }
}

fn log_transition(record: &JobRecord) {
    match record.status {
        CanonicalStatus::Completed if record.report.is_none() => {
            warn!("Job {} completed without a report", record.id)
        }
        CanonicalStatus::Completed => info!("Job {} completed", record.id),
        CanonicalStatus::Failed => info!(
            "Job {} failed: {}",
            record.id,
            record.error.as_deref().unwrap_or("unknown error")
        ),
        CanonicalStatus::Rejected => info!("Job {} rejected by the service", record.id),
        CanonicalStatus::PendingApproval if record.requires_approval => {
            info!("Job {} awaiting approval", record.id)
        }
        _ => debug!(
            "Job {} is {} ({}%)",
            record.id, record.status, record.progress
        ),
    }
}
