//! Orchestrator facade
//!
//! The one entry point callers hold. Cheap to clone; every clone shares the
//! same registry, scheduler and pipelines.
//!
//! ```no_run
//! use modflow_orchestrator::{AnalysisRequest, Orchestrator, OrchestratorConfig};
//!
//! # async fn run() -> modflow_orchestrator::Result<()> {
//! let orchestrator = Orchestrator::new(OrchestratorConfig::default())?;
//! let request = AnalysisRequest::new("refactor", "apollo").with_repo("org/legacy");
//! let job_id = orchestrator.submit(request).await?;
//! let record = orchestrator.wait_for_settled(&job_id).await?;
//! if record.is_awaiting_approval() {
//!     orchestrator.approve(&job_id, None).await?;
//! }
//! # Ok(())
//! # }
//! ```

use crate::approval::ApprovalGate;
use crate::clock::{Clock, SystemClock};
use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, Result};
use crate::jobs::{
    AnalysisRequest, CanonicalStatus, JobId, JobRecord, JobRegistry, Subscription,
};
use crate::pipeline::{PipelineRequest, PipelineSequencer, PipelineState};
use crate::poller::{control_for, StatusPoller};
use crate::protocol::{HttpRemoteApi, RemoteApi};
use crate::report::ReportFetcher;
use crate::scheduler::{Scheduler, TickControl, TokioScheduler};
use crate::shared::Shared;
use crate::submitter::JobSubmitter;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::{info, warn};

/// Client-side orchestration of remote analysis jobs
#[derive(Clone)]
pub struct Orchestrator {
    shared: Arc<Shared>,
    pipelines: Arc<Mutex<HashMap<String, PipelineSequencer>>>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("base_url", &self.shared.config.base_url)
            .field("jobs", &self.shared.registry.len())
            .field("active_pollers", &self.active_pollers())
            .finish()
    }
}

impl Orchestrator {
    /// Orchestrator talking HTTP to `config.base_url`
    pub fn new(config: OrchestratorConfig) -> Result<Self> {
        config.validate()?;
        let api = HttpRemoteApi::new(&config)?;
        Ok(Self::with_api(config, Arc::new(api)))
    }

    /// Orchestrator over any [`RemoteApi`] with the tokio scheduler
    pub fn with_api(config: OrchestratorConfig, api: Arc<dyn RemoteApi>) -> Self {
        Self::with_parts(
            config,
            api,
            Arc::new(TokioScheduler::new()),
            Arc::new(SystemClock),
        )
    }

    /// Fully injected construction
    pub fn with_parts(
        config: OrchestratorConfig,
        api: Arc<dyn RemoteApi>,
        scheduler: Arc<dyn Scheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                api,
                registry: JobRegistry::new(),
                scheduler,
                clock,
            }),
            pipelines: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.shared.config
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.shared.registry
    }

    // ========================================================================
    // Jobs
    // ========================================================================

    /// Validate, start the remote job and arm its poller unless it is
    /// already terminal
    pub async fn submit(&self, request: AnalysisRequest) -> Result<JobId> {
        JobSubmitter::new(Arc::clone(&self.shared))
            .submit(request, None)
            .await
    }

    /// Adopt a job started elsewhere (e.g. an earlier CLI session). Performs
    /// one status refresh and arms the poller unless the job is terminal.
    /// An already tracked id is returned as is.
    pub async fn attach(
        &self,
        job_id: JobId,
        request: Option<AnalysisRequest>,
    ) -> Result<JobRecord> {
        if job_id.is_placeholder() || job_id.as_str().trim().is_empty() {
            return Err(OrchestratorError::Validation(format!(
                "cannot attach to untracked job id '{}'",
                job_id
            )));
        }
        if let Some(existing) = self.shared.registry.get(&job_id) {
            return Ok(existing);
        }

        let record = JobRecord::new(
            job_id.clone(),
            request.unwrap_or_default(),
            CanonicalStatus::Processing,
            self.shared.now(),
        );
        self.shared.registry.insert(record);
        info!("Attached to job {}", job_id);

        let poller = StatusPoller::new(Arc::clone(&self.shared));
        let record = match poller.refresh(&job_id).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Initial status of job {} unavailable: {}", job_id, e);
                self.job_record(&job_id)?
            }
        };
        if control_for(&record) == TickControl::Continue {
            poller.arm(&job_id);
        }
        Ok(record)
    }

    /// One immediate status fetch for a tracked job
    pub async fn refresh(&self, job_id: &JobId) -> Result<JobRecord> {
        StatusPoller::new(Arc::clone(&self.shared))
            .refresh(job_id)
            .await
    }

    /// Re-run the report fetch for a completed job missing its report
    pub async fn retry_report(&self, job_id: &JobId) -> Result<JobRecord> {
        ReportFetcher::new(Arc::clone(&self.shared))
            .retry(job_id)
            .await
    }

    pub fn job(&self, job_id: &JobId) -> Option<JobRecord> {
        self.shared.registry.get(job_id)
    }

    fn job_record(&self, job_id: &JobId) -> Result<JobRecord> {
        self.job(job_id)
            .ok_or_else(|| OrchestratorError::UnknownJob(job_id.clone()))
    }

    /// All tracked jobs, newest first
    pub fn jobs(&self) -> Vec<JobRecord> {
        self.shared.registry.list()
    }

    /// Forget terminal jobs. Returns how many were removed.
    pub fn clear_history(&self) -> usize {
        let removed = self.shared.registry.clear_history();
        if removed > 0 {
            info!("Cleared {} finished job(s)", removed);
        }
        removed
    }

    // ========================================================================
    // Observation
    // ========================================================================

    /// Call `on_update` with every change to the job until the returned
    /// handle is dropped
    pub fn subscribe(
        &self,
        job_id: &JobId,
        on_update: impl Fn(&JobRecord) + Send + Sync + 'static,
    ) -> Result<Subscription> {
        self.shared.registry.subscribe(job_id, on_update)
    }

    /// Receiver that always holds the latest record
    pub fn watch(&self, job_id: &JobId) -> Result<watch::Receiver<JobRecord>> {
        self.shared.registry.watch(job_id)
    }

    /// Wait until the record satisfies `predicate`
    pub async fn wait_until(
        &self,
        job_id: &JobId,
        predicate: impl FnMut(&JobRecord) -> bool,
    ) -> Result<JobRecord> {
        let mut updates = self.watch(job_id)?;
        let record = updates
            .wait_for(predicate)
            .await
            .map_err(|_| OrchestratorError::UnknownJob(job_id.clone()))?
            .clone();
        Ok(record)
    }

    /// Wait until the job is terminal or waiting at the approval gate
    pub async fn wait_for_settled(&self, job_id: &JobId) -> Result<JobRecord> {
        self.wait_until(job_id, |r| r.is_terminal() || r.is_awaiting_approval())
            .await
    }

    // ========================================================================
    // Approval gate
    // ========================================================================

    pub async fn approve(&self, job_id: &JobId, instructions: Option<String>) -> Result<JobRecord> {
        ApprovalGate::new(Arc::clone(&self.shared))
            .approve(job_id, instructions)
            .await
    }

    pub async fn reject(&self, job_id: &JobId) -> Result<JobRecord> {
        ApprovalGate::new(Arc::clone(&self.shared))
            .reject(job_id)
            .await
    }

    /// Reject a gated job and resubmit it with new instructions
    pub async fn refine(&self, job_id: &JobId, instructions: impl Into<String>) -> Result<JobId> {
        ApprovalGate::new(Arc::clone(&self.shared))
            .refine(job_id, instructions.into())
            .await
    }

    // ========================================================================
    // Timers
    // ========================================================================

    /// Disarm the job's poller. Safe to call from any path, any number of times.
    pub fn stop(&self, job_id: &JobId) -> bool {
        self.shared.scheduler.stop(job_id)
    }

    pub fn is_polling(&self, job_id: &JobId) -> bool {
        self.shared.scheduler.is_active(job_id)
    }

    pub fn active_pollers(&self) -> usize {
        self.shared.scheduler.active_count()
    }

    // ========================================================================
    // Pipelines
    // ========================================================================

    /// Sequencer for `request.project`, created on first use
    pub fn pipeline(&self, request: PipelineRequest) -> PipelineSequencer {
        let mut pipelines = self.pipelines.lock().unwrap_or_else(PoisonError::into_inner);
        pipelines
            .entry(request.project.clone())
            .or_insert_with(|| PipelineSequencer::new(Arc::clone(&self.shared), request))
            .clone()
    }

    /// Pipeline state of a project. A project not seen in this session is
    /// resumed from the artifacts the service holds.
    pub async fn get_stage(&self, project: &str) -> Result<PipelineState> {
        let existing = self
            .pipelines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(project)
            .cloned();
        match existing {
            Some(sequencer) => Ok(sequencer.state().await),
            None => self.pipeline(PipelineRequest::new(project)).resume().await,
        }
    }
}
