//! Pipeline Sequencer
//!
//! Chains the fixed stages of a modernization project. Each stage is one
//! submit → poll → approval cycle, and stage `k+1` can only be started
//! once stage `k` is `COMPLETED`:
//!
//! ```text
//! upload → epics → refinement → planning → features
//! ```
//!
//! Stage status is never stored independently of the job it came from. It
//! is derived from the active job of the current stage every time the
//! sequencer is touched:
//!
//! | Active job | Stage status |
//! |---|---|
//! | at the approval gate | `AWAITING_APPROVAL` |
//! | `COMPLETED` with a report | `COMPLETED` (report kept as the artifact) |
//! | anything else | `IN_PROGRESS` |
//!
//! A project started in an earlier session is picked up with
//! [`PipelineSequencer::resume`], which marks stages whose artifacts the
//! service already holds as completed.

use crate::approval::ApprovalGate;
use crate::error::{OrchestratorError, Result};
use crate::jobs::{AnalysisRequest, JobId, JobRecord, JobRegistry};
use crate::protocol::decode::decode_artifact;
use crate::report::ReportFetcher;
use crate::shared::Shared;
use crate::submitter::JobSubmitter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// One fixed pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDefinition {
    /// Short name used by callers
    pub name: &'static str,
    /// Remote agent that runs the stage
    pub analysis_type: &'static str,
    /// Keys under which the service lists the stage's artifact
    pub artifact_keys: &'static [&'static str],
}

/// All stages, in order
pub const STAGES: &[StageDefinition] = &[
    StageDefinition {
        name: "upload",
        analysis_type: "document_upload",
        artifact_keys: &["upload_summary", "document_analysis"],
    },
    StageDefinition {
        name: "epics",
        analysis_type: "epic_generation",
        artifact_keys: &["epics"],
    },
    StageDefinition {
        name: "refinement",
        analysis_type: "epic_refinement",
        artifact_keys: &["refined_epics", "refinement"],
    },
    StageDefinition {
        name: "planning",
        analysis_type: "allocation_planning",
        artifact_keys: &["allocation_plan", "team_allocation", "planning"],
    },
    StageDefinition {
        name: "features",
        analysis_type: "feature_generation",
        artifact_keys: &["features"],
    },
];

/// Position of a stage by name
pub fn stage_index(name: &str) -> Option<usize> {
    STAGES.iter().position(|stage| stage.name == name)
}

/// Per-stage state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    NotStarted,
    InProgress,
    AwaitingApproval,
    Completed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::InProgress => "IN_PROGRESS",
            Self::AwaitingApproval => "AWAITING_APPROVAL",
            Self::Completed => "COMPLETED",
        }
    }

    fn of(record: &JobRecord) -> Self {
        if record.is_awaiting_approval() {
            Self::AwaitingApproval
        } else if record.report.is_some() {
            Self::Completed
        } else {
            Self::InProgress
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageState {
    pub name: &'static str,
    pub analysis_type: &'static str,
    pub status: StageStatus,
    /// Job currently backing the stage (the latest one after a refine)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    /// Report of the completed job, or the artifact found on resume
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    /// Completed in an earlier session
    pub resumed: bool,
}

/// Snapshot of a project's pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineState {
    pub project: String,
    pub stages: Vec<StageState>,
    /// First stage that is not completed; `None` once every stage is
    pub current: Option<&'static str>,
}

impl PipelineState {
    pub fn stage(&self, name: &str) -> Option<&StageState> {
        self.stages.iter().find(|stage| stage.name == name)
    }

    pub fn current_stage(&self) -> Option<&StageState> {
        self.current.and_then(|name| self.stage(name))
    }

    /// Job backing the current stage
    pub fn active_job(&self) -> Option<&JobId> {
        self.current_stage().and_then(|stage| stage.job_id.as_ref())
    }

    pub fn completed(&self) -> Vec<&'static str> {
        self.stages
            .iter()
            .filter(|stage| stage.status == StageStatus::Completed)
            .map(|stage| stage.name)
            .collect()
    }

    pub fn is_finished(&self) -> bool {
        self.current.is_none()
    }
}

/// Submission parameters shared by every stage of a project
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineRequest {
    pub project: String,
    pub repo_name: Option<String>,
    pub branch_name: Option<String>,
    pub repository_type: Option<String>,
    pub model_name: Option<String>,
    pub use_rag: bool,
}

impl PipelineRequest {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            ..Default::default()
        }
    }

    pub fn with_repo(mut self, repo_name: impl Into<String>) -> Self {
        self.repo_name = Some(repo_name.into());
        self
    }

    pub fn with_branch(mut self, branch_name: impl Into<String>) -> Self {
        self.branch_name = Some(branch_name.into());
        self
    }

    pub fn with_model(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = Some(model_name.into());
        self
    }

    pub fn use_rag(mut self, use_rag: bool) -> Self {
        self.use_rag = use_rag;
        self
    }

    /// Stage jobs always go through the approval gate
    fn stage_request(&self, stage: &StageDefinition, instructions: Option<String>) -> AnalysisRequest {
        AnalysisRequest {
            project: Some(self.project.clone()),
            repo_name: self.repo_name.clone(),
            branch_name: self.branch_name.clone(),
            repository_type: self.repository_type.clone(),
            analysis_type: stage.analysis_type.to_string(),
            instructions,
            model_name: self.model_name.clone(),
            use_rag: self.use_rag,
            report_only: false,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
struct StageSlot {
    status: StageStatus,
    job_id: Option<JobId>,
    artifact: Option<String>,
    resumed: bool,
}

struct PipelineInner {
    request: PipelineRequest,
    slots: Vec<StageSlot>,
}

impl PipelineInner {
    fn new(request: PipelineRequest) -> Self {
        let slots = STAGES
            .iter()
            .map(|_| StageSlot {
                status: StageStatus::NotStarted,
                job_id: None,
                artifact: None,
                resumed: false,
            })
            .collect();
        Self { request, slots }
    }

    fn current_index(&self) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.status != StageStatus::Completed)
    }

    /// Re-derive the current stage from its job. Only the current stage is
    /// looked at, so one call advances the pointer by at most one stage.
    fn sync(&mut self, registry: &JobRegistry) {
        let Some(idx) = self.current_index() else {
            return;
        };
        let slot = &mut self.slots[idx];
        let Some(record) = slot.job_id.as_ref().and_then(|id| registry.get(id)) else {
            return;
        };

        let status = StageStatus::of(&record);
        if status != slot.status {
            debug!(
                "Stage '{}' of '{}': {} → {}",
                STAGES[idx].name, self.request.project, slot.status, status
            );
        }
        slot.status = status;
        if status == StageStatus::Completed {
            slot.artifact = record.report;
            info!(
                "Stage '{}' of project '{}' completed",
                STAGES[idx].name, self.request.project
            );
        }
    }

    /// Current stage and the record of its job
    fn active(&self, registry: &JobRegistry) -> Result<(usize, JobRecord)> {
        let idx = self
            .current_index()
            .ok_or_else(|| OrchestratorError::PipelineFinished(self.request.project.clone()))?;
        let job_id = self.slots[idx]
            .job_id
            .as_ref()
            .ok_or_else(|| OrchestratorError::StageIdle(STAGES[idx].name.to_string()))?;
        let record = registry
            .get(job_id)
            .ok_or_else(|| OrchestratorError::UnknownJob(job_id.clone()))?;
        Ok((idx, record))
    }

    fn track(&mut self, idx: usize, job_id: JobId, registry: &JobRegistry) {
        let slot = &mut self.slots[idx];
        slot.job_id = Some(job_id);
        slot.status = StageStatus::InProgress;
        slot.artifact = None;
        slot.resumed = false;
        self.sync(registry);
    }

    fn snapshot(&self) -> PipelineState {
        let stages = STAGES
            .iter()
            .zip(&self.slots)
            .map(|(stage, slot)| StageState {
                name: stage.name,
                analysis_type: stage.analysis_type,
                status: slot.status,
                job_id: slot.job_id.clone(),
                artifact: slot.artifact.clone(),
                resumed: slot.resumed,
            })
            .collect();
        PipelineState {
            project: self.request.project.clone(),
            stages,
            current: self.current_index().map(|idx| STAGES[idx].name),
        }
    }
}

/// Drives one project through [`STAGES`]. Cheap to clone; clones share state.
///
/// Operations are serialized per project. A stage whose job is still
/// running cannot be started or refined again ([`OrchestratorError::StageBusy`]).
#[derive(Clone)]
pub struct PipelineSequencer {
    project: Arc<str>,
    shared: Arc<Shared>,
    inner: Arc<Mutex<PipelineInner>>,
}

impl fmt::Debug for PipelineSequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineSequencer")
            .field("project", &self.project)
            .finish()
    }
}

impl PipelineSequencer {
    pub(crate) fn new(shared: Arc<Shared>, request: PipelineRequest) -> Self {
        Self {
            project: Arc::from(request.project.as_str()),
            shared,
            inner: Arc::new(Mutex::new(PipelineInner::new(request))),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Current snapshot, re-derived from the active job
    pub async fn state(&self) -> PipelineState {
        let mut inner = self.inner.lock().await;
        inner.sync(&self.shared.registry);
        inner.snapshot()
    }

    /// Mark stages whose artifacts the service already holds as completed,
    /// scanning in order and stopping at the first stage without one
    pub async fn resume(&self) -> Result<PipelineState> {
        let body = self.shared.api.project_artifacts(&self.project).await?;

        let mut inner = self.inner.lock().await;
        let mut restored = Vec::new();
        if let Some(body) = body {
            for (stage, slot) in STAGES.iter().zip(inner.slots.iter_mut()) {
                if slot.status == StageStatus::Completed {
                    continue;
                }
                match decode_artifact(&body, stage.artifact_keys) {
                    Some(artifact) => {
                        slot.status = StageStatus::Completed;
                        slot.artifact = Some(artifact);
                        slot.resumed = true;
                        restored.push(stage.name);
                    }
                    None => break,
                }
            }
        }
        inner.sync(&self.shared.registry);

        if restored.is_empty() {
            info!("Project '{}' has no earlier artifacts", self.project);
        } else {
            info!(
                "Project '{}' resumed with completed stages: {}",
                self.project,
                restored.join(", ")
            );
        }
        Ok(inner.snapshot())
    }

    /// Start the current stage
    pub async fn start_stage(&self, instructions: Option<String>) -> Result<JobId> {
        let name = {
            let mut inner = self.inner.lock().await;
            inner.sync(&self.shared.registry);
            let idx = inner
                .current_index()
                .ok_or_else(|| OrchestratorError::PipelineFinished(self.project.to_string()))?;
            STAGES[idx].name
        };
        self.start_named_stage(name, instructions).await
    }

    /// Start a stage by name. Only the current stage can be started.
    pub async fn start_named_stage(
        &self,
        name: &str,
        instructions: Option<String>,
    ) -> Result<JobId> {
        let idx = stage_index(name).ok_or_else(|| OrchestratorError::UnknownStage(name.to_string()))?;

        let mut inner = self.inner.lock().await;
        inner.sync(&self.shared.registry);

        if inner.slots[idx].status == StageStatus::Completed {
            return Err(OrchestratorError::StageCompleted(name.to_string()));
        }
        let current = inner
            .current_index()
            .ok_or_else(|| OrchestratorError::PipelineFinished(self.project.to_string()))?;
        if idx != current {
            return Err(OrchestratorError::StageLocked(name.to_string()));
        }
        if let Some(job_id) = &inner.slots[idx].job_id {
            let running = self
                .shared
                .registry
                .get(job_id)
                .is_some_and(|record| !record.is_terminal());
            if running {
                return Err(OrchestratorError::StageBusy {
                    stage: name.to_string(),
                    job_id: job_id.clone(),
                });
            }
        }

        let stage = &STAGES[idx];
        let request = inner.request.stage_request(stage, instructions);
        let job_id = JobSubmitter::new(Arc::clone(&self.shared))
            .submit(request, Some(stage.name))
            .await?;
        info!(
            "Stage '{}' of project '{}' started as job {}",
            stage.name, self.project, job_id
        );

        inner.track(idx, job_id.clone(), &self.shared.registry);
        Ok(job_id)
    }

    /// Approve the current stage's job
    pub async fn approve(&self, instructions: Option<String>) -> Result<PipelineState> {
        let mut inner = self.inner.lock().await;
        inner.sync(&self.shared.registry);
        let (_, record) = inner.active(&self.shared.registry)?;

        ApprovalGate::new(Arc::clone(&self.shared))
            .approve(&record.id, instructions)
            .await?;
        inner.sync(&self.shared.registry);
        Ok(inner.snapshot())
    }

    /// Reject the current stage's job. The stage stays current; start or
    /// refine it again to continue.
    pub async fn reject(&self) -> Result<PipelineState> {
        let mut inner = self.inner.lock().await;
        inner.sync(&self.shared.registry);
        let (_, record) = inner.active(&self.shared.registry)?;

        ApprovalGate::new(Arc::clone(&self.shared))
            .reject(&record.id)
            .await?;
        inner.sync(&self.shared.registry);
        Ok(inner.snapshot())
    }

    /// Resubmit the current stage with new instructions. A job at the gate
    /// is rejected first; a failed, timed-out or rejected job is simply
    /// replaced. Completed stages are left untouched.
    pub async fn refine(&self, instructions: impl Into<String>) -> Result<JobId> {
        let instructions = instructions.into();
        let mut inner = self.inner.lock().await;
        inner.sync(&self.shared.registry);
        let (idx, record) = inner.active(&self.shared.registry)?;

        let gate = ApprovalGate::new(Arc::clone(&self.shared));
        let job_id = if record.is_awaiting_approval() {
            gate.refine(&record.id, instructions).await?
        } else if record.is_terminal() {
            gate.resubmit(&record, instructions).await?
        } else {
            return Err(OrchestratorError::StageBusy {
                stage: STAGES[idx].name.to_string(),
                job_id: record.id,
            });
        };

        inner.track(idx, job_id.clone(), &self.shared.registry);
        Ok(job_id)
    }

    /// Re-run the report fetch for a current stage job that completed
    /// without one
    pub async fn retry_report(&self) -> Result<PipelineState> {
        let mut inner = self.inner.lock().await;
        inner.sync(&self.shared.registry);
        let (_, record) = inner.active(&self.shared.registry)?;

        ReportFetcher::new(Arc::clone(&self.shared))
            .retry(&record.id)
            .await?;
        inner.sync(&self.shared.registry);
        Ok(inner.snapshot())
    }

    /// Wait until the current stage's job reaches the approval gate or a
    /// terminal state
    pub async fn wait_for_gate(&self) -> Result<PipelineState> {
        let job_id = {
            let mut inner = self.inner.lock().await;
            inner.sync(&self.shared.registry);
            inner.active(&self.shared.registry)?.1.id
        };

        let mut updates = self.shared.registry.watch(&job_id)?;
        updates
            .wait_for(|record| record.is_terminal() || record.is_awaiting_approval())
            .await
            .map_err(|_| OrchestratorError::UnknownJob(job_id.clone()))?;

        Ok(self.state().await)
    }
}
