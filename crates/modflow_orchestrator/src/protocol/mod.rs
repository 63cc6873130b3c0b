//! Remote HTTP contract
//!
//! Request bodies are typed and keep the service's exact field names.
//! Response bodies are handed back as raw JSON and decoded by the ordered
//! fallback decoders in [`decode`], because the service does not use one
//! fixed schema across analysis types.
//!
//! | Call | Endpoint |
//! |---|---|
//! | start | `POST /start-analysis` |
//! | status | `GET /status/{job_id}` |
//! | report | `GET /jobs/{job_id}/report` |
//! | approve / reject | `POST /update-job-status` |
//! | project artifacts | `GET /projects/{projeto}/artifacts` |

pub mod decode;
mod http;

pub use http::HttpRemoteApi;

use crate::jobs::{AnalysisRequest, JobId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const START_ANALYSIS_PATH: &str = "start-analysis";
pub const STATUS_PATH: &str = "status";
pub const JOBS_PATH: &str = "jobs";
pub const REPORT_SEGMENT: &str = "report";
pub const UPDATE_JOB_STATUS_PATH: &str = "update-job-status";
pub const PROJECTS_PATH: &str = "projects";
pub const ARTIFACTS_SEGMENT: &str = "artifacts";

/// Transport-level failures
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection, DNS, TLS or timeout failure
    #[error("network error: {0}")]
    Network(String),

    /// Non-2xx answer (404 on reads is not an error, see [`RemoteApi`])
    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },

    /// Body was not JSON
    #[error("invalid response body: {0}")]
    Decode(String),

    /// Base URL cannot carry path segments
    #[error("invalid base URL: {0}")]
    InvalidUrl(String),
}

impl TransportError {
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Body of `POST /start-analysis`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartAnalysisRequest {
    pub repo_name_modernizado: Option<String>,
    pub branch_name_modernizado: Option<String>,
    pub repository_type: Option<String>,
    pub projeto: Option<String>,
    pub analysis_type: String,
    pub instrucoes_extras: Option<String>,
    pub usar_rag: bool,
    pub gerar_relatorio_apenas: bool,
    pub retornar_lista_arquivos: bool,
    pub model_name: Option<String>,
    pub arquivos_especificos: Vec<String>,
}

impl From<&AnalysisRequest> for StartAnalysisRequest {
    fn from(req: &AnalysisRequest) -> Self {
        Self {
            repo_name_modernizado: req.repo_name.clone(),
            branch_name_modernizado: req.branch_name.clone(),
            repository_type: req.repository_type.clone(),
            projeto: req.project.clone(),
            analysis_type: req.analysis_type.clone(),
            instrucoes_extras: req.instructions.clone(),
            usar_rag: req.use_rag,
            gerar_relatorio_apenas: req.report_only,
            retornar_lista_arquivos: req.return_file_list,
            model_name: req.model_name.clone(),
            arquivos_especificos: req.files.clone(),
        }
    }
}

/// Decision sent to `POST /update-job-status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalAction {
    Approve,
    Reject,
}

/// Body of `POST /update-job-status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateJobStatusRequest {
    pub job_id: String,
    pub action: ApprovalAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instrucoes_extras: Option<String>,
}

impl UpdateJobStatusRequest {
    pub fn approve(job_id: &JobId, instructions: Option<String>) -> Self {
        Self {
            job_id: job_id.to_string(),
            action: ApprovalAction::Approve,
            instrucoes_extras: instructions,
        }
    }

    pub fn reject(job_id: &JobId) -> Self {
        Self {
            job_id: job_id.to_string(),
            action: ApprovalAction::Reject,
            instrucoes_extras: None,
        }
    }
}

/// The remote service as the orchestrator sees it.
///
/// Reads return `Ok(None)` on 404 ("not yet available"). Any other non-2xx
/// answer is a [`TransportError::Status`].
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn start_analysis(&self, body: &StartAnalysisRequest) -> Result<Value, TransportError>;

    async fn job_status(&self, job_id: &JobId) -> Result<Option<Value>, TransportError>;

    async fn job_report(&self, job_id: &JobId) -> Result<Option<Value>, TransportError>;

    async fn update_job_status(
        &self,
        body: &UpdateJobStatusRequest,
    ) -> Result<Value, TransportError>;

    async fn project_artifacts(&self, project: &str) -> Result<Option<Value>, TransportError>;
}
