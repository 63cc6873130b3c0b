//! Submission descriptor
//!
//! What the caller asks for. Retained on the [`super::JobRecord`] so a job can
//! be refined or resubmitted with new instructions.

use crate::error::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};

/// Request descriptor for one analysis job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Project identifier (`projeto`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    /// Repository to analyze (`repo_name_modernizado`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,

    /// Target branch (`branch_name_modernizado`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,

    /// Repository host kind, e.g. "github" or "azure"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_type: Option<String>,

    /// Remote agent to run
    pub analysis_type: String,

    /// Free-text instructions (`instrucoes_extras`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Model selection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,

    /// Ask the service to use retrieval augmentation
    #[serde(default)]
    pub use_rag: bool,

    /// Fast mode: produce the report only, no approval gate
    #[serde(default)]
    pub report_only: bool,

    /// Ask the service to return the list of touched files
    #[serde(default)]
    pub return_file_list: bool,

    /// Restrict the analysis to these files
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

impl AnalysisRequest {
    /// Create a request for an analysis type against a project
    pub fn new(analysis_type: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            analysis_type: analysis_type.into(),
            project: Some(project.into()),
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

    pub fn with_repository_type(mut self, kind: impl Into<String>) -> Self {
        self.repository_type = Some(kind.into());
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_model(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = Some(model_name.into());
        self
    }

    pub fn with_files(mut self, files: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.files.extend(files.into_iter().map(Into::into));
        self
    }

    /// Set fast mode
    pub fn report_only(mut self, report_only: bool) -> Self {
        self.report_only = report_only;
        self
    }

    pub fn use_rag(mut self, use_rag: bool) -> Self {
        self.use_rag = use_rag;
        self
    }

    pub fn return_file_list(mut self, return_file_list: bool) -> Self {
        self.return_file_list = return_file_list;
        self
    }

    /// Jobs outside fast mode stop at the approval gate
    pub fn requires_approval(&self) -> bool {
        !self.report_only
    }

    /// Project or repository, whichever identifies the target
    pub fn target(&self) -> Option<&str> {
        non_blank(self.project.as_deref()).or_else(|| non_blank(self.repo_name.as_deref()))
    }

    /// Check mandatory fields. Runs before any network call.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.analysis_type.trim().is_empty() {
            missing.push("analysis_type");
        }
        if self.target().is_none() {
            missing.push("project or repo_name");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(OrchestratorError::Validation(format!(
                "missing mandatory field(s): {}",
                missing.join(", ")
            )))
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
