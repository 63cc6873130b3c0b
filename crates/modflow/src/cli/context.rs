//! Per-invocation context: resolved configuration and the orchestrator

use crate::cli::error::explain;
use anyhow::{Context, Result};
use modflow_orchestrator::{JobId, JobRecord, Orchestrator, OrchestratorConfig};
use std::path::{Path, PathBuf};

/// Flags shared by every command
#[derive(Debug, Clone, Default)]
pub struct GlobalArgs {
    pub config: Option<PathBuf>,
    pub base_url: Option<String>,
}

/// Defaults → config file → environment → command-line flags
pub fn resolve_config(args: &GlobalArgs) -> Result<OrchestratorConfig> {
    let mut config = OrchestratorConfig::load(args.config.as_deref())
        .with_context(|| describe_source(args.config.as_deref()))?;
    if let Some(base_url) = &args.base_url {
        config.base_url = base_url.clone();
    }
    config.validate()?;
    Ok(config)
}

fn describe_source(path: Option<&Path>) -> String {
    match path {
        Some(path) => format!("Failed to load configuration from {}", path.display()),
        None => "Failed to load configuration".to_string(),
    }
}

pub struct CommandContext {
    pub orchestrator: Orchestrator,
}

impl CommandContext {
    pub fn new(args: &GlobalArgs) -> Result<Self> {
        let config = resolve_config(args)?;
        let orchestrator = Orchestrator::new(config)?;
        Ok(Self { orchestrator })
    }

    pub fn base_url(&self) -> &str {
        &self.orchestrator.config().base_url
    }

    /// Map an orchestration error to a helpful one
    pub fn explain(&self, err: modflow_orchestrator::OrchestratorError) -> anyhow::Error {
        explain(err, self.base_url())
    }

    /// Track a job started by an earlier invocation
    pub async fn attach(&self, job_id: &str) -> Result<JobRecord> {
        self.orchestrator
            .attach(JobId::from_string(job_id), None)
            .await
            .map_err(|e| self.explain(e))
    }
}
