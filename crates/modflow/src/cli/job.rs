//! Job commands - submit, watch, approve, reject and fetch reports
//!
//! Each invocation is a fresh process, so commands on an existing job id
//! first attach to it (one status refresh) before acting.

use crate::cli::context::CommandContext;
use crate::cli::error::HelpfulError;
use crate::cli::output::{exit_code_for, status_line};
use anyhow::Result;
use clap::Args;
use modflow_orchestrator::{AnalysisRequest, JobId, JobRecord};
use std::process::ExitCode;
use tracing::debug;

/// Arguments for `modflow submit`
#[derive(Args, Debug, Clone)]
pub struct SubmitArgs {
    /// Project the analysis belongs to
    #[arg(long)]
    pub project: String,

    /// Remote agent to run (e.g. refactor, epic_generation)
    #[arg(long = "analysis-type")]
    pub analysis_type: String,

    /// Repository to analyze
    #[arg(long)]
    pub repo: Option<String>,

    /// Branch of the repository
    #[arg(long)]
    pub branch: Option<String>,

    /// Repository host kind (e.g. github, gitlab)
    #[arg(long = "repository-type")]
    pub repository_type: Option<String>,

    /// Extra instructions for the agent
    #[arg(long)]
    pub instructions: Option<String>,

    /// Model the agent should use
    #[arg(long)]
    pub model: Option<String>,

    /// Only produce a report; skips the approval gate
    #[arg(long = "report-only")]
    pub report_only: bool,

    /// Let the agent use retrieval over project documents
    #[arg(long)]
    pub rag: bool,

    /// Ask the service to return the list of touched files
    #[arg(long = "list-files")]
    pub list_files: bool,

    /// Restrict the analysis to these files (repeatable)
    #[arg(long = "file")]
    pub files: Vec<String>,

    /// Follow the job after submitting
    #[arg(long)]
    pub watch: bool,
}

impl SubmitArgs {
    fn to_request(&self) -> AnalysisRequest {
        let mut request = AnalysisRequest::new(&self.analysis_type, &self.project)
            .report_only(self.report_only)
            .use_rag(self.rag)
            .return_file_list(self.list_files)
            .with_files(self.files.iter().cloned());
        request.repo_name = self.repo.clone();
        request.branch_name = self.branch.clone();
        request.repository_type = self.repository_type.clone();
        request.instructions = self.instructions.clone();
        request.model_name = self.model.clone();
        request
    }
}

pub async fn submit(ctx: &CommandContext, args: SubmitArgs) -> Result<ExitCode> {
    let job_id = ctx
        .orchestrator
        .submit(args.to_request())
        .await
        .map_err(|e| ctx.explain(e))?;
    println!("Submitted job {}", job_id);

    let record = job_record(ctx, &job_id)?;
    if args.watch {
        return follow(ctx, &job_id).await;
    }
    println!("{}", status_line(&record));
    print_next_step(&record);
    Ok(exit_code_for(&record))
}

pub async fn watch(ctx: &CommandContext, job_id: &str) -> Result<ExitCode> {
    let record = ctx.attach(job_id).await?;
    follow(ctx, &record.id).await
}

pub async fn approve(
    ctx: &CommandContext,
    job_id: &str,
    instructions: Option<String>,
    watch: bool,
) -> Result<ExitCode> {
    let record = ctx.attach(job_id).await?;
    let record = ctx
        .orchestrator
        .approve(&record.id, instructions)
        .await
        .map_err(|e| ctx.explain(e))?;
    println!("Approved job {}", record.id);

    if watch {
        return follow(ctx, &record.id).await;
    }
    println!("{}", status_line(&record));
    Ok(exit_code_for(&record))
}

pub async fn reject(ctx: &CommandContext, job_id: &str) -> Result<ExitCode> {
    let record = ctx.attach(job_id).await?;
    let record = ctx
        .orchestrator
        .reject(&record.id)
        .await
        .map_err(|e| ctx.explain(e))?;
    println!("Rejected job {}", record.id);
    Ok(ExitCode::SUCCESS)
}

/// Print the report of a completed job, retrying the fetch once if the
/// status answer did not carry it
pub async fn report(ctx: &CommandContext, job_id: &str) -> Result<ExitCode> {
    let record = ctx.attach(job_id).await?;
    ctx.orchestrator.stop(&record.id);

    let record = if record.is_missing_report() {
        ctx.orchestrator
            .retry_report(&record.id)
            .await
            .map_err(|e| ctx.explain(e))?
    } else {
        record
    };

    match record.report.as_deref() {
        Some(report) => {
            println!("{}", report);
            Ok(ExitCode::SUCCESS)
        }
        None => Err(HelpfulError::report_unavailable(&record.id, record.status).into()),
    }
}

/// Stream status lines until the job settles, then print the result
pub async fn follow(ctx: &CommandContext, job_id: &JobId) -> Result<ExitCode> {
    let mut updates = ctx.orchestrator.watch(job_id).map_err(|e| ctx.explain(e))?;
    let mut last_line = String::new();

    let record = loop {
        let record = updates.borrow_and_update().clone();
        let line = status_line(&record);
        if line != last_line {
            println!("{}", line);
            last_line = line;
        }
        if record.is_terminal() || gate_ready(&record) {
            break record;
        }
        if updates.changed().await.is_err() {
            debug!("Registry dropped job {} while watching", job_id);
            break record;
        }
    };

    print_result(&record);
    Ok(exit_code_for(&record))
}

/// At the gate with something from the service to decide on: the plan, or
/// at least a status the service reported itself
fn gate_ready(record: &JobRecord) -> bool {
    record.is_awaiting_approval()
        && (record.draft_report.is_some() || record.last_raw_status.is_some())
}

fn job_record(ctx: &CommandContext, job_id: &JobId) -> Result<JobRecord> {
    ctx.orchestrator
        .job(job_id)
        .ok_or_else(|| anyhow::anyhow!("Job {} disappeared from the registry", job_id))
}

fn print_result(record: &JobRecord) {
    if let Some(report) = &record.report {
        println!();
        println!("{}", report);
    } else if let Some(error) = &record.error {
        eprintln!("Job {} ended {}: {}", record.id, record.status, error);
    }
    print_next_step(record);
}

fn print_next_step(record: &JobRecord) {
    if record.is_awaiting_approval() {
        if let Some(draft) = &record.draft_report {
            println!();
            println!("{}", draft);
        }
        println!();
        println!("Job {} is waiting for approval:", record.id);
        println!("  modflow approve {} [--instructions \"...\"]", record.id);
        println!("  modflow reject {}", record.id);
    } else if record.is_missing_report() {
        println!("Report not published yet; retry with: modflow report {}", record.id);
    } else if record.id.is_placeholder() {
        println!("The service did not return a job id; the job cannot be followed");
    }
}
