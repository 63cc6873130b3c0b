//! Pipeline commands - drive a project through its stages
//!
//! `pipeline run` resumes the project from the artifacts the service holds,
//! then walks the remaining stages. Every stage stops at the approval gate
//! and asks on stdin what to do.

use crate::cli::context::CommandContext;
use crate::cli::output::{exit_code_for, print_pipeline, status_line};
use anyhow::{bail, Result};
use clap::Subcommand;
use modflow_orchestrator::{PipelineRequest, PipelineSequencer, PipelineState, StageStatus};
use std::io::Write;
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

/// Subcommands for pipeline management
#[derive(Subcommand, Debug, Clone)]
pub enum PipelineAction {
    /// Resume the project and drive each remaining stage interactively
    Run {
        /// Project to drive
        #[arg(long)]
        project: String,
        /// Repository the stages work on
        #[arg(long)]
        repo: Option<String>,
        /// Branch of the repository
        #[arg(long)]
        branch: Option<String>,
        /// Model the agents should use
        #[arg(long)]
        model: Option<String>,
        /// Let the agents use retrieval over project documents
        #[arg(long)]
        rag: bool,
    },
    /// Show which stages are completed
    Status {
        /// Project to inspect
        #[arg(long)]
        project: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn run(ctx: &CommandContext, action: PipelineAction) -> Result<ExitCode> {
    match action {
        PipelineAction::Run {
            project,
            repo,
            branch,
            model,
            rag,
        } => {
            let mut request = PipelineRequest::new(project).use_rag(rag);
            request.repo_name = repo;
            request.branch_name = branch;
            request.model_name = model;
            drive(ctx, request).await
        }
        PipelineAction::Status { project, json } => {
            let state = ctx
                .orchestrator
                .get_stage(&project)
                .await
                .map_err(|e| ctx.explain(e))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&state)?);
            } else {
                print_pipeline(&state);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// What the user chose at the gate
#[derive(Debug, Clone, PartialEq, Eq)]
enum GateChoice {
    Approve(Option<String>),
    Reject,
    Refine(String),
    Quit,
}

fn parse_choice(line: &str) -> Option<GateChoice> {
    let line = line.trim();
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };
    let rest = (!rest.is_empty()).then(|| rest.to_string());
    match command.to_ascii_lowercase().as_str() {
        "a" | "approve" => Some(GateChoice::Approve(rest)),
        "r" | "reject" => Some(GateChoice::Reject),
        "f" | "refine" => rest.map(GateChoice::Refine),
        "q" | "quit" => Some(GateChoice::Quit),
        _ => None,
    }
}

struct Prompt {
    lines: Lines<BufReader<Stdin>>,
}

impl Prompt {
    fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    async fn ask(&mut self, stage: &str) -> Result<GateChoice> {
        loop {
            println!();
            println!("Stage '{}' is waiting for approval.", stage);
            println!("  a [instructions]   approve");
            println!("  r                  reject");
            println!("  f <instructions>   refine and resubmit");
            println!("  q                  quit (the job stays at the gate)");
            print!("> ");
            std::io::stdout().flush()?;

            let Some(line) = self.lines.next_line().await? else {
                return Ok(GateChoice::Quit);
            };
            match parse_choice(&line) {
                Some(choice) => return Ok(choice),
                None => println!("Unrecognized answer: {}", line.trim()),
            }
        }
    }
}

async fn drive(ctx: &CommandContext, request: PipelineRequest) -> Result<ExitCode> {
    let sequencer = ctx.orchestrator.pipeline(request);
    let state = sequencer.resume().await.map_err(|e| ctx.explain(e))?;
    print_pipeline(&state);

    let mut prompt = Prompt::new();
    loop {
        let state = sequencer.state().await;
        let Some(stage) = state.current_stage().cloned() else {
            println!("Pipeline for '{}' finished", state.project);
            return Ok(ExitCode::SUCCESS);
        };

        let record = stage
            .job_id
            .as_ref()
            .and_then(|job_id| ctx.orchestrator.job(job_id));
        let Some(record) = record else {
            let job_id = sequencer
                .start_stage(None)
                .await
                .map_err(|e| ctx.explain(e))?;
            println!("Stage '{}' started as job {}", stage.name, job_id);
            continue;
        };

        if record.is_awaiting_approval() {
            let record = match record.draft_report {
                Some(_) => record,
                None => ctx.orchestrator.refresh(&record.id).await.unwrap_or(record),
            };
            if !record.is_awaiting_approval() {
                continue;
            }
            match &record.draft_report {
                Some(draft) => {
                    println!();
                    println!("{}", draft);
                }
                None => println!("The service has not published a plan for job {} yet", record.id),
            }
            match prompt.ask(stage.name).await? {
                GateChoice::Approve(instructions) => {
                    sequencer
                        .approve(instructions)
                        .await
                        .map_err(|e| ctx.explain(e))?;
                }
                GateChoice::Reject => {
                    sequencer.reject().await.map_err(|e| ctx.explain(e))?;
                    println!("Stage '{}' rejected; stopping here", stage.name);
                    return Ok(ExitCode::from(4));
                }
                GateChoice::Refine(instructions) => {
                    let job_id = sequencer
                        .refine(instructions)
                        .await
                        .map_err(|e| ctx.explain(e))?;
                    println!("Stage '{}' resubmitted as job {}", stage.name, job_id);
                }
                GateChoice::Quit => {
                    println!("Job {} left at the approval gate", record.id);
                    return Ok(ExitCode::SUCCESS);
                }
            }
        } else if !record.is_terminal() {
            let state = wait_for_gate(&sequencer, ctx).await?;
            report_stage(&state, stage.name);
        } else if record.is_missing_report() {
            let state = sequencer
                .retry_report()
                .await
                .map_err(|e| ctx.explain(e))?;
            if state.stage(stage.name).map(|s| s.status) != Some(StageStatus::Completed) {
                bail!(
                    "Stage '{}' completed without a report; retry with: modflow pipeline run --project {}",
                    stage.name,
                    state.project
                );
            }
        } else {
            // Failed or timed out after approval
            println!("{}", status_line(&record));
            return Ok(exit_code_for(&record));
        }
    }
}

async fn wait_for_gate(sequencer: &PipelineSequencer, ctx: &CommandContext) -> Result<PipelineState> {
    let job_id = sequencer.state().await.active_job().cloned();
    if let Some(job_id) = &job_id {
        if let Some(record) = ctx.orchestrator.job(job_id) {
            println!("{}", status_line(&record));
        }
    }
    let state = sequencer.wait_for_gate().await.map_err(|e| ctx.explain(e))?;
    if let Some(record) = job_id.and_then(|id| ctx.orchestrator.job(&id)) {
        println!("{}", status_line(&record));
    }
    Ok(state)
}

fn report_stage(state: &PipelineState, stage: &str) {
    if let Some(done) = state.stage(stage).filter(|s| s.status == StageStatus::Completed) {
        println!("Stage '{}' completed", done.name);
        if let Some(artifact) = &done.artifact {
            println!();
            println!("{}", artifact);
        }
    }
}
