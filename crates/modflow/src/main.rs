//! Modflow command-line driver
//!
//! Submits analysis jobs to the remote modernization service, follows them
//! until they settle, and walks a project's stage pipeline through the
//! human approval gate.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use modflow_logging::{init_logging, LogConfig};
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;

use cli::context::{CommandContext, GlobalArgs};
use cli::job::SubmitArgs;
use cli::pipeline::PipelineAction;

#[derive(Parser, Debug)]
#[command(name = "modflow", version, about = "Drive remote modernization analysis jobs")]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Configuration file (default: ~/.modflow/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Analysis service URL, overriding config and environment
    #[arg(long = "base-url", global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start an analysis job
    Submit(SubmitArgs),

    /// Follow a job until it finishes or waits for approval
    Watch {
        /// Job ID to follow
        job_id: String,
    },

    /// Approve a job waiting at the approval gate
    Approve {
        /// Job ID to approve
        job_id: String,
        /// Extra instructions sent with the approval
        #[arg(long)]
        instructions: Option<String>,
        /// Follow the job after approving
        #[arg(long)]
        watch: bool,
    },

    /// Reject a job waiting at the approval gate
    Reject {
        /// Job ID to reject
        job_id: String,
    },

    /// Print the report of a completed job
    Report {
        /// Job ID whose report to print
        job_id: String,
    },

    /// Drive or inspect a project's stage pipeline
    Pipeline {
        #[command(subcommand)]
        action: PipelineAction,
    },

    /// Show resolved configuration and paths
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

async fn run_command(command: Commands, global: GlobalArgs) -> Result<ExitCode> {
    if let Commands::Config { json } = command {
        cli::config::run(cli::config::ConfigArgs { json }, &global)?;
        return Ok(ExitCode::SUCCESS);
    }

    let ctx = CommandContext::new(&global)?;
    match command {
        Commands::Submit(args) => cli::job::submit(&ctx, args).await,
        Commands::Watch { job_id } => cli::job::watch(&ctx, &job_id).await,
        Commands::Approve {
            job_id,
            instructions,
            watch,
        } => cli::job::approve(&ctx, &job_id, instructions, watch).await,
        Commands::Reject { job_id } => cli::job::reject(&ctx, &job_id).await,
        Commands::Report { job_id } => cli::job::report(&ctx, &job_id).await,
        Commands::Pipeline { action } => cli::pipeline::run(&ctx, action).await,
        Commands::Config { .. } => Ok(ExitCode::SUCCESS),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match init_logging(LogConfig {
        app_name: "modflow",
        log_dir: Some(modflow_orchestrator::config::logs_dir()),
        verbose: cli.verbose,
    }) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Warning: failed to initialize logging: {:#}", err);
            None
        }
    };

    let global = GlobalArgs {
        config: cli.config,
        base_url: cli.base_url,
    };

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
        .and_then(|runtime| runtime.block_on(run_command(cli.command, global)));

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:?}", err);
            ExitCode::from(1)
        }
    }
}
