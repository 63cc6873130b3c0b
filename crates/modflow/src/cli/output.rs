//! Output formatting utilities for CLI commands
//!
//! Provides consistent formatting for:
//! - Tables with column alignment
//! - Job status lines and progress bars
//! - Exit codes derived from job outcomes

use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use modflow_orchestrator::{JobOutcome, JobRecord, PipelineState, StageStatus};
use std::process::ExitCode;

const BAR_WIDTH: usize = 20;

/// Print a table with custom column colors
pub fn print_table_colored(headers: &[&str], rows: Vec<Vec<(String, Option<Color>)>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header_cells: Vec<Cell> = headers
        .iter()
        .map(|h| Cell::new(h).fg(Color::Cyan))
        .collect();
    table.set_header(header_cells);

    for row in rows {
        let cells: Vec<Cell> = row
            .into_iter()
            .map(|(text, color)| {
                let cell = Cell::new(text);
                if let Some(c) = color {
                    cell.fg(c)
                } else {
                    cell
                }
            })
            .collect();
        table.add_row(cells);
    }

    println!("{}", table);
}

/// Text progress bar, e.g. `[#########-----------]  45%`
pub fn progress_bar(progress: u8) -> String {
    let progress = progress.min(100) as usize;
    let filled = progress * BAR_WIDTH / 100;
    format!(
        "[{}{}] {:>3}%",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled),
        progress
    )
}

/// One-line summary of a job, used while watching
pub fn status_line(record: &JobRecord) -> String {
    let mut line = format!(
        "{} {:<17} {}",
        progress_bar(record.progress),
        record.status.as_str(),
        record.id
    );
    if let Some(message) = record.message.as_deref().or(record.error.as_deref()) {
        line.push_str("  ");
        line.push_str(message);
    }
    line
}

fn stage_color(status: StageStatus) -> Option<Color> {
    match status {
        StageStatus::Completed => Some(Color::Green),
        StageStatus::AwaitingApproval => Some(Color::Yellow),
        StageStatus::InProgress => Some(Color::Blue),
        StageStatus::NotStarted => None,
    }
}

/// Stage table for `pipeline status`
pub fn print_pipeline(state: &PipelineState) {
    let rows = state
        .stages
        .iter()
        .enumerate()
        .map(|(idx, stage)| {
            let marker = if state.current == Some(stage.name) { ">" } else { "" };
            vec![
                (format!("{}{}", marker, idx + 1), None),
                (stage.name.to_string(), None),
                (stage.analysis_type.to_string(), None),
                (stage.status.to_string(), stage_color(stage.status)),
                (
                    stage
                        .job_id
                        .as_ref()
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    None,
                ),
                (if stage.resumed { "yes" } else { "" }.to_string(), None),
            ]
        })
        .collect();

    println!("PROJECT {}", state.project);
    print_table_colored(
        &["#", "STAGE", "AGENT", "STATUS", "JOB", "EARLIER SESSION"],
        rows,
    );
    match state.current {
        Some(stage) => println!("Next: {}", stage),
        None => println!("All stages completed"),
    }
}

/// Non-zero for jobs that ended without success
pub fn exit_code_for(record: &JobRecord) -> ExitCode {
    match record.outcome() {
        JobOutcome::Succeeded { .. } | JobOutcome::Pending => ExitCode::SUCCESS,
        JobOutcome::Failed { .. } => ExitCode::from(2),
        JobOutcome::TimedOut { .. } => ExitCode::from(3),
        JobOutcome::Rejected => ExitCode::from(4),
    }
}
