//! Helpful error types for CLI commands
//!
//! Every error includes:
//! - What went wrong
//! - Context about the situation
//! - Suggestions for how to fix it

use modflow_orchestrator::{CanonicalStatus, JobId, OrchestratorError, TransportError};
use std::fmt;

/// An error with helpful context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    /// The main error message
    pub message: String,
    /// Additional context about what was happening
    pub context: Option<String>,
    /// Suggestions for how to fix the error
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_suggestions(mut self, suggestions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.suggestions.extend(suggestions.into_iter().map(|s| s.into()));
        self
    }

    // === Common error constructors ===

    /// The analysis service could not be reached at all
    pub fn service_unreachable(base_url: &str, details: &str) -> Self {
        Self::new(format!("Cannot reach the analysis service at {}", base_url))
            .with_context(details.to_string())
            .with_suggestions([
                format!("TRY: Check the service is up: curl {}/status/ping", base_url.trim_end_matches('/')),
                "TRY: Point at another service: modflow --base-url http://host:8000 ...".to_string(),
                "TRY: Show the resolved configuration: modflow config".to_string(),
            ])
    }

    /// The service rejected a call
    pub fn service_error(code: u16, body: &str) -> Self {
        let err = Self::new(format!("The analysis service answered HTTP {}", code))
            .with_context(truncate(body, 300));
        match code {
            401 | 403 => err.with_suggestions([
                "TRY: Set an API key: export MODFLOW_API_KEY=...",
                "TRY: Or add `api_key = \"...\"` to ~/.modflow/config.toml",
            ]),
            _ => err.with_suggestion("TRY: Re-run with -v to see the request that failed"),
        }
    }

    pub fn not_awaiting_approval(job_id: &JobId, status: CanonicalStatus) -> Self {
        Self::new(format!("Job {} is not waiting for approval", job_id))
            .with_context(format!("Its current status is {}", status))
            .with_suggestions([
                format!("TRY: Follow the job until it reaches the gate: modflow watch {}", job_id),
            ])
    }

    pub fn already_terminal(job_id: &JobId, status: CanonicalStatus) -> Self {
        Self::new(format!("Job {} has already finished ({})", job_id, status))
            .with_context("Finished jobs cannot be approved or rejected")
            .with_suggestion("TRY: Submit a new job with modflow submit")
    }

    pub fn report_unavailable(job_id: &JobId, status: CanonicalStatus) -> Self {
        let err = Self::new(format!("No report available for job {}", job_id));
        if status == CanonicalStatus::Completed {
            err.with_context("The job completed but the service has not published a report")
                .with_suggestion(format!("TRY: Retry later: modflow report {}", job_id))
        } else {
            err.with_context(format!("The job is {}", status))
                .with_suggestion(format!("TRY: Wait for it to finish: modflow watch {}", job_id))
        }
    }
}

/// Turn an orchestration error into advice the user can act on
pub fn explain(err: OrchestratorError, base_url: &str) -> anyhow::Error {
    let helpful = match &err {
        OrchestratorError::Transport(TransportError::Network(details)) => {
            HelpfulError::service_unreachable(base_url, details)
        }
        OrchestratorError::Transport(TransportError::Status { code, body }) => {
            HelpfulError::service_error(*code, body)
        }
        OrchestratorError::NotAwaitingApproval { job_id, status } => {
            HelpfulError::not_awaiting_approval(job_id, *status)
        }
        OrchestratorError::AlreadyTerminal { job_id, status } => {
            HelpfulError::already_terminal(job_id, *status)
        }
        OrchestratorError::Validation(details) => HelpfulError::new(details.clone())
            .with_suggestion("TRY: modflow submit --help"),
        _ => return anyhow::Error::new(err),
    };
    anyhow::Error::new(helpful)
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helpful_error_display() {
        let err = HelpfulError::new("Something went wrong")
            .with_context("While polling")
            .with_suggestion("Try again");

        let display = format!("{}", err);
        assert!(display.contains("ERROR: Something went wrong"));
        assert!(display.contains("CONTEXT: While polling"));
        assert!(display.contains("Try again"));
    }

    #[test]
    fn test_unauthorized_suggests_api_key() {
        let display = HelpfulError::service_error(401, "unauthorized").to_string();
        assert!(display.contains("HTTP 401"));
        assert!(display.contains("MODFLOW_API_KEY"));
    }

    #[test]
    fn test_explain_network_error() {
        let err = OrchestratorError::Transport(TransportError::Network("refused".into()));
        let display = explain(err, "http://localhost:8000").to_string();
        assert!(display.contains("http://localhost:8000"));
        assert!(display.contains("TRY:"));
    }

    #[test]
    fn test_explain_keeps_other_errors() {
        let err = OrchestratorError::StageLocked("planning".into());
        let display = explain(err, "http://localhost:8000").to_string();
        assert_eq!(display, "Stage 'planning' is not reachable yet");
    }

    #[test]
    fn test_truncate_long_body() {
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("abc", 3), "abc");
    }
}
