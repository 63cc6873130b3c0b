//! Ordered fallback decoders
//!
//! One decoder per response type. Each field is read from the first alias
//! present in its priority list; a missing optional field is not an error.
//! Only a status response without any status field is a [`SchemaMismatch`],
//! and callers absorb it (logged, retried on the next tick).

use serde_json::Value;
use thiserror::Error;

/// Aliases for the job identifier in a start response
pub const JOB_ID_FIELDS: &[&str] = &["job_id", "id"];

/// Aliases for an inline report in start/status responses
pub const INLINE_REPORT_FIELDS: &[&str] = &["report", "analysis_report"];

/// Aliases for the report in the dedicated report endpoint
pub const REPORT_FIELDS: &[&str] = &[
    "report",
    "analysis_report",
    "result",
    "content",
    "data",
    "markdown",
    "text",
];

pub const STATUS_FIELDS: &[&str] = &["status", "state", "job_status"];
pub const PROGRESS_FIELDS: &[&str] = &["progress", "percent", "percentage"];
pub const MESSAGE_FIELDS: &[&str] = &["message", "detail", "status_message"];

/// Expected field absent under every alias
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{context} response has none of {expected:?}")]
pub struct SchemaMismatch {
    pub context: &'static str,
    pub expected: &'static [&'static str],
}

/// Decoded `POST /start-analysis` response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartDecoded {
    pub job_id: Option<String>,
    pub message: Option<String>,
    pub report: Option<String>,
    pub raw_status: Option<String>,
}

/// Decoded `GET /status/{id}` response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusDecoded {
    pub raw_status: String,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub report: Option<String>,
}

/// Decoded `POST /update-job-status` response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateDecoded {
    pub raw_status: Option<String>,
    pub message: Option<String>,
}

pub fn decode_start(value: &Value) -> StartDecoded {
    StartDecoded {
        job_id: first_scalar(value, JOB_ID_FIELDS),
        message: first_scalar(value, MESSAGE_FIELDS),
        report: first_text(value, INLINE_REPORT_FIELDS),
        raw_status: first_scalar(value, STATUS_FIELDS),
    }
}

pub fn decode_status(value: &Value) -> Result<StatusDecoded, SchemaMismatch> {
    let raw_status = first_scalar(value, STATUS_FIELDS).ok_or(SchemaMismatch {
        context: "status",
        expected: STATUS_FIELDS,
    })?;

    Ok(StatusDecoded {
        raw_status,
        progress: first_progress(value),
        message: first_scalar(value, MESSAGE_FIELDS),
        // Status responses name the report `analysis_report` first
        report: first_text(value, &["analysis_report", "report"]),
    })
}

/// First non-empty report among [`REPORT_FIELDS`]. A bare JSON string body
/// is the report itself.
pub fn decode_report(value: &Value) -> Option<String> {
    if let Value::String(text) = value {
        return non_empty(text);
    }
    first_text(value, REPORT_FIELDS)
}

pub fn decode_update(value: &Value) -> UpdateDecoded {
    UpdateDecoded {
        raw_status: first_scalar(value, STATUS_FIELDS),
        message: first_scalar(value, MESSAGE_FIELDS),
    }
}

/// Optional envelope around the project artifact map
pub const ARTIFACTS_ENVELOPE: &str = "artifacts";

/// First non-empty artifact among `keys` in a project artifacts body
pub fn decode_artifact(value: &Value, keys: &[&str]) -> Option<String> {
    let map = match value.get(ARTIFACTS_ENVELOPE) {
        Some(inner @ Value::Object(_)) => inner,
        _ => value,
    };
    keys.iter()
        .find_map(|key| map.get(key).and_then(|field| text_of(field, &[], false)))
}

fn non_empty(text: &str) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// First alias holding a string or number
fn first_scalar(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match value.get(key)? {
        Value::String(s) => non_empty(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// First alias holding text. Objects are searched one level deep with the
/// same aliases; other structured values are rendered as pretty JSON.
fn first_text(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| value.get(key).and_then(|field| text_of(field, keys, true)))
}

fn text_of(field: &Value, keys: &[&str], descend: bool) -> Option<String> {
    match field {
        Value::String(s) => non_empty(s),
        Value::Object(map) if map.is_empty() => None,
        Value::Object(_) => {
            let nested = if descend {
                keys.iter()
                    .find_map(|key| field.get(key).and_then(|inner| text_of(inner, keys, false)))
            } else {
                None
            };
            nested.or_else(|| serde_json::to_string_pretty(field).ok())
        }
        Value::Array(items) if items.is_empty() => None,
        Value::Array(_) => serde_json::to_string_pretty(field).ok(),
        Value::Null | Value::Bool(_) | Value::Number(_) => None,
    }
}

fn first_progress(value: &Value) -> Option<u8> {
    PROGRESS_FIELDS.iter().find_map(|key| {
        let number = match value.get(key)? {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok()?,
            _ => return None,
        };
        if number.is_finite() {
            Some(number.round().clamp(0.0, 100.0) as u8)
        } else {
            None
        }
    })
}
