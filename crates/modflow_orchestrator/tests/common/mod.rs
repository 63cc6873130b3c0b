//! Scripted in-memory remote service shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use modflow_orchestrator::jobs::JobId;
use modflow_orchestrator::protocol::{StartAnalysisRequest, UpdateJobStatusRequest};
use modflow_orchestrator::{Orchestrator, OrchestratorConfig, RemoteApi, TransportError};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted answer
#[derive(Debug, Clone)]
pub enum Reply {
    Json(Value),
    NotFound,
    Status(u16),
    Network,
    /// Never answers
    Hang,
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Reply::Json(value)
    }
}

impl Reply {
    async fn optional(self) -> Result<Option<Value>, TransportError> {
        match self {
            Reply::Json(value) => Ok(Some(value)),
            Reply::NotFound => Ok(None),
            Reply::Status(code) => Err(TransportError::Status {
                code,
                body: "scripted failure".to_string(),
            }),
            Reply::Network => Err(TransportError::Network("connection reset".to_string())),
            Reply::Hang => std::future::pending().await,
        }
    }

    async fn required(self) -> Result<Value, TransportError> {
        match self.optional().await? {
            Some(value) => Ok(value),
            None => Err(TransportError::Status {
                code: 404,
                body: "not found".to_string(),
            }),
        }
    }
}

/// Every call the orchestrator made, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Start(StartAnalysisRequest),
    Status(String),
    Report(String),
    Update(UpdateJobStatusRequest),
    Artifacts(String),
}

impl Call {
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Call::Status(id) | Call::Report(id) => Some(id),
            Call::Update(body) => Some(&body.job_id),
            Call::Start(_) | Call::Artifacts(_) => None,
        }
    }
}

/// Scripted [`RemoteApi`]
///
/// - start: scripted bodies, then `{"job_id": "job-N"}` with N counting up
/// - status: per-job queue; the last entry repeats; unscripted jobs are 404
/// - report: per-job reply, 404 by default
/// - update: optional delay, scripted queue, then `{"status": "approved" | "rejected"}`
/// - artifacts: per-project reply, 404 by default
#[derive(Default)]
pub struct MockApi {
    starts: Mutex<VecDeque<Reply>>,
    next_job: AtomicUsize,
    statuses: Mutex<HashMap<String, VecDeque<Reply>>>,
    reports: Mutex<HashMap<String, Reply>>,
    updates: Mutex<VecDeque<Reply>>,
    update_delay: Mutex<Option<Duration>>,
    artifacts: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<Call>>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script_start(&self, reply: impl Into<Reply>) {
        self.starts.lock().unwrap().push_back(reply.into());
    }

    pub fn script_status<R: Into<Reply>>(&self, job_id: &str, replies: impl IntoIterator<Item = R>) {
        self.statuses
            .lock()
            .unwrap()
            .insert(job_id.to_string(), replies.into_iter().map(Into::into).collect());
    }

    pub fn script_report(&self, job_id: &str, reply: impl Into<Reply>) {
        self.reports
            .lock()
            .unwrap()
            .insert(job_id.to_string(), reply.into());
    }

    pub fn script_update(&self, reply: impl Into<Reply>) {
        self.updates.lock().unwrap().push_back(reply.into());
    }

    /// Hold every update call for `delay` before answering
    pub fn delay_updates(&self, delay: Duration) {
        *self.update_delay.lock().unwrap() = Some(delay);
    }

    pub fn script_artifacts(&self, project: &str, reply: impl Into<Reply>) {
        self.artifacts
            .lock()
            .unwrap()
            .insert(project.to_string(), reply.into());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Calls that name `job_id`
    pub fn calls_for(&self, job_id: &JobId) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| call.job_id() == Some(job_id.as_str()))
            .collect()
    }

    pub fn status_calls(&self, job_id: &JobId) -> usize {
        self.calls_for(job_id)
            .iter()
            .filter(|call| matches!(call, Call::Status(_)))
            .count()
    }

    pub fn starts(&self) -> Vec<StartAnalysisRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Start(body) => Some(body),
                _ => None,
            })
            .collect()
    }

    pub fn updates(&self) -> Vec<UpdateJobStatusRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Update(body) => Some(body),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_status(&self, job_id: &str) -> Reply {
        let mut statuses = self.statuses.lock().unwrap();
        match statuses.get_mut(job_id) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Reply::NotFound),
            Some(queue) => queue.front().cloned().unwrap_or(Reply::NotFound),
            None => Reply::NotFound,
        }
    }
}

#[async_trait]
impl RemoteApi for MockApi {
    async fn start_analysis(&self, body: &StartAnalysisRequest) -> Result<Value, TransportError> {
        self.record(Call::Start(body.clone()));
        let scripted = self.starts.lock().unwrap().pop_front();
        match scripted {
            Some(reply) => reply.required().await,
            None => {
                let n = self.next_job.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(json!({ "job_id": format!("job-{}", n), "message": "accepted" }))
            }
        }
    }

    async fn job_status(&self, job_id: &JobId) -> Result<Option<Value>, TransportError> {
        self.record(Call::Status(job_id.to_string()));
        self.next_status(job_id.as_str()).optional().await
    }

    async fn job_report(&self, job_id: &JobId) -> Result<Option<Value>, TransportError> {
        self.record(Call::Report(job_id.to_string()));
        let reply = self
            .reports
            .lock()
            .unwrap()
            .get(job_id.as_str())
            .cloned()
            .unwrap_or(Reply::NotFound);
        reply.optional().await
    }

    async fn update_job_status(
        &self,
        body: &UpdateJobStatusRequest,
    ) -> Result<Value, TransportError> {
        self.record(Call::Update(body.clone()));
        let delay = *self.update_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.updates.lock().unwrap().pop_front();
        match scripted {
            Some(reply) => reply.required().await,
            None => {
                let body = serde_json::to_value(body).unwrap_or(Value::Null);
                let status = match body["action"].as_str() {
                    Some("reject") => "rejected",
                    _ => "approved",
                };
                Ok(json!({ "status": status }))
            }
        }
    }

    async fn project_artifacts(&self, project: &str) -> Result<Option<Value>, TransportError> {
        self.record(Call::Artifacts(project.to_string()));
        let reply = self
            .artifacts
            .lock()
            .unwrap()
            .get(project)
            .cloned()
            .unwrap_or(Reply::NotFound);
        reply.optional().await
    }
}

pub const POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const TIMEOUT: Duration = Duration::from_secs(60);

pub fn config() -> OrchestratorConfig {
    OrchestratorConfig {
        poll_interval_secs: POLL_INTERVAL.as_secs(),
        timeout_secs: TIMEOUT.as_secs(),
        ..Default::default()
    }
}

pub fn orchestrator(api: &Arc<MockApi>) -> Orchestrator {
    Orchestrator::with_api(config(), api.clone())
}

/// Let the paused clock run long enough for any armed poller to tick
pub async fn idle(duration: Duration) {
    tokio::time::sleep(duration).await;
}
