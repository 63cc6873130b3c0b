//! reqwest implementation of [`RemoteApi`]

use super::{
    RemoteApi, StartAnalysisRequest, TransportError, UpdateJobStatusRequest, ARTIFACTS_SEGMENT,
    JOBS_PATH, PROJECTS_PATH, REPORT_SEGMENT, START_ANALYSIS_PATH, STATUS_PATH,
    UPDATE_JOB_STATUS_PATH,
};
use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, Result};
use crate::jobs::JobId;
use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode, Url};
use serde_json::Value;
use std::fmt;
use tracing::debug;

/// HTTP client for the remote analysis service
#[derive(Clone)]
pub struct HttpRemoteApi {
    base_url: Url,
    api_key: Option<String>,
    http_client: Client,
}

impl fmt::Debug for HttpRemoteApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRemoteApi")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl HttpRemoteApi {
    /// Build a client from configuration
    pub fn new(config: &OrchestratorConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            OrchestratorError::Config(format!("invalid base_url '{}': {}", config.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(OrchestratorError::Config(format!(
                "base_url '{}' cannot carry paths",
                config.base_url
            )));
        }

        let http_client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| OrchestratorError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            api_key: config.api_key.clone(),
            http_client,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.header(header::ACCEPT, "application/json");
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, TransportError> {
        self.authorized(builder)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))
    }

    /// 2xx → JSON body, anything else → [`TransportError::Status`]
    async fn json_body(response: Response) -> Result<Value, TransportError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| TransportError::Decode(e.to_string()))
    }

    /// Like [`Self::json_body`] but 404 means "not yet available"
    async fn optional_json_body(response: Response) -> Result<Option<Value>, TransportError> {
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::json_body(response).await.map(Some)
    }

    async fn get_optional(&self, segments: &[&str]) -> Result<Option<Value>, TransportError> {
        let url = self.endpoint(segments)?;
        debug!("GET {}", url);
        let response = self.send(self.http_client.get(url)).await?;
        Self::optional_json_body(response).await
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn start_analysis(&self, body: &StartAnalysisRequest) -> Result<Value, TransportError> {
        let url = self.endpoint(&[START_ANALYSIS_PATH])?;
        debug!("POST {} ({})", url, body.analysis_type);
        let response = self.send(self.http_client.post(url).json(body)).await?;
        Self::json_body(response).await
    }

    async fn job_status(&self, job_id: &JobId) -> Result<Option<Value>, TransportError> {
        self.get_optional(&[STATUS_PATH, job_id.as_str()]).await
    }

    async fn job_report(&self, job_id: &JobId) -> Result<Option<Value>, TransportError> {
        self.get_optional(&[JOBS_PATH, job_id.as_str(), REPORT_SEGMENT])
            .await
    }

    async fn update_job_status(
        &self,
        body: &UpdateJobStatusRequest,
    ) -> Result<Value, TransportError> {
        let url = self.endpoint(&[UPDATE_JOB_STATUS_PATH])?;
        debug!("POST {} ({} {:?})", url, body.job_id, body.action);
        let response = self.send(self.http_client.post(url).json(body)).await?;
        Self::json_body(response).await
    }

    async fn project_artifacts(&self, project: &str) -> Result<Option<Value>, TransportError> {
        self.get_optional(&[PROJECTS_PATH, project, ARTIFACTS_SEGMENT])
            .await
    }
}
