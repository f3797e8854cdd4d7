//! Analysis REST endpoints.
//!
//! [`AnalysisApi`] is the seam between the coordinator and the backend;
//! [`HttpAnalysisApi`] is the reqwest implementation:
//!
//! - `POST /analysis/{submissionId}?force=&mode=&retry=` starts a job
//! - `GET /analysis/{submissionId}/status` returns that job's snapshot or 204
//! - `GET /analysis/status` returns the most relevant job deployment-wide or 204

use std::future::Future;

use reqwest::{StatusCode, Url};

use proflock_core::{PayloadMode, StatusSnapshot, SubmissionId};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::session::SessionGate;

/// Query parameters of a job submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOptions {
    pub mode: PayloadMode,
    pub force: bool,
    pub retry: u32,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        SubmitOptions {
            mode: PayloadMode::Minimal,
            force: false,
            retry: 1,
        }
    }
}

/// Backend operations the coordinator depends on.
///
/// Status calls return `Ok(None)` when the server reports no job.
pub trait AnalysisApi: Send + Sync + 'static {
    fn submit(
        &self,
        submission_id: &SubmissionId,
        options: &SubmitOptions,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn job_status(
        &self,
        submission_id: &SubmissionId,
    ) -> impl Future<Output = Result<Option<StatusSnapshot>, ClientError>> + Send;

    fn global_status(
        &self,
    ) -> impl Future<Output = Result<Option<StatusSnapshot>, ClientError>> + Send;
}

pub struct HttpAnalysisApi {
    client: reqwest::Client,
    base: Url,
    session: SessionGate,
}

impl HttpAnalysisApi {
    pub fn new(config: &ClientConfig, session: SessionGate) -> Result<Self, ClientError> {
        let base = Url::parse(&config.api_base).map_err(|err| {
            ClientError::Config(format!("invalid api base '{}': {}", config.api_base, err))
        })?;
        if base.cannot_be_a_base() {
            return Err(ClientError::Config(format!(
                "api base '{}' cannot carry a path",
                config.api_base
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;
        Ok(HttpAnalysisApi {
            client,
            base,
            session,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // cannot_be_a_base was rejected in new(), so the path is mutable.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let req = req.header("Accept", "application/json");
        match self.session.bearer_token() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn fetch_status(&self, url: Url) -> Result<Option<StatusSnapshot>, ClientError> {
        let response = self.authorize(self.client.get(url)).send().await?;
        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(ClientError::Http {
                status: status.as_u16(),
                detail: server_detail(status, &String::from_utf8_lossy(&body)),
            });
        }

        Ok(StatusSnapshot::from_body(&body)?)
    }
}

impl AnalysisApi for HttpAnalysisApi {
    async fn submit(
        &self,
        submission_id: &SubmissionId,
        options: &SubmitOptions,
    ) -> Result<(), ClientError> {
        let url = self.endpoint(&["analysis", submission_id.as_str()]);
        let req = self.client.post(url).query(&[
            ("force", options.force.to_string()),
            ("mode", options.mode.as_str().to_string()),
            ("retry", options.retry.to_string()),
        ]);

        let response = self.authorize(req).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Http {
            status: status.as_u16(),
            detail: server_detail(status, &body),
        })
    }

    async fn job_status(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<Option<StatusSnapshot>, ClientError> {
        let url = self.endpoint(&["analysis", submission_id.as_str(), "status"]);
        self.fetch_status(url).await
    }

    async fn global_status(&self) -> Result<Option<StatusSnapshot>, ClientError> {
        let url = self.endpoint(&["analysis", "status"]);
        self.fetch_status(url).await
    }
}

/// Best-effort human-readable detail from an error response.
///
/// Prefers a `message`, `detail` or `error` string in a JSON body, then the
/// raw text, then the bare status line.
pub fn server_detail(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "detail", "error"] {
            if let Some(text) = map.get(key).and_then(|v| v.as_str()) {
                let text = text.trim();
                if !text.is_empty() {
                    return text.to_string();
                }
            }
        }
    }
    if !body.is_empty() {
        return body.to_string();
    }
    status
        .canonical_reason()
        .map(|reason| reason.to_string())
        .unwrap_or_else(|| status.as_str().to_string())
}
