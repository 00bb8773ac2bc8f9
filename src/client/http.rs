//! HTTP consumer for the job API.

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::job::JobRequest;

use super::frames::{decode_frames, FrameStream, TransportError};
use super::reconstructor::Reconstructor;
use super::state::ExecutionState;

/// Header carrying the id of a freshly submitted job.
pub const JOB_ID_HEADER: &str = "x-job-id";

/// An open job stream.
pub struct JobSession {
    pub job_id: Option<Uuid>,
    pub frames: FrameStream,
}

#[derive(Clone)]
pub struct JobClient {
    http: reqwest::Client,
    base: Url,
}

impl JobClient {
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base,
        })
    }

    /// Submit a job and open its event stream.
    pub async fn submit(
        &self,
        kind: &str,
        request: &JobRequest,
    ) -> Result<JobSession, TransportError> {
        let url = self.base.join(&format!("api/departments/{}/jobs", kind))?;
        let response = self
            .http
            .post(url)
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/event-stream"));
        if !is_event_stream {
            return Err(TransportError::Stream(
                "response is not an event stream".to_string(),
            ));
        }

        let job_id = response
            .headers()
            .get(JOB_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok());

        Ok(JobSession {
            job_id,
            frames: decode_frames(response.bytes_stream()),
        })
    }

    /// Run one full session: submit, fold until the job ends or `cancel`
    /// fires, and return the final read-model. Connection failures before
    /// the stream opens are errors; a stream that breaks later is reported
    /// through the state's phase.
    pub async fn watch(
        &self,
        kind: &str,
        request: &JobRequest,
        cancel: CancellationToken,
    ) -> Result<ExecutionState, TransportError> {
        let mut reconstructor = Reconstructor::with_cancel(cancel.clone());

        let session = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let mut state = reconstructor.into_state();
                state.mark_cancelled();
                return Ok(state);
            }
            session = self.submit(kind, request) => session?,
        };
        tracing::info!(job_id = ?session.job_id, kind, "job stream opened");

        let outcome = reconstructor.consume(session.frames).await;
        tracing::info!(job_id = ?session.job_id, ?outcome, "job stream finished");
        Ok(reconstructor.into_state())
    }

    /// Server-side snapshot of a job, for polling consumers.
    pub async fn job_snapshot(&self, job_id: Uuid) -> Result<Value, TransportError> {
        let url = self.base.join(&format!("api/jobs/{}", job_id))?;
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        Ok(response.json().await?)
    }
}

/// Pull `error` out of a JSON error body, or fall back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}
