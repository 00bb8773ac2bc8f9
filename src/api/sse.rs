//! Event transport: one job, one server-sent event stream.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::registry::JobRegistry;
use super::routes::AppState;
use super::types::ErrorResponse;
use crate::client::JOB_ID_HEADER;
use crate::department::Orchestrator;
use crate::job::JobRequest;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Cancels the job and settles its registry entry when the response
/// stream goes away, whether it finished or the client disconnected.
struct StreamDropGuard {
    job_id: Uuid,
    cancel: CancellationToken,
    registry: JobRegistry,
}

impl Drop for StreamDropGuard {
    fn drop(&mut self) {
        self.cancel.cancel();
        let registry = self.registry.clone();
        let job_id = self.job_id;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move { registry.close(job_id).await });
        }
        tracing::info!(job_id = %self.job_id, "Job SSE stream closed");
    }
}

/// `POST /api/departments/:kind/jobs`: start a job and stream its events.
pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Json(request): Json<JobRequest>,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    if state.catalog.get(&kind).is_none() {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!("Unknown department: {}", kind))),
        ));
    }

    let cancel = CancellationToken::new();
    let (job_id, events) = match state.catalog.job_spec(&kind, &request, &state.defaults) {
        Ok(spec) => (spec.job_id, state.orchestrator.execute(spec, cancel.clone())),
        Err(e) => {
            tracing::warn!(department = %kind, error = %e, "job spec rejected");
            (Uuid::new_v4(), Orchestrator::rejected(e.to_string()))
        }
    };

    state.registry.register(job_id, &kind).await;
    tracing::info!(job_id = %job_id, department = %kind, "Job SSE stream opened");

    let guard = StreamDropGuard {
        job_id,
        cancel,
        registry: state.registry.clone(),
    };
    let registry = state.registry.clone();

    let stream = async_stream::stream! {
        let _guard = guard;
        let mut events = events;

        while let Some(event) = events.next().await {
            registry.record(job_id, &event).await;
            let terminal = event.is_terminal();

            match event.to_data() {
                Ok(data) => {
                    tracing::debug!(
                        job_id = %job_id,
                        event = event.event_name(),
                        agent_id = ?event.agent_id(),
                        "Job SSE event"
                    );
                    yield Ok::<_, Infallible>(Event::default().event(event.event_name()).data(data));
                }
                Err(e) => {
                    tracing::error!(
                        job_id = %job_id,
                        event = event.event_name(),
                        error = %e,
                        "Failed to serialize SSE event; dropping"
                    );
                }
            }

            if terminal {
                break;
            }
        }
    };

    let sse = Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEPALIVE_INTERVAL)
            .text("keepalive"),
    );

    Ok(([(JOB_ID_HEADER, job_id.to_string())], sse).into_response())
}
