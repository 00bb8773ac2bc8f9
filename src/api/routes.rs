//! HTTP route wiring and shared state.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use super::registry::JobRegistry;
use super::sse;
use super::types::{DepartmentSummary, ErrorResponse, HealthResponse, JobSnapshot, JobSummary};
use crate::agent::{AgentRunner, TaskRunner};
use crate::config::Config;
use crate::department::{Catalog, JobDefaults, Orchestrator};
use crate::llm::OpenRouterClient;
use crate::tools::ToolRegistry;

/// Shared application state.
pub struct AppState {
    pub catalog: Catalog,
    pub orchestrator: Orchestrator,
    pub registry: JobRegistry,
    pub defaults: JobDefaults,
}

impl AppState {
    pub fn new(
        catalog: Catalog,
        runner: Arc<dyn AgentRunner>,
        defaults: JobDefaults,
        history_limit: usize,
    ) -> Self {
        Self {
            catalog,
            orchestrator: Orchestrator::new(runner),
            registry: JobRegistry::new(history_limit),
            defaults,
        }
    }

    /// Wire the production stack: catalog, OpenRouter backend, tools.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let catalog = match &config.departments_file {
            Some(path) => {
                tracing::info!(path = %path.display(), "Loading department catalog");
                Catalog::load(path)?
            }
            None => Catalog::builtin()?,
        };

        let llm = Arc::new(OpenRouterClient::new(
            config.api_key.clone(),
            config.api_base_url.clone(),
        ));
        let tools = Arc::new(ToolRegistry::with_options(config.research_command.as_deref()));
        tracing::info!(
            tools = ?tools.list_tools().iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            "Registered tools"
        );
        let runner = Arc::new(TaskRunner::new(
            llm,
            tools,
            config.default_model.clone(),
            config.workspace_path.clone(),
        ));

        Ok(Self::new(
            catalog,
            runner,
            JobDefaults {
                max_iterations: config.max_iterations,
                timeout: config.task_timeout,
            },
            config.job_history_limit,
        ))
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/departments", get(list_departments))
        .route("/api/departments/:kind/jobs", post(sse::submit_job))
        .route("/api/jobs", get(list_jobs))
        .route("/api/jobs/:id", get(get_job))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server and run until it stops.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let state = Arc::new(AppState::from_config(&config)?);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        addr = %addr,
        departments = state.catalog.list().len(),
        "Server listening"
    );
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn list_departments(State(state): State<Arc<AppState>>) -> Json<Vec<DepartmentSummary>> {
    Json(state.catalog.list().iter().map(DepartmentSummary::from).collect())
}

async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<JobSummary>> {
    Json(state.registry.list().await)
}

async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobSnapshot>, (StatusCode, Json<ErrorResponse>)> {
    state.registry.get(id).await.map(Json).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!("Unknown job: {}", id))),
        )
    })
}
