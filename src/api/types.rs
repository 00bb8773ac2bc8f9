//! API request and response types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::client::{ExecutionState, StateSummary, StreamPhase};
use crate::department::DepartmentDefinition;

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// One agent of a department, as listed by `GET /api/departments`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub id: String,
    pub name: String,
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentSummary {
    pub kind: String,
    pub name: String,
    pub description: String,
    pub required_inputs: Vec<String>,
    pub agents: Vec<AgentSummary>,
}

impl From<&DepartmentDefinition> for DepartmentSummary {
    fn from(dept: &DepartmentDefinition) -> Self {
        Self {
            kind: dept.kind.clone(),
            name: dept.name.clone(),
            description: dept.description.clone(),
            required_inputs: dept.required_inputs.clone(),
            agents: dept
                .agents
                .iter()
                .map(|a| AgentSummary {
                    id: a.id.clone(),
                    name: a.name.clone(),
                    depends_on: a.depends_on.clone(),
                })
                .collect(),
        }
    }
}

/// Row of `GET /api/jobs`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub id: Uuid,
    pub department: String,
    pub phase: StreamPhase,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub progress: StateSummary,
}

/// Body of `GET /api/jobs/:id`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub id: Uuid,
    pub department: String,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub state: ExecutionState,
}

/// JSON error body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
