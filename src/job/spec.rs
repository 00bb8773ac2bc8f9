//! Job submission types: what a caller asks for and what the orchestrator runs.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Precondition failures detected before any task starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobSpecError {
    #[error("Unknown department: {0}")]
    UnknownDepartment(String),

    #[error("Job has no tasks")]
    NoTasks,

    #[error("Duplicate task id: {0}")]
    DuplicateTask(String),

    #[error("Task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: String, dependency: String },

    #[error("Task {0} depends on itself")]
    SelfDependency(String),

    #[error("Dependency cycle between tasks: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    #[error("Task {0} has a zero step budget")]
    ZeroBudget(String),

    #[error("Task {0} has a zero deadline")]
    ZeroTimeout(String),

    #[error("Missing required input: {0}")]
    MissingInput(String),
}

/// Body of a job submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    /// Named input variables bound into the agents' instructions.
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,

    /// Optional model override for every task in the job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Optional per-task deadline override, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Optional step budget override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<usize>,
}

impl JobRequest {
    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }

    /// Input rendered as plain text. Strings are used verbatim, other JSON
    /// values in their compact form. Empty strings and nulls count as absent.
    pub fn input_text(&self, name: &str) -> Option<String> {
        match self.inputs.get(name)? {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// One schedulable agent task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSpec {
    pub id: String,
    pub name: String,
    /// Who the agent is, used as the system prompt persona.
    pub role: String,
    /// Role instructions with input variables already substituted.
    pub instructions: String,
    pub inputs: BTreeMap<String, String>,
    /// Producer tasks that must settle before this one starts.
    pub depends_on: Vec<String>,
    /// Hard cap on reasoning iterations.
    pub max_iterations: usize,
    pub timeout: Duration,
    pub model: Option<String>,
}

impl TaskSpec {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: String::new(),
            instructions: String::new(),
            inputs: BTreeMap::new(),
            depends_on: Vec::new(),
            max_iterations: 12,
            timeout: Duration::from_secs(120),
            model: None,
        }
    }

    pub fn depends_on(mut self, producer: impl Into<String>) -> Self {
        self.depends_on.push(producer.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// A fully resolved job: the set of tasks for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub job_id: Uuid,
    pub department: String,
    pub tasks: Vec<TaskSpec>,
}

impl JobSpec {
    pub fn new(department: impl Into<String>, tasks: Vec<TaskSpec>) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            department: department.into(),
            tasks,
        }
    }

    pub fn task(&self, id: &str) -> Option<&TaskSpec> {
        self.tasks.iter().find(|t| t.id == id)
    }
}
