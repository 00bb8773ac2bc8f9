//! Execution records shared by the orchestrator, the wire protocol and the
//! client read-model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle of one agent task.
///
/// Transitions are monotonic: `idle -> running -> terminal`, and a terminal
/// state is never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Error,
    TimedOut,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Error | TaskStatus::TimedOut
        )
    }

    /// Whether moving from `self` to `to` respects the lifecycle.
    pub fn can_transition(self, to: TaskStatus) -> bool {
        match self {
            TaskStatus::Idle => to != TaskStatus::Idle,
            TaskStatus::Running => to.is_terminal(),
            TaskStatus::Completed | TaskStatus::Error | TaskStatus::TimedOut => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Idle => "idle",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Error => "error",
            TaskStatus::TimedOut => "timed_out",
        }
    }
}

/// Kind of entry in a task's execution trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Thinking,
    ToolCall,
    TextOutput,
}

/// One entry of a task's ordered trace. Never mutated once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: StepKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Snapshot of the tool call at the time the step was recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    pub timestamp: DateTime<Utc>,
}

impl Step {
    pub fn text(kind: StepKind, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            content: Some(content.into()),
            tool_call: None,
            timestamp: Utc::now(),
        }
    }

    /// Step that references a tool call by its first-seen record.
    pub fn for_tool_call(call: &ToolCall) -> Self {
        Self {
            id: format!("step-{}", call.id),
            kind: StepKind::ToolCall,
            content: None,
            tool_call: Some(call.clone()),
            timestamp: call.started_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl ToolCallStatus {
    /// Ordering used to reject regressions when the same call is seen twice.
    pub fn rank(self) -> u8 {
        match self {
            ToolCallStatus::Pending => 0,
            ToolCallStatus::Running => 1,
            ToolCallStatus::Completed | ToolCallStatus::Error => 2,
        }
    }

    pub fn is_settled(self) -> bool {
        matches!(self, ToolCallStatus::Completed | ToolCallStatus::Error)
    }
}

/// Record of one external tool invocation. Identified by `id` for its
/// whole lifetime; later records with the same id replace earlier ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub id: String,
    pub tool_name: String,
    /// Opaque, caller-validated arguments.
    #[serde(default)]
    pub args: Value,
    pub status: ToolCallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ToolCall {
    pub fn running(id: impl Into<String>, tool_name: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            tool_name: tool_name.into(),
            args,
            status: ToolCallStatus::Running,
            result: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn complete(mut self, result: Value) -> Self {
        self.status = ToolCallStatus::Completed;
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
        self
    }

    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.status = ToolCallStatus::Error;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
        self
    }
}

/// A user-facing output produced by a task, independent of its trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(kind: impl Into<String>, title: impl Into<String>, data: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: kind.into(),
            title: title.into(),
            data,
            created_at: Utc::now(),
        }
    }
}

/// Read-model of one agent task as reconstructed from the event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTask {
    pub id: String,
    pub name: String,
    pub status: TaskStatus,
    /// 0-100
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentTask {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: TaskStatus::Idle,
            progress: 0,
            started_at: None,
            completed_at: None,
            steps: Vec::new(),
            artifacts: Vec::new(),
            error: None,
        }
    }
}

/// Per-task record carried in the job's final result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentOutcome {
    pub agent_id: String,
    pub name: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when the task ran out of its step budget before finishing.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub budget_exhausted: bool,
    pub duration_ms: u64,
}

/// Aggregate result of a department job. This is the payload of the
/// terminal `complete` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub job_id: Uuid,
    pub department: String,
    pub agents: Vec<AgentOutcome>,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,
}

impl JobResult {
    pub fn new(
        job_id: Uuid,
        department: impl Into<String>,
        agents: Vec<AgentOutcome>,
        artifacts: Vec<Artifact>,
        duration_ms: u64,
    ) -> Self {
        let count = |status: TaskStatus| agents.iter().filter(|a| a.status == status).count();
        let succeeded = count(TaskStatus::Completed);
        let failed = count(TaskStatus::Error);
        let timed_out = count(TaskStatus::TimedOut);
        Self {
            job_id,
            department: department.into(),
            agents,
            succeeded,
            failed,
            timed_out,
            duration_ms,
            artifacts,
        }
    }

    pub fn outcome(&self, agent_id: &str) -> Option<&AgentOutcome> {
        self.agents.iter().find(|a| a.agent_id == agent_id)
    }
}
