//! Wire events for a department job.
//!
//! Every event travels as one frame: a name (`agent_start`, `step`, ...)
//! and a JSON payload whose schema is fixed per name. Decoding validates the
//! payload against that schema; nothing is inferred from an untyped shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::{Artifact, JobResult, Step, TaskStatus, ToolCall};

/// A frame that could not be turned into a [`JobEvent`].
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("unknown event name: {0}")]
    UnknownEvent(String),

    #[error("empty payload for {0} event")]
    EmptyPayload(String),

    #[error("invalid {event} payload: {source}")]
    InvalidPayload {
        event: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid {event} payload: {reason}")]
    Rejected { event: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStartPayload {
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCompletePayload {
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
    /// Terminal status of the task. Older producers omit it; absence means
    /// the task completed.
    #[serde(default = "completed")]
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn completed() -> TaskStatus {
    TaskStatus::Completed
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub step: Step,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallPayload {
    pub agent_id: String,
    pub tool_call: ToolCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub artifact: Artifact,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// A structured event emitted while a job runs.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    AgentStart(AgentStartPayload),
    AgentComplete(AgentCompletePayload),
    Step(StepPayload),
    ToolCall(ToolCallPayload),
    Artifact(ArtifactPayload),
    /// Terminal: every task settled.
    Complete(JobResult),
    /// Terminal: the job could not run at all.
    Error(ErrorPayload),
}

impl JobEvent {
    pub fn agent_start(agent_id: impl Into<String>, agent_name: Option<String>) -> Self {
        JobEvent::AgentStart(AgentStartPayload {
            agent_id: agent_id.into(),
            agent_name,
            timestamp: Utc::now(),
        })
    }

    pub fn agent_complete(
        agent_id: impl Into<String>,
        status: TaskStatus,
        error: Option<String>,
    ) -> Self {
        JobEvent::AgentComplete(AgentCompletePayload {
            agent_id: agent_id.into(),
            timestamp: Utc::now(),
            status,
            error,
        })
    }

    pub fn step(agent_id: impl Into<String>, step: Step) -> Self {
        JobEvent::Step(StepPayload {
            agent_id: Some(agent_id.into()),
            step,
        })
    }

    pub fn tool_call(agent_id: impl Into<String>, tool_call: ToolCall) -> Self {
        JobEvent::ToolCall(ToolCallPayload {
            agent_id: agent_id.into(),
            tool_call,
        })
    }

    pub fn artifact(agent_id: impl Into<String>, artifact: Artifact) -> Self {
        JobEvent::Artifact(ArtifactPayload {
            agent_id: Some(agent_id.into()),
            artifact,
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        JobEvent::Error(ErrorPayload {
            message: message.into(),
        })
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            JobEvent::AgentStart(_) => "agent_start",
            JobEvent::AgentComplete(_) => "agent_complete",
            JobEvent::Step(_) => "step",
            JobEvent::ToolCall(_) => "tool_call",
            JobEvent::Artifact(_) => "artifact",
            JobEvent::Complete(_) => "complete",
            JobEvent::Error(_) => "error",
        }
    }

    /// Owning task, for task-scoped events.
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            JobEvent::AgentStart(p) => Some(&p.agent_id),
            JobEvent::AgentComplete(p) => Some(&p.agent_id),
            JobEvent::Step(p) => p.agent_id.as_deref(),
            JobEvent::ToolCall(p) => Some(&p.agent_id),
            JobEvent::Artifact(p) => p.agent_id.as_deref(),
            JobEvent::Complete(_) | JobEvent::Error(_) => None,
        }
    }

    /// `complete` and `error` end the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Complete(_) | JobEvent::Error(_))
    }

    /// Serialize the payload half of the frame.
    pub fn to_data(&self) -> serde_json::Result<String> {
        match self {
            JobEvent::AgentStart(p) => serde_json::to_string(p),
            JobEvent::AgentComplete(p) => serde_json::to_string(p),
            JobEvent::Step(p) => serde_json::to_string(p),
            JobEvent::ToolCall(p) => serde_json::to_string(p),
            JobEvent::Artifact(p) => serde_json::to_string(p),
            JobEvent::Complete(p) => serde_json::to_string(p),
            JobEvent::Error(p) => serde_json::to_string(p),
        }
    }

    /// Decode one frame, validating the payload against the schema for
    /// `name`.
    pub fn from_frame(name: &str, data: &str) -> Result<Self, FrameError> {
        if data.trim().is_empty() {
            return Err(if is_known(name) {
                FrameError::EmptyPayload(name.to_string())
            } else {
                FrameError::UnknownEvent(name.to_string())
            });
        }

        let event = match name {
            "agent_start" => JobEvent::AgentStart(parse(name, data)?),
            "agent_complete" => {
                let payload: AgentCompletePayload = parse(name, data)?;
                if !payload.status.is_terminal() {
                    return Err(FrameError::Rejected {
                        event: name.to_string(),
                        reason: format!("status {} is not terminal", payload.status.as_str()),
                    });
                }
                JobEvent::AgentComplete(payload)
            }
            "step" => JobEvent::Step(parse(name, data)?),
            "tool_call" => {
                let payload: ToolCallPayload = parse(name, data)?;
                if payload.tool_call.id.is_empty() {
                    return Err(FrameError::Rejected {
                        event: name.to_string(),
                        reason: "tool call id is empty".to_string(),
                    });
                }
                JobEvent::ToolCall(payload)
            }
            "artifact" => JobEvent::Artifact(parse(name, data)?),
            "complete" => JobEvent::Complete(parse(name, data)?),
            "error" => JobEvent::Error(parse(name, data)?),
            other => return Err(FrameError::UnknownEvent(other.to_string())),
        };
        Ok(event)
    }
}

/// Every event name the protocol defines.
pub const EVENT_NAMES: [&str; 7] = [
    "agent_start",
    "agent_complete",
    "step",
    "tool_call",
    "artifact",
    "complete",
    "error",
];

fn is_known(name: &str) -> bool {
    EVENT_NAMES.contains(&name)
}

fn parse<T: serde::de::DeserializeOwned>(event: &str, data: &str) -> Result<T, FrameError> {
    serde_json::from_str(data).map_err(|source| FrameError::InvalidPayload {
        event: event.to_string(),
        source,
    })
}
