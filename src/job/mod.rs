//! Job data model.
//!
//! A job is one request to a department: a fixed set of agent tasks, each
//! producing an ordered trace of steps, tool calls and artifacts, and one
//! aggregate result once every task has settled.

mod spec;
mod types;

pub use spec::{JobRequest, JobSpec, JobSpecError, TaskSpec};
pub use types::{
    AgentOutcome, AgentTask, Artifact, JobResult, Step, StepKind, TaskStatus, ToolCall,
    ToolCallStatus,
};
