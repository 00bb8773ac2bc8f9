//! Client read-model of one job, folded event by event.
//!
//! The fold is the only writer. It keeps insertion order everywhere:
//! agents by first sight, one step log across all agents, tool calls by
//! first sight (later records for the same id update the entry in place),
//! and artifacts deduplicated by id.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::events::{FrameError, JobEvent};
use crate::job::{AgentTask, Artifact, JobResult, Step, TaskStatus, ToolCall};

use super::frames::Frame;

/// Progress a running task reaches through steps alone; the rest comes
/// with `agent_complete`.
const MAX_RUNNING_PROGRESS: u8 = 90;
const PROGRESS_PER_STEP: u8 = 10;

/// Where the consumption of a job stream stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamPhase {
    #[default]
    Idle,
    Streaming,
    /// `complete` received.
    Completed,
    /// `error` received.
    Failed,
    /// Stream closed without a terminal event.
    Aborted,
    /// Consumption stopped by the user.
    Cancelled,
}

impl StreamPhase {
    pub fn is_finished(self) -> bool {
        !matches!(self, StreamPhase::Idle | StreamPhase::Streaming)
    }
}

/// What applying one event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldOutcome {
    Applied,
    /// Duplicate, stale, or arrived after the job finished.
    Ignored,
    /// The event ended the job.
    Terminal,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionState {
    phase: StreamPhase,
    agents: Vec<AgentTask>,
    #[serde(skip)]
    agent_index: HashMap<String, usize>,
    steps: Vec<Step>,
    tool_calls: Vec<ToolCall>,
    #[serde(skip)]
    tool_call_index: HashMap<String, usize>,
    artifacts: Vec<Artifact>,
    #[serde(skip)]
    artifact_ids: HashSet<String>,
    result: Option<JobResult>,
    error: Option<String>,
    skipped_frames: usize,
}

/// Counts for a one-line progress display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSummary {
    pub phase: StreamPhase,
    pub agents: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub steps: usize,
    pub tool_calls: usize,
    pub artifacts: usize,
    pub skipped_frames: usize,
}

impl ExecutionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything, ready for a new job.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.phase.is_finished()
    }

    pub fn agents(&self) -> &[AgentTask] {
        &self.agents
    }

    pub fn agent(&self, id: &str) -> Option<&AgentTask> {
        self.agent_index.get(id).map(|&i| &self.agents[i])
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        &self.tool_calls
    }

    pub fn tool_call(&self, id: &str) -> Option<&ToolCall> {
        self.tool_call_index.get(id).map(|&i| &self.tool_calls[i])
    }

    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    pub fn result(&self) -> Option<&JobResult> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn skipped_frames(&self) -> usize {
        self.skipped_frames
    }

    pub fn summary(&self) -> StateSummary {
        let count = |status: TaskStatus| self.agents.iter().filter(|a| a.status == status).count();
        StateSummary {
            phase: self.phase,
            agents: self.agents.len(),
            running: count(TaskStatus::Running),
            completed: count(TaskStatus::Completed),
            failed: count(TaskStatus::Error),
            timed_out: count(TaskStatus::TimedOut),
            steps: self.steps.len(),
            tool_calls: self.tool_calls.len(),
            artifacts: self.artifacts.len(),
            skipped_frames: self.skipped_frames,
        }
    }

    /// Decode and fold one frame. A frame that fails validation leaves the
    /// state untouched.
    pub fn apply_frame(&mut self, frame: &Frame) -> Result<FoldOutcome, FrameError> {
        let event = JobEvent::from_frame(&frame.event, &frame.data)?;
        Ok(self.apply(event))
    }

    pub fn record_skipped(&mut self) {
        self.skipped_frames += 1;
    }

    /// The stream ended without `complete` or `error`.
    pub fn mark_aborted(&mut self, reason: impl Into<String>) {
        if !self.phase.is_finished() {
            self.phase = StreamPhase::Aborted;
            self.error = Some(reason.into());
        }
    }

    pub fn mark_cancelled(&mut self) {
        if !self.phase.is_finished() {
            self.phase = StreamPhase::Cancelled;
        }
    }

    pub fn apply(&mut self, event: JobEvent) -> FoldOutcome {
        if self.phase.is_finished() {
            return FoldOutcome::Ignored;
        }
        self.phase = StreamPhase::Streaming;

        match event {
            JobEvent::AgentStart(p) => {
                let index = self.agent_entry(&p.agent_id);
                let agent = &mut self.agents[index];
                // A repeated start (reconnect) refreshes a running entry.
                let restart = agent.status == TaskStatus::Running;
                if !restart && !agent.status.can_transition(TaskStatus::Running) {
                    return FoldOutcome::Ignored;
                }
                if let Some(name) = p.agent_name {
                    agent.name = name;
                }
                agent.status = TaskStatus::Running;
                agent.started_at = Some(p.timestamp);
                FoldOutcome::Applied
            }
            JobEvent::AgentComplete(p) => {
                let index = self.agent_entry(&p.agent_id);
                let agent = &mut self.agents[index];
                if !p.status.is_terminal() || !agent.status.can_transition(p.status) {
                    return FoldOutcome::Ignored;
                }
                agent.status = p.status;
                agent.progress = 100;
                agent.completed_at = Some(p.timestamp);
                agent.error = p.error;
                FoldOutcome::Applied
            }
            JobEvent::Step(p) => {
                if let Some(agent_id) = p.agent_id.as_deref() {
                    self.push_agent_step(agent_id, p.step.clone());
                }
                self.steps.push(p.step);
                FoldOutcome::Applied
            }
            JobEvent::ToolCall(p) => self.upsert_tool_call(&p.agent_id, p.tool_call),
            JobEvent::Artifact(p) => {
                if !self.artifact_ids.insert(p.artifact.id.clone()) {
                    return FoldOutcome::Ignored;
                }
                if let Some(agent_id) = p.agent_id.as_deref() {
                    let index = self.agent_entry(agent_id);
                    self.agents[index].artifacts.push(p.artifact.clone());
                }
                self.artifacts.push(p.artifact);
                FoldOutcome::Applied
            }
            JobEvent::Complete(result) => {
                for artifact in &result.artifacts {
                    if self.artifact_ids.insert(artifact.id.clone()) {
                        self.artifacts.push(artifact.clone());
                    }
                }
                self.result = Some(result);
                self.phase = StreamPhase::Completed;
                FoldOutcome::Terminal
            }
            JobEvent::Error(p) => {
                self.error = Some(p.message);
                self.phase = StreamPhase::Failed;
                FoldOutcome::Terminal
            }
        }
    }

    fn upsert_tool_call(&mut self, agent_id: &str, call: ToolCall) -> FoldOutcome {
        if let Some(&index) = self.tool_call_index.get(&call.id) {
            let existing = &mut self.tool_calls[index];
            if call.status.rank() < existing.status.rank() || *existing == call {
                return FoldOutcome::Ignored;
            }
            *existing = call;
            return FoldOutcome::Applied;
        }

        let step = Step::for_tool_call(&call);
        self.tool_call_index
            .insert(call.id.clone(), self.tool_calls.len());
        self.tool_calls.push(call);
        self.push_agent_step(agent_id, step.clone());
        self.steps.push(step);
        FoldOutcome::Applied
    }

    fn push_agent_step(&mut self, agent_id: &str, step: Step) {
        let index = self.agent_entry(agent_id);
        let agent = &mut self.agents[index];
        if agent.status == TaskStatus::Running {
            agent.progress = agent
                .progress
                .saturating_add(PROGRESS_PER_STEP)
                .min(MAX_RUNNING_PROGRESS);
        }
        agent.steps.push(step);
    }

    /// Index of the agent's entry, creating a minimal record when the
    /// agent has not been seen yet (stream joined late or reconnected).
    fn agent_entry(&mut self, agent_id: &str) -> usize {
        if let Some(&index) = self.agent_index.get(agent_id) {
            return index;
        }
        let index = self.agents.len();
        self.agents.push(AgentTask::new(agent_id, agent_id));
        self.agent_index.insert(agent_id.to_string(), index);
        index
    }
}
