//! Per-task handle onto the job's event channel.
//!
//! Every event a task produces goes through its emitter. Once the
//! orchestrator records the task's outcome the emitter is sealed, and the
//! sealing and the terminal `agent_complete` happen under the same lock, so
//! nothing a task emits can land after its terminal event on the stream.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::events::JobEvent;
use crate::job::{Artifact, Step, StepKind, ToolCall};

pub type EventSender = mpsc::UnboundedSender<JobEvent>;

#[derive(Default)]
struct Gate {
    sealed: bool,
    artifacts: Vec<Artifact>,
    artifact_ids: HashSet<String>,
}

#[derive(Clone)]
pub struct TaskEmitter {
    agent_id: Arc<str>,
    tx: EventSender,
    gate: Arc<Mutex<Gate>>,
}

impl TaskEmitter {
    pub fn new(agent_id: &str, tx: EventSender) -> Self {
        Self {
            agent_id: Arc::from(agent_id),
            tx,
            gate: Arc::new(Mutex::new(Gate::default())),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns false when the task is sealed or nobody is listening.
    fn send(&self, gate: &Gate, event: JobEvent) -> bool {
        if gate.sealed {
            tracing::trace!(
                agent_id = %self.agent_id,
                event = event.event_name(),
                "dropping event from settled task"
            );
            return false;
        }
        self.tx.send(event).is_ok()
    }

    pub(crate) fn start(&self, name: &str) -> bool {
        let gate = self.gate();
        self.send(
            &gate,
            JobEvent::agent_start(self.agent_id.as_ref(), Some(name.to_string())),
        )
    }

    /// Append a narration step to the task's trace.
    pub fn step(&self, kind: StepKind, content: impl Into<String>) -> bool {
        let gate = self.gate();
        self.send(
            &gate,
            JobEvent::step(self.agent_id.as_ref(), Step::text(kind, content)),
        )
    }

    /// Report a tool call record (created or settled).
    pub fn tool_call(&self, call: &ToolCall) -> bool {
        let gate = self.gate();
        self.send(
            &gate,
            JobEvent::tool_call(self.agent_id.as_ref(), call.clone()),
        )
    }

    /// Publish an artifact. Repeated ids are ignored.
    pub fn artifact(&self, artifact: Artifact) -> bool {
        let mut gate = self.gate();
        if gate.sealed || gate.artifact_ids.contains(&artifact.id) {
            return false;
        }
        if !self.send(
            &gate,
            JobEvent::artifact(self.agent_id.as_ref(), artifact.clone()),
        ) {
            return false;
        }
        gate.artifact_ids.insert(artifact.id.clone());
        gate.artifacts.push(artifact);
        true
    }

    pub fn is_sealed(&self) -> bool {
        self.gate().sealed
    }

    /// Seal the task, send its terminal event, and hand back every artifact
    /// it published.
    pub(crate) fn finish(&self, terminal: JobEvent) -> Vec<Artifact> {
        let mut gate = self.gate();
        self.send(&gate, terminal);
        gate.sealed = true;
        std::mem::take(&mut gate.artifacts)
    }
}
