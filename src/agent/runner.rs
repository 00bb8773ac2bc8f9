//! Task runner: one agent's bounded reasoning / tool-calling loop.
//!
//! The loop follows the "tools in a loop" pattern:
//! 1. Build context with the system prompt and the task message
//! 2. Call the backend with the available tools
//! 3. Execute each requested tool call and feed the result back
//! 4. Repeat until the backend answers without tool calls or the step
//!    budget runs out
//!
//! Every failure below this boundary is converted into
//! [`TaskOutcome::Failed`]; nothing is propagated to the orchestrator.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::job::{StepKind, TaskSpec, TaskStatus, ToolCall};
use crate::llm::{self, ChatMessage, LlmClient};
use crate::tools::{ToolContext, ToolRegistry};

use super::emitter::TaskEmitter;
use super::prompt::{build_system_prompt, build_task_prompt};

/// Tool results fed back to the model are capped at this many characters.
const MAX_TOOL_RESULT_CHARS: usize = 12_000;

/// Settled output of a producer task, visible read-only to its dependents.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyOutput {
    pub agent_id: String,
    pub name: String,
    pub status: TaskStatus,
    pub output: Option<String>,
}

/// Outputs of every producer a task declared, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DependencyContext {
    outputs: Vec<DependencyOutput>,
}

impl DependencyContext {
    pub fn push(&mut self, output: DependencyOutput) {
        self.outputs.push(output);
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DependencyOutput> {
        self.outputs.iter()
    }

    pub fn get(&self, agent_id: &str) -> Option<&DependencyOutput> {
        self.outputs.iter().find(|o| o.agent_id == agent_id)
    }
}

/// How a task's loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// Final answer, or the last partial answer when the step budget ran out.
    Completed {
        output: String,
        iterations: usize,
        budget_exhausted: bool,
    },
    Failed {
        error: String,
    },
}

impl TaskOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        TaskOutcome::Failed {
            error: error.into(),
        }
    }
}

/// Runs one task to a settled outcome.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Run `spec`, reporting progress through `emitter`. `cancel` is a
    /// best-effort stop request honored at the next suspension point.
    async fn run(
        &self,
        spec: &TaskSpec,
        deps: &DependencyContext,
        emitter: &TaskEmitter,
        cancel: &CancellationToken,
    ) -> TaskOutcome;
}

/// LLM-backed runner.
pub struct TaskRunner {
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
    default_model: String,
    workspace: PathBuf,
}

impl TaskRunner {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tools: Arc<ToolRegistry>,
        default_model: impl Into<String>,
        workspace: impl Into<PathBuf>,
    ) -> Self {
        Self {
            llm,
            tools,
            default_model: default_model.into(),
            workspace: workspace.into(),
        }
    }

    /// Execute one requested call: exactly one `running` record, then
    /// exactly one settled record. Returns the text fed back to the model.
    ///
    /// Backends may reuse call ids across turns, so the record gets its own
    /// id; the backend id only pairs the result message with its request.
    async fn execute_tool_call(&self, call: &llm::ToolCall, emitter: &TaskEmitter) -> String {
        let wire_id = uuid::Uuid::new_v4().to_string();
        let id = wire_id.as_str();
        let name = call.function.name.as_str();
        let parsed = parse_arguments(&call.function.arguments);
        let args = match &parsed {
            Ok(args) => args.clone(),
            Err(_) => Value::String(call.function.arguments.clone()),
        };

        let record = ToolCall::running(id, name, args);
        emitter.tool_call(&record);

        let result = match parsed {
            Ok(args) => {
                let ctx = ToolContext {
                    workspace: &self.workspace,
                    emitter,
                };
                self.tools.execute(name, args, &ctx).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(value) => {
                tracing::debug!(agent_id = %emitter.agent_id(), tool_call_id = %id, tool = %name, "tool call completed");
                let text = match &value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                emitter.tool_call(&record.complete(value));
                truncate_for_model(&text)
            }
            Err(e) => {
                tracing::warn!(agent_id = %emitter.agent_id(), tool_call_id = %id, tool = %name, error = %e, "tool call failed");
                let message = e.to_string();
                emitter.tool_call(&record.fail(message.clone()));
                format!("Error: {}", message)
            }
        }
    }
}

#[async_trait]
impl AgentRunner for TaskRunner {
    async fn run(
        &self,
        spec: &TaskSpec,
        deps: &DependencyContext,
        emitter: &TaskEmitter,
        cancel: &CancellationToken,
    ) -> TaskOutcome {
        let model = spec.model.as_deref().unwrap_or(&self.default_model);
        let mut messages = vec![
            ChatMessage::system(build_system_prompt(spec, &self.tools)),
            ChatMessage::user(build_task_prompt(spec, deps)),
        ];
        let tool_schemas = self.tools.get_tool_schemas();
        let mut partial = String::new();

        for iteration in 0..spec.max_iterations {
            tracing::debug!(agent_id = %spec.id, iteration = iteration + 1, "agent iteration");

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return TaskOutcome::failed("Task cancelled"),
                response = self.llm.chat_completion(model, &messages, Some(&tool_schemas)) => response,
            };
            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(agent_id = %spec.id, error = %e, "backend request failed");
                    return TaskOutcome::failed(format!("LLM request failed: {}", e));
                }
            };

            let content = response.content.filter(|c| !c.trim().is_empty());
            let tool_calls = response.tool_calls.unwrap_or_default();

            if tool_calls.is_empty() {
                return match content {
                    Some(output) => {
                        emitter.step(StepKind::TextOutput, output.clone());
                        TaskOutcome::Completed {
                            output,
                            iterations: iteration + 1,
                            budget_exhausted: false,
                        }
                    }
                    None => TaskOutcome::failed("LLM returned empty response"),
                };
            }

            if let Some(thought) = &content {
                emitter.step(StepKind::Thinking, thought.clone());
                partial = thought.clone();
            }

            // The result message must echo an id the backend can match.
            let tool_calls: Vec<llm::ToolCall> = tool_calls
                .into_iter()
                .map(|mut call| {
                    if call.id.is_empty() {
                        call.id = uuid::Uuid::new_v4().to_string();
                    }
                    call
                })
                .collect();
            messages.push(ChatMessage::assistant_tool_calls(content, tool_calls.clone()));

            for call in &tool_calls {
                if cancel.is_cancelled() {
                    return TaskOutcome::failed("Task cancelled");
                }
                let result = self.execute_tool_call(call, emitter).await;
                messages.push(ChatMessage::tool_result(call.id.clone(), result));
            }
        }

        tracing::info!(agent_id = %spec.id, max_iterations = spec.max_iterations, "step budget exhausted");
        TaskOutcome::Completed {
            output: partial,
            iterations: spec.max_iterations,
            budget_exhausted: true,
        }
    }
}

fn parse_arguments(raw: &str) -> anyhow::Result<Value> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw).map_err(|e| anyhow::anyhow!("Invalid tool arguments: {}", e))
}

fn truncate_for_model(s: &str) -> String {
    match s.char_indices().nth(MAX_TOOL_RESULT_CHARS) {
        Some((cut, _)) => format!("{}... [truncated]", &s[..cut]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ExecutionState;
    use crate::events::JobEvent;
    use crate::job::ToolCallStatus;
    use crate::llm::{ChatResponse, FunctionCall, ToolDefinition};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Replays canned responses; errors once the script runs out.
    struct ScriptedLlm {
        script: Mutex<VecDeque<anyhow::Result<ChatResponse>>>,
    }

    impl ScriptedLlm {
        fn new(script: Vec<anyhow::Result<ChatResponse>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
            })
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn chat_completion(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _tools: Option<&[ToolDefinition]>,
        ) -> anyhow::Result<ChatResponse> {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("script exhausted")))
        }
    }

    fn call(id: &str, name: &str, arguments: &str) -> llm::ToolCall {
        llm::ToolCall {
            id: id.to_string(),
            kind: "function".to_string(),
            function: FunctionCall {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }
    }

    fn tool_turn(content: Option<&str>, calls: Vec<llm::ToolCall>) -> anyhow::Result<ChatResponse> {
        Ok(ChatResponse {
            content: content.map(str::to_string),
            tool_calls: Some(calls),
            ..Default::default()
        })
    }

    fn final_turn(content: &str) -> anyhow::Result<ChatResponse> {
        Ok(ChatResponse {
            content: Some(content.to_string()),
            ..Default::default()
        })
    }

    async fn run_script(
        script: Vec<anyhow::Result<ChatResponse>>,
        spec: TaskSpec,
    ) -> (TaskOutcome, Vec<JobEvent>) {
        let runner = TaskRunner::new(
            ScriptedLlm::new(script),
            Arc::new(ToolRegistry::new()),
            "test-model",
            std::env::temp_dir(),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let emitter = TaskEmitter::new(&spec.id, tx);
        let outcome = runner
            .run(&spec, &DependencyContext::default(), &emitter, &CancellationToken::new())
            .await;
        drop(emitter);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (outcome, events)
    }

    #[tokio::test]
    async fn tool_calls_are_created_then_settled_in_order() {
        let script = vec![
            tool_turn(
                Some("Publishing the tagline first."),
                vec![call(
                    "tc1",
                    "publish_artifact",
                    r#"{"type":"markdown","title":"Tagline","data":"Taste the bold"}"#,
                )],
            ),
            final_turn("Tagline published."),
        ];
        let (outcome, events) = run_script(script, TaskSpec::new("copywriter", "Copywriter")).await;

        assert_eq!(
            outcome,
            TaskOutcome::Completed {
                output: "Tagline published.".to_string(),
                iterations: 2,
                budget_exhausted: false,
            }
        );
        let names: Vec<_> = events.iter().map(JobEvent::event_name).collect();
        assert_eq!(
            names,
            vec!["step", "tool_call", "artifact", "tool_call", "step"]
        );
        match (&events[1], &events[3]) {
            (JobEvent::ToolCall(created), JobEvent::ToolCall(settled)) => {
                assert!(!created.tool_call.id.is_empty());
                assert_eq!(created.tool_call.status, ToolCallStatus::Running);
                assert_eq!(settled.tool_call.id, created.tool_call.id);
                assert_eq!(settled.tool_call.status, ToolCallStatus::Completed);
                assert!(settled.tool_call.completed_at.is_some());
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[tokio::test]
    async fn reused_backend_ids_stay_distinct_invocations() {
        let publish = |title: &str| {
            tool_turn(
                None,
                vec![call(
                    "call_0",
                    "publish_artifact",
                    &format!(r#"{{"type":"markdown","title":"{title}","data":"draft"}}"#),
                )],
            )
        };
        let script = vec![publish("Persona"), publish("Voice"), final_turn("Both published.")];
        let (outcome, events) =
            run_script(script, TaskSpec::new("brand", "Brand Strategist")).await;
        assert!(matches!(outcome, TaskOutcome::Completed { iterations: 3, .. }));

        let mut state = ExecutionState::new();
        state.apply(JobEvent::agent_start("brand", None));
        for event in events {
            state.apply(event);
        }

        let calls = state.tool_calls();
        assert_eq!(calls.len(), 2);
        assert_ne!(calls[0].id, calls[1].id);
        assert!(calls.iter().all(|tc| tc.status == ToolCallStatus::Completed));
        assert_eq!(state.artifacts().len(), 2);

        let agent = state.agent("brand").unwrap();
        let tool_steps = agent.steps.iter().filter(|s| s.tool_call.is_some()).count();
        assert_eq!(tool_steps, 2);
    }

    #[tokio::test]
    async fn budget_exhaustion_is_a_partial_success() {
        let looping = || {
            tool_turn(
                Some("Still researching."),
                vec![call("", "launch_rocket", "{}")],
            )
        };
        let spec = TaskSpec::new("analyst", "Analyst").with_max_iterations(2);
        let (outcome, events) = run_script(vec![looping(), looping(), looping()], spec).await;

        assert_eq!(
            outcome,
            TaskOutcome::Completed {
                output: "Still researching.".to_string(),
                iterations: 2,
                budget_exhausted: true,
            }
        );
        let settled: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                JobEvent::ToolCall(p) if p.tool_call.status.is_settled() => Some(&p.tool_call),
                _ => None,
            })
            .collect();
        assert_eq!(settled.len(), 2);
        assert!(settled.iter().all(|tc| tc.status == ToolCallStatus::Error));
        assert!(settled.iter().all(|tc| !tc.id.is_empty()));
        assert_ne!(settled[0].id, settled[1].id);
    }

    #[tokio::test]
    async fn backend_failure_becomes_failed_outcome() {
        let script = vec![Err(anyhow::anyhow!("502 Bad Gateway"))];
        let (outcome, events) = run_script(script, TaskSpec::new("forecaster", "Forecaster")).await;

        match outcome {
            TaskOutcome::Failed { error } => assert!(error.contains("502 Bad Gateway")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn invalid_arguments_settle_as_error_and_loop_continues() {
        let script = vec![
            tool_turn(None, vec![call("tc9", "publish_artifact", "{not json")]),
            final_turn("Done without the artifact."),
        ];
        let (outcome, events) = run_script(script, TaskSpec::new("writer", "Writer")).await;

        assert!(matches!(outcome, TaskOutcome::Completed { budget_exhausted: false, .. }));
        let statuses: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                JobEvent::ToolCall(p) => Some(p.tool_call.status),
                _ => None,
            })
            .collect();
        assert_eq!(statuses, vec![ToolCallStatus::Running, ToolCallStatus::Error]);
    }

    #[tokio::test]
    async fn empty_response_fails_the_task() {
        let script = vec![Ok(ChatResponse::default())];
        let (outcome, _) = run_script(script, TaskSpec::new("writer", "Writer")).await;
        assert_eq!(outcome, TaskOutcome::failed("LLM returned empty response"));
    }

    #[tokio::test]
    async fn cancelled_task_stops_before_calling_backend() {
        let runner = TaskRunner::new(
            ScriptedLlm::new(vec![final_turn("never used")]),
            Arc::new(ToolRegistry::new()),
            "test-model",
            std::env::temp_dir(),
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        let spec = TaskSpec::new("writer", "Writer");
        let emitter = TaskEmitter::new(&spec.id, tx);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = runner
            .run(&spec, &DependencyContext::default(), &emitter, &cancel)
            .await;
        assert_eq!(outcome, TaskOutcome::failed("Task cancelled"));
    }
}
