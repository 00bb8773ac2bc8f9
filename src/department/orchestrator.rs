//! Department orchestrator.
//!
//! Runs every task of a job concurrently, honoring the dependency graph,
//! races each task against its own deadline and turns the whole run into
//! one ordered stream of [`JobEvent`]s ending in exactly one `complete` or
//! `error`.
//!
//! A deadline only settles the task for aggregation purposes. The runner
//! future keeps going on its own; its emitter is sealed the moment the
//! outcome is recorded, so whatever it produces afterwards never reaches
//! the stream.

use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::agent::{
    AgentRunner, DependencyContext, DependencyOutput, EventSender, TaskEmitter, TaskOutcome,
};
use crate::events::JobEvent;
use crate::job::{AgentOutcome, Artifact, JobResult, JobSpec, TaskSpec, TaskStatus};

use super::graph;

pub type JobStream = Pin<Box<dyn Stream<Item = JobEvent> + Send>>;

/// How a task's race ended.
enum RaceResult {
    Settled(TaskOutcome),
    TimedOut,
}

struct Settled {
    agent_id: String,
    result: RaceResult,
    elapsed: Duration,
}

#[derive(Clone)]
pub struct Orchestrator {
    runner: Arc<dyn AgentRunner>,
}

impl Orchestrator {
    pub fn new(runner: Arc<dyn AgentRunner>) -> Self {
        Self { runner }
    }

    /// Start a job. An invalid spec yields a stream holding a single
    /// `error` event and no task is started.
    pub fn execute(&self, spec: JobSpec, cancel: CancellationToken) -> JobStream {
        if let Err(e) = graph::validate(&spec) {
            tracing::warn!(job_id = %spec.job_id, error = %e, "rejecting job spec");
            return Self::rejected(e.to_string());
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(drive(self.runner.clone(), spec, tx, cancel));

        Box::pin(async_stream::stream! {
            while let Some(event) = rx.recv().await {
                let terminal = event.is_terminal();
                yield event;
                if terminal {
                    break;
                }
            }
        })
    }

    /// A stream holding one job-level `error` event.
    pub fn rejected(message: impl Into<String>) -> JobStream {
        Box::pin(futures::stream::once(futures::future::ready(
            JobEvent::error(message),
        )))
    }
}

/// Race one task against its deadline. The runner lives in its own task
/// so losing the race does not cancel it.
async fn race(
    runner: Arc<dyn AgentRunner>,
    spec: TaskSpec,
    deps: DependencyContext,
    emitter: TaskEmitter,
    cancel: CancellationToken,
) -> Settled {
    let started = Instant::now();
    let agent_id = spec.id.clone();
    let deadline = spec.timeout;

    let handle = tokio::spawn(async move { runner.run(&spec, &deps, &emitter, &cancel).await });

    let result = match tokio::time::timeout(deadline, handle).await {
        Ok(Ok(outcome)) => RaceResult::Settled(outcome),
        Ok(Err(e)) => RaceResult::Settled(TaskOutcome::failed(format!("Task aborted: {}", e))),
        Err(_) => RaceResult::TimedOut,
    };

    Settled {
        agent_id,
        result,
        elapsed: started.elapsed(),
    }
}

async fn drive(
    runner: Arc<dyn AgentRunner>,
    spec: JobSpec,
    tx: EventSender,
    cancel: CancellationToken,
) {
    let job_started = Instant::now();
    let job_id = spec.job_id;
    tracing::info!(%job_id, department = %spec.department, tasks = spec.tasks.len(), "job started");

    let mut started: HashSet<String> = HashSet::new();
    let mut settled: HashSet<String> = HashSet::new();
    let mut emitters: HashMap<String, TaskEmitter> = HashMap::new();
    let mut outcomes: HashMap<String, AgentOutcome> = HashMap::new();
    let mut artifacts: Vec<Artifact> = Vec::new();
    let mut running: JoinSet<Settled> = JoinSet::new();

    loop {
        if !cancel.is_cancelled() {
            let ready: Vec<TaskSpec> = graph::ready(&spec, &started, &settled)
                .into_iter()
                .cloned()
                .collect();

            for task in ready {
                let emitter = TaskEmitter::new(&task.id, tx.clone());
                emitter.start(&task.name);
                tracing::debug!(%job_id, agent_id = %task.id, "task started");

                let mut deps = DependencyContext::default();
                for producer in &task.depends_on {
                    if let Some(outcome) = outcomes.get(producer) {
                        deps.push(DependencyOutput {
                            agent_id: outcome.agent_id.clone(),
                            name: outcome.name.clone(),
                            status: outcome.status,
                            output: outcome.output.clone(),
                        });
                    }
                }

                started.insert(task.id.clone());
                emitters.insert(task.id.clone(), emitter.clone());
                running.spawn(race(
                    runner.clone(),
                    task,
                    deps,
                    emitter,
                    cancel.child_token(),
                ));
            }
        }

        if running.is_empty() {
            break;
        }

        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            joined = running.join_next() => joined,
        };

        let Settled {
            agent_id,
            result,
            elapsed,
        } = match joined {
            Some(Ok(settled)) => settled,
            Some(Err(e)) => {
                tracing::error!(%job_id, error = %e, "task race aborted");
                continue;
            }
            None => break,
        };

        let (status, output, error, budget_exhausted) = match result {
            RaceResult::Settled(TaskOutcome::Completed {
                output,
                budget_exhausted,
                ..
            }) => (
                TaskStatus::Completed,
                Some(output).filter(|o| !o.is_empty()),
                None,
                budget_exhausted,
            ),
            RaceResult::Settled(TaskOutcome::Failed { error }) => {
                (TaskStatus::Error, None, Some(error), false)
            }
            RaceResult::TimedOut => (TaskStatus::TimedOut, None, None, false),
        };

        tracing::info!(
            %job_id,
            agent_id = %agent_id,
            status = status.as_str(),
            duration_ms = elapsed.as_millis() as u64,
            "task settled"
        );

        if let Some(emitter) = emitters.remove(&agent_id) {
            artifacts.extend(emitter.finish(JobEvent::agent_complete(
                agent_id.as_str(),
                status,
                error.clone(),
            )));
        }

        let name = spec
            .task(&agent_id)
            .map(|t| t.name.clone())
            .unwrap_or_else(|| agent_id.clone());
        outcomes.insert(
            agent_id.clone(),
            AgentOutcome {
                agent_id: agent_id.clone(),
                name,
                status,
                output,
                error,
                budget_exhausted,
                duration_ms: elapsed.as_millis() as u64,
            },
        );
        settled.insert(agent_id);
    }

    if cancel.is_cancelled() {
        tracing::info!(%job_id, unsettled = emitters.len(), "job cancelled");
        running.abort_all();
        let elapsed = job_started.elapsed();
        for task in &spec.tasks {
            if outcomes.contains_key(&task.id) {
                continue;
            }
            let error = if started.contains(&task.id) {
                "Job cancelled"
            } else {
                "Job cancelled before the task started"
            };
            if let Some(emitter) = emitters.remove(&task.id) {
                artifacts.extend(emitter.finish(JobEvent::agent_complete(
                    task.id.as_str(),
                    TaskStatus::Error,
                    Some(error.to_string()),
                )));
            }
            outcomes.insert(
                task.id.clone(),
                AgentOutcome {
                    agent_id: task.id.clone(),
                    name: task.name.clone(),
                    status: TaskStatus::Error,
                    output: None,
                    error: Some(error.to_string()),
                    budget_exhausted: false,
                    duration_ms: elapsed.as_millis() as u64,
                },
            );
        }
    }

    let agents: Vec<AgentOutcome> = spec
        .tasks
        .iter()
        .filter_map(|t| outcomes.remove(&t.id))
        .collect();
    let result = JobResult::new(
        job_id,
        spec.department.clone(),
        agents,
        artifacts,
        job_started.elapsed().as_millis() as u64,
    );

    tracing::info!(
        %job_id,
        succeeded = result.succeeded,
        failed = result.failed,
        timed_out = result.timed_out,
        duration_ms = result.duration_ms,
        "job complete"
    );

    if tx.send(JobEvent::Complete(result)).is_err() {
        tracing::debug!(%job_id, "job stream closed before completion");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::StepKind;
    use async_trait::async_trait;
    use futures::StreamExt;
    use serde_json::json;

    #[derive(Clone, Copy, Default)]
    struct Plan {
        work: Duration,
        fail: bool,
        /// Emit a step after finishing the work.
        late_step: bool,
    }

    struct FakeRunner {
        plans: HashMap<&'static str, Plan>,
    }

    impl FakeRunner {
        fn new(plans: Vec<(&'static str, Plan)>) -> Arc<Self> {
            Arc::new(Self {
                plans: plans.into_iter().collect(),
            })
        }
    }

    #[async_trait]
    impl AgentRunner for FakeRunner {
        async fn run(
            &self,
            spec: &TaskSpec,
            deps: &DependencyContext,
            emitter: &TaskEmitter,
            _cancel: &CancellationToken,
        ) -> TaskOutcome {
            let plan = self.plans.get(spec.id.as_str()).copied().unwrap_or_default();
            emitter.step(StepKind::Thinking, format!("{} working", spec.id));
            emitter.artifact(Artifact::new(
                "markdown",
                format!("{} draft", spec.id),
                json!({"by": spec.id}),
            ));
            tokio::time::sleep(plan.work).await;
            if plan.late_step {
                emitter.step(StepKind::TextOutput, format!("{} finished", spec.id));
            }
            if plan.fail {
                return TaskOutcome::failed(format!("{} backend unavailable", spec.id));
            }
            let seen: Vec<String> = deps.iter().filter_map(|d| d.output.clone()).collect();
            let output = if seen.is_empty() {
                format!("{} done", spec.id)
            } else {
                format!("{} saw [{}]", spec.id, seen.join(", "))
            };
            TaskOutcome::Completed {
                output,
                iterations: 1,
                budget_exhausted: false,
            }
        }
    }

    fn work(secs: u64) -> Plan {
        Plan {
            work: Duration::from_secs(secs),
            ..Default::default()
        }
    }

    async fn collect_timed(stream: JobStream) -> Vec<(Duration, JobEvent)> {
        let start = Instant::now();
        stream.map(move |e| (start.elapsed(), e)).collect().await
    }

    fn position(events: &[(Duration, JobEvent)], name: &str, agent: &str) -> usize {
        events
            .iter()
            .position(|(_, e)| e.event_name() == name && e.agent_id() == Some(agent))
            .unwrap_or_else(|| panic!("no {name} for {agent}"))
    }

    fn assert_at(at: Duration, secs: u64) {
        let expected = Duration::from_secs(secs);
        assert!(
            at >= expected && at < expected + Duration::from_millis(50),
            "expected ~{secs}s, got {at:?}"
        );
    }

    fn final_result(events: &[(Duration, JobEvent)]) -> &JobResult {
        match events.last() {
            Some((_, JobEvent::Complete(result))) => result,
            other => panic!("stream did not end with complete: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dependency_and_timeout_scenario() {
        let runner = FakeRunner::new(vec![("a", work(2)), ("b", work(1)), ("c", work(10))]);
        let spec = JobSpec::new(
            "test",
            vec![
                TaskSpec::new("a", "A"),
                TaskSpec::new("b", "B").depends_on("a"),
                TaskSpec::new("c", "C").with_timeout(Duration::from_secs(5)),
            ],
        );

        let events = collect_timed(
            Orchestrator::new(runner).execute(spec, CancellationToken::new()),
        )
        .await;

        let a_done = position(&events, "agent_complete", "a");
        let b_start = position(&events, "agent_start", "b");
        let b_done = position(&events, "agent_complete", "b");
        let c_done = position(&events, "agent_complete", "c");

        assert_at(events[a_done].0, 2);
        assert!(b_start > a_done);
        assert_at(events[b_done].0, 3);
        assert_at(events[c_done].0, 5);
        match &events[c_done].1 {
            JobEvent::AgentComplete(p) => {
                assert_eq!(p.status, TaskStatus::TimedOut);
                assert!(p.error.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let (complete_at, _) = events.last().unwrap();
        assert_at(*complete_at, 5);
        let result = final_result(&events);
        assert_eq!(result.succeeded, 2);
        assert_eq!(result.timed_out, 1);
        assert_eq!(result.outcome("b").unwrap().output.as_deref(), Some("b saw [a done]"));
        assert_eq!(result.outcome("c").unwrap().status, TaskStatus::TimedOut);
        // Artifacts already published by the timed-out task stay in the aggregate.
        assert_eq!(result.artifacts.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn independent_tasks_each_start_and_settle_once() {
        let ids = ["w", "x", "y", "z"];
        let runner = FakeRunner::new(ids.iter().map(|id| (*id, work(1))).collect());
        let spec = JobSpec::new(
            "test",
            ids.iter().map(|id| TaskSpec::new(*id, id.to_uppercase())).collect(),
        );

        let events = collect_timed(
            Orchestrator::new(runner).execute(spec, CancellationToken::new()),
        )
        .await;

        let count = |name: &str| events.iter().filter(|(_, e)| e.event_name() == name).count();
        assert_eq!(count("agent_start"), 4);
        assert_eq!(count("agent_complete"), 4);
        assert_eq!(count("complete"), 1);
        assert_eq!(count("error"), 0);

        let complete = events.len() - 1;
        for id in ids {
            assert!(position(&events, "agent_complete", id) < complete);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn one_failure_does_not_fail_the_job() {
        let failing = Plan {
            work: Duration::from_secs(1),
            fail: true,
            ..Default::default()
        };
        let runner = FakeRunner::new(vec![
            ("a", work(1)),
            ("b", failing),
            ("c", work(2)),
            ("d", work(3)),
        ]);
        let spec = JobSpec::new(
            "test",
            ["a", "b", "c", "d"].iter().map(|id| TaskSpec::new(*id, *id)).collect(),
        );

        let events = collect_timed(
            Orchestrator::new(runner).execute(spec, CancellationToken::new()),
        )
        .await;

        let result = final_result(&events);
        assert_eq!(result.succeeded, 3);
        assert_eq!(result.failed, 1);
        let b = result.outcome("b").unwrap();
        assert_eq!(b.status, TaskStatus::Error);
        assert_eq!(b.error.as_deref(), Some("b backend unavailable"));
        assert!(!events.iter().any(|(_, e)| e.event_name() == "error"));
    }

    #[tokio::test(start_paused = true)]
    async fn late_output_after_timeout_is_discarded() {
        let slow = Plan {
            work: Duration::from_secs(3),
            late_step: true,
            ..Default::default()
        };
        let runner = FakeRunner::new(vec![("slow", slow), ("steady", work(6))]);
        let spec = JobSpec::new(
            "test",
            vec![
                TaskSpec::new("slow", "Slow").with_timeout(Duration::from_secs(1)),
                TaskSpec::new("steady", "Steady"),
            ],
        );

        let events = collect_timed(
            Orchestrator::new(runner).execute(spec, CancellationToken::new()),
        )
        .await;

        let slow_done = position(&events, "agent_complete", "slow");
        assert!(events[slow_done + 1..]
            .iter()
            .all(|(_, e)| e.agent_id() != Some("slow")));
        assert_at(events.last().unwrap().0, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn dependent_of_failed_producer_still_runs() {
        let failing = Plan {
            fail: true,
            ..Default::default()
        };
        let runner = FakeRunner::new(vec![("a", failing), ("b", work(1))]);
        let spec = JobSpec::new(
            "test",
            vec![TaskSpec::new("a", "A"), TaskSpec::new("b", "B").depends_on("a")],
        );

        let events = collect_timed(
            Orchestrator::new(runner).execute(spec, CancellationToken::new()),
        )
        .await;

        assert!(position(&events, "agent_start", "b") > position(&events, "agent_complete", "a"));
        let result = final_result(&events);
        assert_eq!(result.outcome("b").unwrap().output.as_deref(), Some("b done"));
    }

    #[tokio::test]
    async fn invalid_spec_yields_single_error() {
        let spec = JobSpec::new(
            "test",
            vec![
                TaskSpec::new("a", "A").depends_on("b"),
                TaskSpec::new("b", "B").depends_on("a"),
            ],
        );
        let events: Vec<JobEvent> = Orchestrator::new(FakeRunner::new(vec![]))
            .execute(spec, CancellationToken::new())
            .collect()
            .await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            JobEvent::Error(p) => assert!(p.message.contains("cycle")),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_settles_unfinished_tasks() {
        let runner = FakeRunner::new(vec![("a", work(1)), ("b", work(30)), ("c", work(1))]);
        let spec = JobSpec::new(
            "test",
            vec![
                TaskSpec::new("a", "A"),
                TaskSpec::new("b", "B"),
                TaskSpec::new("c", "C").depends_on("b"),
            ],
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            trigger.cancel();
        });

        let events = collect_timed(Orchestrator::new(runner).execute(spec, cancel)).await;

        assert_at(events.last().unwrap().0, 2);
        let result = final_result(&events);
        assert_eq!(result.outcome("a").unwrap().status, TaskStatus::Completed);
        assert_eq!(result.outcome("b").unwrap().error.as_deref(), Some("Job cancelled"));
        assert_eq!(
            result.outcome("c").unwrap().error.as_deref(),
            Some("Job cancelled before the task started")
        );
        assert!(!events.iter().any(|(_, e)| e.agent_id() == Some("c")));
    }
}
