//! In-memory job registry (non-persistent).
//!
//! Every event that leaves the server for a job is also folded here with the
//! same [`ExecutionState`] the client uses, so polling consumers see the
//! identical read-model. Finished jobs are kept up to a fixed limit.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::types::{JobSnapshot, JobSummary};
use crate::client::ExecutionState;
use crate::events::JobEvent;

struct JobRecord {
    department: String,
    submitted_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    state: ExecutionState,
}

#[derive(Default)]
struct RegistryInner {
    jobs: HashMap<Uuid, JobRecord>,
    /// Submission order, oldest first.
    order: Vec<Uuid>,
    finished: VecDeque<Uuid>,
}

#[derive(Clone)]
pub struct JobRegistry {
    inner: Arc<RwLock<RegistryInner>>,
    history_limit: usize,
}

impl JobRegistry {
    pub fn new(history_limit: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryInner::default())),
            history_limit,
        }
    }

    pub async fn register(&self, id: Uuid, department: &str) {
        let mut inner = self.inner.write().await;
        inner.jobs.insert(
            id,
            JobRecord {
                department: department.to_string(),
                submitted_at: Utc::now(),
                finished_at: None,
                state: ExecutionState::new(),
            },
        );
        inner.order.push(id);
    }

    /// Fold one outgoing event into the job's snapshot.
    pub async fn record(&self, id: Uuid, event: &JobEvent) {
        let mut inner = self.inner.write().await;
        let finished = match inner.jobs.get_mut(&id) {
            Some(record) => {
                record.state.apply(event.clone());
                record.state.is_finished() && record.finished_at.is_none()
            }
            None => return,
        };
        if finished {
            self.finish_locked(&mut inner, id);
        }
    }

    /// The stream for `id` went away. A job that never reached its terminal
    /// event is marked cancelled.
    pub async fn close(&self, id: Uuid) {
        let mut inner = self.inner.write().await;
        let pending = match inner.jobs.get_mut(&id) {
            Some(record) if record.finished_at.is_none() => {
                record.state.mark_cancelled();
                true
            }
            _ => false,
        };
        if pending {
            self.finish_locked(&mut inner, id);
        }
    }

    fn finish_locked(&self, inner: &mut RegistryInner, id: Uuid) {
        if let Some(record) = inner.jobs.get_mut(&id) {
            record.finished_at = Some(Utc::now());
        }
        inner.finished.push_back(id);
        while inner.finished.len() > self.history_limit {
            if let Some(evicted) = inner.finished.pop_front() {
                inner.jobs.remove(&evicted);
                inner.order.retain(|j| *j != evicted);
                tracing::debug!(job_id = %evicted, "evicted finished job");
            }
        }
    }

    pub async fn get(&self, id: Uuid) -> Option<JobSnapshot> {
        let inner = self.inner.read().await;
        inner.jobs.get(&id).map(|record| JobSnapshot {
            id,
            department: record.department.clone(),
            submitted_at: record.submitted_at,
            finished_at: record.finished_at,
            state: record.state.clone(),
        })
    }

    /// Summaries, newest first.
    pub async fn list(&self) -> Vec<JobSummary> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .rev()
            .filter_map(|id| {
                inner.jobs.get(id).map(|record| JobSummary {
                    id: *id,
                    department: record.department.clone(),
                    phase: record.state.phase(),
                    submitted_at: record.submitted_at,
                    finished_at: record.finished_at,
                    progress: record.state.summary(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::StreamPhase;
    use crate::job::{JobResult, TaskStatus};

    #[tokio::test]
    async fn events_fold_into_snapshot() {
        let registry = JobRegistry::new(8);
        let id = Uuid::new_v4();
        registry.register(id, "finance").await;
        registry
            .record(id, &JobEvent::agent_start("forecaster", None))
            .await;

        let snapshot = registry.get(id).await.unwrap();
        assert_eq!(snapshot.state.phase(), StreamPhase::Streaming);
        assert_eq!(
            snapshot.state.agent("forecaster").unwrap().status,
            TaskStatus::Running
        );
        assert!(snapshot.finished_at.is_none());

        registry
            .record(
                id,
                &JobEvent::Complete(JobResult::new(id, "finance", vec![], vec![], 1)),
            )
            .await;
        let snapshot = registry.get(id).await.unwrap();
        assert_eq!(snapshot.state.phase(), StreamPhase::Completed);
        assert!(snapshot.finished_at.is_some());
    }

    #[tokio::test]
    async fn closing_unfinished_job_marks_it_cancelled() {
        let registry = JobRegistry::new(8);
        let id = Uuid::new_v4();
        registry.register(id, "marketing").await;
        registry.close(id).await;

        let jobs = registry.list().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].phase, StreamPhase::Cancelled);
        assert!(jobs[0].finished_at.is_some());
    }

    #[tokio::test]
    async fn finished_jobs_beyond_limit_are_evicted() {
        let registry = JobRegistry::new(2);
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            registry.register(*id, "research").await;
            registry.record(*id, &JobEvent::error("boom")).await;
        }
        let running = Uuid::new_v4();
        registry.register(running, "research").await;

        assert!(registry.get(ids[0]).await.is_none());
        let listed: Vec<Uuid> = registry.list().await.into_iter().map(|j| j.id).collect();
        assert_eq!(listed, vec![running, ids[2], ids[1]]);
    }
}
