//! Task dependency graph: validation and scheduling.

use std::collections::{HashMap, HashSet};

use crate::job::{JobSpec, JobSpecError, TaskSpec};

/// Check that `spec` can be scheduled: at least one task, unique ids, a
/// positive step budget and deadline everywhere, and an acyclic graph over
/// known tasks.
pub fn validate(spec: &JobSpec) -> Result<(), JobSpecError> {
    if spec.tasks.is_empty() {
        return Err(JobSpecError::NoTasks);
    }

    let mut ids = HashSet::new();
    for task in &spec.tasks {
        if !ids.insert(task.id.as_str()) {
            return Err(JobSpecError::DuplicateTask(task.id.clone()));
        }
        if task.max_iterations == 0 {
            return Err(JobSpecError::ZeroBudget(task.id.clone()));
        }
        if task.timeout.is_zero() {
            return Err(JobSpecError::ZeroTimeout(task.id.clone()));
        }
    }

    for task in &spec.tasks {
        for dep in &task.depends_on {
            if dep == &task.id {
                return Err(JobSpecError::SelfDependency(task.id.clone()));
            }
            if !ids.contains(dep.as_str()) {
                return Err(JobSpecError::UnknownDependency {
                    task: task.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    // Kahn's algorithm: whatever never reaches in-degree zero sits on a cycle.
    let mut in_degree: HashMap<&str, usize> = spec
        .tasks
        .iter()
        .map(|t| (t.id.as_str(), t.depends_on.len()))
        .collect();
    let mut queue: Vec<&str> = spec
        .tasks
        .iter()
        .filter(|t| t.depends_on.is_empty())
        .map(|t| t.id.as_str())
        .collect();

    while let Some(done) = queue.pop() {
        for task in &spec.tasks {
            let edges = task.depends_on.iter().filter(|d| d.as_str() == done).count();
            if edges == 0 {
                continue;
            }
            if let Some(degree) = in_degree.get_mut(task.id.as_str()) {
                *degree -= edges;
                if *degree == 0 {
                    queue.push(task.id.as_str());
                }
            }
        }
    }

    let stuck: Vec<String> = spec
        .tasks
        .iter()
        .filter(|t| in_degree.get(t.id.as_str()).copied().unwrap_or(0) > 0)
        .map(|t| t.id.clone())
        .collect();
    if !stuck.is_empty() {
        return Err(JobSpecError::DependencyCycle(stuck));
    }
    Ok(())
}

/// Tasks that have not started and whose producers have all settled, in
/// declaration order.
pub fn ready<'a>(
    spec: &'a JobSpec,
    started: &HashSet<String>,
    settled: &HashSet<String>,
) -> Vec<&'a TaskSpec> {
    spec.tasks
        .iter()
        .filter(|t| !started.contains(&t.id))
        .filter(|t| t.depends_on.iter().all(|dep| settled.contains(dep)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn job(tasks: Vec<TaskSpec>) -> JobSpec {
        JobSpec::new("test", tasks)
    }

    fn set(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn diamond_graph_is_valid() {
        let spec = job(vec![
            TaskSpec::new("a", "A"),
            TaskSpec::new("b", "B").depends_on("a"),
            TaskSpec::new("c", "C").depends_on("a"),
            TaskSpec::new("d", "D").depends_on("b").depends_on("c"),
        ]);
        assert_eq!(validate(&spec), Ok(()));
    }

    #[test]
    fn structural_problems_are_rejected() {
        assert_eq!(validate(&job(vec![])), Err(JobSpecError::NoTasks));

        assert_eq!(
            validate(&job(vec![TaskSpec::new("a", "A"), TaskSpec::new("a", "A2")])),
            Err(JobSpecError::DuplicateTask("a".into()))
        );

        assert_eq!(
            validate(&job(vec![TaskSpec::new("a", "A").depends_on("a")])),
            Err(JobSpecError::SelfDependency("a".into()))
        );

        assert_eq!(
            validate(&job(vec![TaskSpec::new("a", "A").depends_on("ghost")])),
            Err(JobSpecError::UnknownDependency {
                task: "a".into(),
                dependency: "ghost".into()
            })
        );

        assert_eq!(
            validate(&job(vec![TaskSpec::new("a", "A").with_max_iterations(0)])),
            Err(JobSpecError::ZeroBudget("a".into()))
        );

        assert_eq!(
            validate(&job(vec![
                TaskSpec::new("a", "A"),
                TaskSpec::new("b", "B").with_timeout(Duration::ZERO),
            ])),
            Err(JobSpecError::ZeroTimeout("b".into()))
        );
    }

    #[test]
    fn cycles_report_every_member() {
        let spec = job(vec![
            TaskSpec::new("root", "Root"),
            TaskSpec::new("x", "X").depends_on("root").depends_on("z"),
            TaskSpec::new("y", "Y").depends_on("x"),
            TaskSpec::new("z", "Z").depends_on("y"),
        ]);
        assert_eq!(
            validate(&spec),
            Err(JobSpecError::DependencyCycle(vec![
                "x".into(),
                "y".into(),
                "z".into()
            ]))
        );
    }

    #[test]
    fn ready_waits_for_every_producer() {
        let spec = job(vec![
            TaskSpec::new("analyst", "Analyst"),
            TaskSpec::new("forecaster", "Forecaster"),
            TaskSpec::new("writer", "Writer")
                .depends_on("analyst")
                .depends_on("forecaster"),
        ]);

        let ids = |tasks: Vec<&TaskSpec>| tasks.iter().map(|t| t.id.clone()).collect::<Vec<_>>();

        assert_eq!(
            ids(ready(&spec, &set(&[]), &set(&[]))),
            vec!["analyst", "forecaster"]
        );
        assert!(ready(&spec, &set(&["analyst", "forecaster"]), &set(&["analyst"])).is_empty());
        assert_eq!(
            ids(ready(
                &spec,
                &set(&["analyst", "forecaster"]),
                &set(&["analyst", "forecaster"])
            )),
            vec!["writer"]
        );
    }
}
