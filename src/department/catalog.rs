//! Department catalog: the named, fixed agent sets a job can be run with.
//!
//! The built-in catalog is embedded YAML; a deployment can replace it with
//! its own file (`DEPARTMENTS_FILE`).

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::{JobRequest, JobSpec, JobSpecError, TaskSpec};

use super::graph;

const BUILTIN_DEPARTMENTS_YAML: &str = include_str!("departments.yaml");

/// Rendered in place of a placeholder the request did not bind.
const UNBOUND_INPUT: &str = "not provided";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid catalog: {0}")]
    Invalid(String),
}

/// One agent within a department.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub id: String,
    pub name: String,
    pub role: String,
    /// Instruction template; `{{input}}` placeholders are bound per job.
    pub instructions: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub max_iterations: Option<usize>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentDefinition {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required_inputs: Vec<String>,
    pub agents: Vec<AgentDefinition>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    departments: Vec<DepartmentDefinition>,
}

/// Values applied when neither the request nor the agent definition sets one.
#[derive(Debug, Clone, Copy)]
pub struct JobDefaults {
    pub max_iterations: usize,
    pub timeout: Duration,
}

impl Default for JobDefaults {
    fn default() -> Self {
        Self {
            max_iterations: 12,
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Catalog {
    departments: Vec<DepartmentDefinition>,
}

impl Catalog {
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_yaml(BUILTIN_DEPARTMENTS_YAML)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    /// Parse and validate: unique kinds, and every department's agent graph
    /// must be schedulable.
    pub fn from_yaml(raw: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_yaml::from_str(raw)?;

        let mut kinds = HashSet::new();
        for dept in &file.departments {
            if !kinds.insert(dept.kind.as_str()) {
                return Err(CatalogError::Invalid(format!(
                    "duplicate department kind: {}",
                    dept.kind
                )));
            }
            let candidate = JobSpec::new(
                dept.kind.clone(),
                dept.agents
                    .iter()
                    .map(|a| {
                        let mut task = TaskSpec::new(a.id.clone(), a.name.clone());
                        task.depends_on = a.depends_on.clone();
                        if let Some(max) = a.max_iterations {
                            task.max_iterations = max;
                        }
                        if let Some(secs) = a.timeout_secs {
                            task.timeout = Duration::from_secs(secs);
                        }
                        task
                    })
                    .collect(),
            );
            graph::validate(&candidate)
                .map_err(|e| CatalogError::Invalid(format!("{}: {}", dept.kind, e)))?;
        }

        Ok(Self {
            departments: file.departments,
        })
    }

    pub fn get(&self, kind: &str) -> Option<&DepartmentDefinition> {
        self.departments.iter().find(|d| d.kind == kind)
    }

    pub fn list(&self) -> &[DepartmentDefinition] {
        &self.departments
    }

    /// Instantiate a job for department `kind` from a request.
    ///
    /// Request-level overrides win over agent settings, which win over
    /// `defaults`.
    pub fn job_spec(
        &self,
        kind: &str,
        request: &JobRequest,
        defaults: &JobDefaults,
    ) -> Result<JobSpec, JobSpecError> {
        let dept = self
            .get(kind)
            .ok_or_else(|| JobSpecError::UnknownDepartment(kind.to_string()))?;

        for name in &dept.required_inputs {
            if request.input_text(name).is_none() {
                return Err(JobSpecError::MissingInput(name.clone()));
            }
        }

        let inputs: BTreeMap<String, String> = request
            .inputs
            .keys()
            .filter_map(|k| request.input_text(k).map(|v| (k.clone(), v)))
            .collect();

        let tasks = dept
            .agents
            .iter()
            .map(|agent| TaskSpec {
                id: agent.id.clone(),
                name: agent.name.clone(),
                role: render_template(&agent.role, &inputs),
                instructions: render_template(&agent.instructions, &inputs),
                inputs: inputs.clone(),
                depends_on: agent.depends_on.clone(),
                max_iterations: request
                    .max_iterations
                    .or(agent.max_iterations)
                    .unwrap_or(defaults.max_iterations),
                timeout: request
                    .timeout_secs
                    .or(agent.timeout_secs)
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.timeout),
                model: request.model.clone(),
            })
            .collect();

        let spec = JobSpec::new(kind, tasks);
        graph::validate(&spec)?;
        Ok(spec)
    }
}

/// Substitute `{{name}}` placeholders. Unbound names render as
/// "not provided"; text without a closing brace pair is kept verbatim.
pub fn render_template(template: &str, inputs: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        match after.find("}}") {
            Some(close) => {
                let key = after[..close].trim();
                match inputs.get(key) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(UNBOUND_INPUT),
                }
                rest = &after[close + 2..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
