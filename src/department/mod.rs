//! Departments: named agent sets, their dependency graphs, and the
//! orchestrator that runs one job to completion.

mod catalog;
mod graph;
mod orchestrator;

pub use catalog::{
    render_template, AgentDefinition, Catalog, CatalogError, DepartmentDefinition, JobDefaults,
};
pub use graph::{ready, validate};
pub use orchestrator::{JobStream, Orchestrator};
