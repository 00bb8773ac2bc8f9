//! Tool adapters available to agents.
//!
//! Tools are external collaborators: the runner reports each invocation as
//! a tool call with its arguments and outcome, and never interprets what a
//! tool does.

mod artifact;
mod files;
mod research;
mod web;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::agent::TaskEmitter;
use crate::llm::{FunctionDefinition, ToolDefinition};

pub use artifact::PublishArtifact;
pub use files::SaveDocument;
pub use research::RunResearch;
pub use web::FetchUrl;

/// What a tool can reach while it runs.
pub struct ToolContext<'a> {
    pub workspace: &'a Path,
    pub emitter: &'a TaskEmitter,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, args: Value, ctx: &ToolContext<'_>) -> anyhow::Result<Value>;
}

#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

/// Name-indexed set of tools, listed in registration order.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    /// Registry with the built-in tools.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(PublishArtifact));
        registry.register(Arc::new(SaveDocument));
        registry.register(Arc::new(FetchUrl));
        registry
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Built-ins plus the research sub-process tool when a command is given.
    pub fn with_options(research_command: Option<&str>) -> Self {
        let mut registry = Self::new();
        if let Some(command) = research_command {
            registry.register(Arc::new(RunResearch::new(command)));
        }
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
            })
            .collect()
    }

    pub fn get_tool_schemas(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| ToolDefinition {
                kind: "function".to_string(),
                function: FunctionDefinition {
                    name: t.name().to_string(),
                    description: t.description().to_string(),
                    parameters: t.parameters_schema(),
                },
            })
            .collect()
    }

    pub async fn execute(
        &self,
        name: &str,
        args: Value,
        ctx: &ToolContext<'_>,
    ) -> anyhow::Result<Value> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("Unknown tool: {}", name))?;
        tool.execute(args, ctx).await
    }
}
