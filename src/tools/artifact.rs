//! Artifact publishing tool.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Tool, ToolContext};
use crate::job::Artifact;

/// Publish a user-facing artifact as soon as it exists.
pub struct PublishArtifact;

#[async_trait]
impl Tool for PublishArtifact {
    fn name(&self) -> &str {
        "publish_artifact"
    }

    fn description(&self) -> &str {
        "Publish a finished deliverable (copy, slide outline, chart data, table, report section) so the user can see it immediately. Call once per deliverable."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "type": {
                    "type": "string",
                    "description": "Artifact type tag, e.g. 'markdown', 'chart', 'slides', 'table'"
                },
                "title": {
                    "type": "string",
                    "description": "Short human-readable title"
                },
                "data": {
                    "description": "Artifact payload (any JSON value)"
                }
            },
            "required": ["type", "title", "data"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext<'_>) -> anyhow::Result<Value> {
        let kind = args["type"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'type' argument"))?;
        let title = args["title"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'title' argument"))?;
        let data = args.get("data").cloned().unwrap_or(Value::Null);

        let artifact = Artifact::new(kind, title, data);
        let id = artifact.id.clone();
        if !ctx.emitter.artifact(artifact) {
            anyhow::bail!("Artifact could not be published; the task has already settled");
        }

        tracing::debug!(agent_id = %ctx.emitter.agent_id(), artifact_id = %id, "artifact published");
        Ok(json!({ "artifactId": id }))
    }
}
