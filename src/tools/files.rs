//! File generator: writes documents into the job workspace.

use std::path::Path;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Tool, ToolContext};
use crate::job::Artifact;

/// Directory under the workspace that receives generated documents.
const DOCUMENTS_DIR: &str = "documents";

const MAX_DOCUMENT_BYTES: usize = 1_000_000;

/// Save a generated document and publish it as a `file` artifact.
pub struct SaveDocument;

#[async_trait]
impl Tool for SaveDocument {
    fn name(&self) -> &str {
        "save_document"
    }

    fn description(&self) -> &str {
        "Save a generated document (markdown, CSV, HTML, plain text) to the workspace. The file is published as a downloadable artifact."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "filename": {
                    "type": "string",
                    "description": "File name only, without directories (e.g. 'launch-plan.md')"
                },
                "content": {
                    "type": "string",
                    "description": "Full file content"
                },
                "title": {
                    "type": "string",
                    "description": "Optional artifact title (defaults to the file name)"
                }
            },
            "required": ["filename", "content"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext<'_>) -> anyhow::Result<Value> {
        let filename = args["filename"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'filename' argument"))?;
        let content = args["content"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'content' argument"))?;
        let title = args["title"].as_str().unwrap_or(filename);

        validate_filename(filename)?;
        if content.len() > MAX_DOCUMENT_BYTES {
            anyhow::bail!(
                "Document is {} bytes; the limit is {} bytes",
                content.len(),
                MAX_DOCUMENT_BYTES
            );
        }

        let dir = ctx.workspace.join(DOCUMENTS_DIR);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(filename);
        tokio::fs::write(&path, content).await?;

        tracing::info!(agent_id = %ctx.emitter.agent_id(), path = %path.display(), "document saved");

        let relative = Path::new(DOCUMENTS_DIR).join(filename);
        let artifact = Artifact::new(
            "file",
            title,
            json!({
                "path": relative.to_string_lossy(),
                "bytes": content.len(),
            }),
        );
        let artifact_id = artifact.id.clone();
        ctx.emitter.artifact(artifact);

        Ok(json!({
            "path": relative.to_string_lossy(),
            "bytes": content.len(),
            "artifactId": artifact_id,
        }))
    }
}

fn validate_filename(filename: &str) -> anyhow::Result<()> {
    let trimmed = filename.trim();
    if trimmed.is_empty()
        || trimmed.starts_with('.')
        || trimmed.contains('/')
        || trimmed.contains('\\')
        || trimmed != filename
    {
        anyhow::bail!("Invalid filename: {:?}", filename);
    }
    Ok(())
}
