//! Sub-process research tool.
//!
//! Runs an external research program (for example a crew of research agents
//! written in another language) with the tool arguments as JSON on stdin,
//! and reads one JSON document back from stdout.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{Tool, ToolContext};

const DEFAULT_TIMEOUT_SECS: u64 = 300;

pub struct RunResearch {
    command: String,
    timeout: Duration,
}

impl RunResearch {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Tool for RunResearch {
    fn name(&self) -> &str {
        "run_research"
    }

    fn description(&self) -> &str {
        "Run in-depth market and competitive research. Provide the company, industry and competitors; returns a structured research report."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "companyName": {
                    "type": "string",
                    "description": "Company to research"
                },
                "industry": {
                    "type": "string",
                    "description": "Industry or market"
                },
                "competitors": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Known competitors (optional)"
                },
                "targetAudience": {
                    "type": "string",
                    "description": "Target audience (optional)"
                }
            },
            "required": ["companyName", "industry"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext<'_>) -> anyhow::Result<Value> {
        tracing::info!(agent_id = %ctx.emitter.agent_id(), command = %self.command, "Starting research process");

        let (shell, shell_arg) = if cfg!(target_os = "windows") {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        };

        let mut child = Command::new(shell)
            .arg(shell_arg)
            .arg(&self.command)
            .current_dir(ctx.workspace)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| anyhow::anyhow!("Failed to start research process: {}", e))?;

        // The deadline covers feeding stdin too: a program that never reads
        // it would otherwise block the write once the pipe fills.
        let payload = args.to_string();
        let run = async move {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(payload.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            child.wait_with_output().await
        };

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "Research process timed out after {} seconds",
                    self.timeout.as_secs()
                )
            })?
            .map_err(|e| anyhow::anyhow!("Research process failed: {}", e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() && stdout.trim().is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "Research process exited with {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            );
        }

        parse_report(&stdout)
    }
}

/// Parse the program's stdout. A report of the form
/// `{"success": false, "error": "..."}` is a failure.
fn parse_report(stdout: &str) -> anyhow::Result<Value> {
    let report: Value = serde_json::from_str(stdout.trim())
        .map_err(|e| anyhow::anyhow!("Research process returned invalid JSON: {}", e))?;

    if report.get("success").and_then(Value::as_bool) == Some(false) {
        let message = report
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("research failed");
        anyhow::bail!("{}", message);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::TaskEmitter;
    use tokio::sync::mpsc;

    #[test]
    fn failure_reports_become_errors() {
        let err = parse_report(r#"{"success": false, "error": "OPENAI_API_KEY not set"}"#)
            .unwrap_err();
        assert_eq!(err.to_string(), "OPENAI_API_KEY not set");

        let ok = parse_report(r#"{"success": true, "summary": "ok"}"#).unwrap();
        assert_eq!(ok["summary"], "ok");

        assert!(parse_report("Traceback (most recent call last)").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn passes_arguments_on_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let emitter = TaskEmitter::new("market_researcher", tx);
        let ctx = ToolContext {
            workspace: dir.path(),
            emitter: &emitter,
        };

        let args = json!({"companyName": "Acme", "industry": "SaaS"});
        let report = RunResearch::new("cat").execute(args.clone(), &ctx).await.unwrap();
        assert_eq!(report, args);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_process_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let emitter = TaskEmitter::new("market_researcher", tx);
        let ctx = ToolContext {
            workspace: dir.path(),
            emitter: &emitter,
        };

        let err = RunResearch::new("sleep 5")
            .with_timeout(Duration::from_millis(100))
            .execute(json!({}), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unread_stdin_is_bounded_by_the_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let emitter = TaskEmitter::new("market_researcher", tx);
        let ctx = ToolContext {
            workspace: dir.path(),
            emitter: &emitter,
        };

        // Far larger than any pipe buffer.
        let args = json!({"companyName": "x".repeat(1 << 20)});
        let started = std::time::Instant::now();
        let err = RunResearch::new("sleep 5")
            .with_timeout(Duration::from_millis(200))
            .execute(args, &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"), "{err}");
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
