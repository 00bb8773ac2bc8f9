//! Command-line job watcher.
//!
//! Submits a department job to a running server and follows its event
//! stream until the job ends, then prints what the agents did.
//!
//! Usage:
//!   job-watch http://127.0.0.1:3000 research companyName=Acme industry=logistics
//!   job-watch --json http://10.0.0.5:3000 marketing product=Widget

use anyhow::{bail, Context, Result};
use clap::Parser;
use department_runner::client::{ExecutionState, JobClient, StreamPhase};
use department_runner::job::JobRequest;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "job-watch")]
#[command(about = "Run a department job and follow its event stream")]
struct Args {
    /// Base URL of the department runner.
    server: String,

    /// Department kind (e.g. "research").
    kind: String,

    /// Job inputs as key=value pairs.
    inputs: Vec<String>,

    /// Model override for every agent.
    #[arg(long)]
    model: Option<String>,

    /// Per-agent deadline override, in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Print the final execution state as JSON.
    #[arg(long)]
    json: bool,
}

fn parse_input(raw: &str) -> Result<(String, String)> {
    let (key, value) = raw
        .split_once('=')
        .with_context(|| format!("input '{}' is not key=value", raw))?;
    let key = key.trim();
    if key.is_empty() {
        bail!("input '{}' has an empty key", raw);
    }
    Ok((key.to_string(), value.to_string()))
}

fn print_report(state: &ExecutionState) {
    let summary = state.summary();
    println!(
        "phase: {:?}  agents: {}  completed: {}  failed: {}  timed out: {}",
        summary.phase, summary.agents, summary.completed, summary.failed, summary.timed_out
    );
    if let Some(error) = state.error() {
        println!("error: {}", error);
    }

    for agent in state.agents() {
        println!();
        println!("== {} ({}) [{}]", agent.name, agent.id, agent.status.as_str());
        for step in &agent.steps {
            match (&step.content, &step.tool_call) {
                (Some(content), _) => println!("  - {}", content),
                (None, Some(call)) => println!("  > {} ({:?})", call.tool_name, call.status),
                (None, None) => {}
            }
        }
        if let Some(error) = &agent.error {
            println!("  ! {}", error);
        }
    }

    if let Some(result) = state.result() {
        for outcome in &result.agents {
            if let Some(output) = &outcome.output {
                println!();
                println!("## {}", outcome.name);
                println!("{}", output);
            }
        }
    }

    if !state.artifacts().is_empty() {
        println!();
        println!("artifacts:");
        for artifact in state.artifacts() {
            println!("  [{}] {}", artifact.kind, artifact.title);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "department_runner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut request = JobRequest {
        model: args.model,
        timeout_secs: args.timeout_secs,
        ..JobRequest::default()
    };
    for raw in &args.inputs {
        let (key, value) = parse_input(raw)?;
        request = request.with_input(key, value);
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let client = JobClient::new(&args.server)?;
    let state = client.watch(&args.kind, &request, cancel).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        print_report(&state);
    }

    if state.phase() != StreamPhase::Completed {
        std::process::exit(1);
    }
    Ok(())
}
