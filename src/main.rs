//! Department Runner - HTTP Server Entry Point
//!
//! Starts the HTTP server that runs department jobs.

use department_runner::{api, config::Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "department_runner=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    info!(
        model = %config.default_model,
        workspace = %config.workspace_path.display(),
        "Loaded configuration"
    );

    api::serve(config).await?;

    Ok(())
}
