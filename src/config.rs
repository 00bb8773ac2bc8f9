//! Configuration management for the department runner.
//!
//! Configuration is read from environment variables once at startup:
//! - `OPENROUTER_API_KEY` - Required. Your OpenRouter API key.
//! - `OPENROUTER_BASE_URL` - Optional. Defaults to `https://openrouter.ai/api/v1`.
//! - `DEFAULT_MODEL` - Optional. The default LLM model. Defaults to `anthropic/claude-sonnet-4.5`.
//! - `WORKSPACE_PATH` - Optional. Where file-producing tools write. Defaults to current directory.
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `3000`.
//! - `MAX_ITERATIONS` - Optional. Default step budget per task. Defaults to `12`.
//! - `TASK_TIMEOUT_SECS` - Optional. Default per-task deadline. Defaults to `120`.
//! - `DEPARTMENTS_FILE` - Optional. YAML file replacing the built-in department catalog.
//! - `RESEARCH_COMMAND` - Optional. Shell command backing the `run_research` tool.
//! - `JOB_HISTORY_LIMIT` - Optional. Finished jobs kept for polling. Defaults to `64`.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// OpenRouter API key
    pub api_key: String,

    /// Chat completions endpoint base
    pub api_base_url: String,

    /// Default LLM model identifier (OpenRouter format)
    pub default_model: String,

    /// Workspace directory for generated documents
    pub workspace_path: PathBuf,

    pub host: String,

    pub port: u16,

    /// Step budget for tasks whose definition sets none
    pub max_iterations: usize,

    /// Deadline for tasks whose definition sets none
    pub task_timeout: Duration,

    /// Department catalog override
    pub departments_file: Option<PathBuf>,

    /// External research program for the `run_research` tool
    pub research_command: Option<String>,

    /// Number of finished jobs retained in memory
    pub job_history_limit: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `OPENROUTER_API_KEY` is not set
    /// and `ConfigError::InvalidValue` for unparsable numbers.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_key = var("OPENROUTER_API_KEY")
            .ok_or_else(|| ConfigError::MissingEnvVar("OPENROUTER_API_KEY".to_string()))?;

        let api_base_url = var("OPENROUTER_BASE_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| "https://openrouter.ai/api/v1".to_string());

        let default_model =
            var("DEFAULT_MODEL").unwrap_or_else(|| "anthropic/claude-sonnet-4.5".to_string());

        let workspace_path = var("WORKSPACE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

        let host = var("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = parse_var("PORT", var("PORT"), 3000u16)?;

        let max_iterations = parse_var("MAX_ITERATIONS", var("MAX_ITERATIONS"), 12usize)?;
        if max_iterations == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_ITERATIONS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let task_timeout_secs = parse_var("TASK_TIMEOUT_SECS", var("TASK_TIMEOUT_SECS"), 120u64)?;
        if task_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "TASK_TIMEOUT_SECS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let job_history_limit =
            parse_var("JOB_HISTORY_LIMIT", var("JOB_HISTORY_LIMIT"), 64usize)?;

        Ok(Self {
            api_key,
            api_base_url,
            default_model,
            workspace_path,
            host,
            port,
            max_iterations,
            task_timeout: Duration::from_secs(task_timeout_secs),
            departments_file: var("DEPARTMENTS_FILE").map(PathBuf::from),
            research_command: var("RESEARCH_COMMAND"),
            job_history_limit,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(api_key: String, default_model: String, workspace_path: PathBuf) -> Self {
        Self {
            api_key,
            api_base_url: "https://openrouter.ai/api/v1".to_string(),
            default_model,
            workspace_path,
            host: "127.0.0.1".to_string(),
            port: 3000,
            max_iterations: 12,
            task_timeout: Duration::from_secs(120),
            departments_file: None,
            research_command: None,
            job_history_limit: 64,
        }
    }
}

fn parse_var<T>(name: &str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
    }
}
