//! # Department Runner
//!
//! Runs a "virtual department" of cooperating LLM agents as one job and
//! streams what they do as server-sent events.
//!
//! This library provides:
//! - A department catalog that turns a request into a job of agent tasks
//! - An orchestrator that runs the tasks concurrently, each under its own
//!   deadline, and merges their events into one ordered stream
//! - An HTTP API that serves that stream and keeps pollable job snapshots
//! - A client that folds the stream back into a live execution state
//!
//! ## Example
//!
//! ```rust,ignore
//! use department_runner::client::JobClient;
//! use department_runner::job::JobRequest;
//!
//! let client = JobClient::new("http://127.0.0.1:3000")?;
//! let request = JobRequest::default()
//!     .with_input("companyName", "Acme")
//!     .with_input("industry", "logistics");
//! let state = client.watch("research", &request, CancellationToken::new()).await?;
//! println!("{:?}", state.summary());
//! ```

pub mod agent;
pub mod api;
pub mod client;
pub mod config;
pub mod department;
pub mod events;
pub mod job;
pub mod llm;
pub mod tools;

pub use config::Config;
