//! HTTP API.
//!
//! Jobs are submitted per department and answered with a server-sent event
//! stream of the job's events. Finished jobs stay pollable for a while.

mod registry;
mod routes;
mod sse;
pub mod types;

pub use registry::JobRegistry;
pub use routes::{router, serve, AppState};
