//! Agent module - one department agent's execution.
//!
//! A [`TaskRunner`] drives a single task's reasoning loop against the
//! backend and reports everything it does through a [`TaskEmitter`]. The
//! orchestrator only sees the [`AgentRunner`] trait, so tests can swap in
//! scripted runners.

mod emitter;
mod prompt;
mod runner;

pub use emitter::{EventSender, TaskEmitter};
pub use prompt::{build_system_prompt, build_task_prompt};
pub use runner::{AgentRunner, DependencyContext, DependencyOutput, TaskOutcome, TaskRunner};
