//! Tasked - a dependency-aware task runner
//!
//! Tasks declare dependencies on other tasks. A run resolves the requested
//! tasks into an ordered plan, then executes it one task at a time with
//! per-task hooks, timeouts, cooperative cancellation and an environment
//! side-channel between tasks. Tasks come from a YAML file (`tasked.yml`)
//! or are built in code with [`runner::Task::builder`].

// Public modules
pub mod cli;
pub mod config;
pub mod error;
pub mod runner;
pub mod ui;

// Re-export commonly used types
pub use error::{Result, TaskedError};
pub use runner::{run_tasks, Context, RunOutcome, RunReport, Runner, Task, TaskRegistry};

/// Current version of tasked
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
