//! Task execution engine
//!
//! This module handles dependency resolution, the per-task lifecycle and
//! sequential run coordination, plus the shell command body used by task
//! files.

pub mod command;
pub mod context;
pub mod coordinator;
pub mod envfile;
pub mod event;
pub mod interpolate;
pub mod lifecycle;
pub mod registry;
pub mod resolve;
pub mod shell;
pub mod task;

// Re-export main types
pub use command::*;
pub use context::*;
pub use coordinator::*;
pub use envfile::*;
pub use event::*;
pub use interpolate::*;
pub use lifecycle::*;
pub use registry::*;
pub use resolve::*;
pub use shell::*;
pub use task::*;

use crate::error::ResolveResult;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Resolve `requested` against `registry` and run the plan
///
/// Resolution failures are published on the initial context's event bus
/// and returned before any task runs.
pub async fn run_tasks<S: AsRef<str>>(
    registry: &TaskRegistry,
    requested: &[S],
    initial: Arc<Context>,
    runner: &Runner,
    cancel: &CancellationToken,
) -> ResolveResult<RunReport> {
    let plan = resolve(requested, registry, initial.events())?;
    Ok(runner.run(&plan, initial, cancel).await)
}
