//! Run coordination
//!
//! Drives a resolved plan through [`Runner::execute`] one task at a time and
//! turns the collected results into a single outcome.

use crate::error::ExecutionError;
use crate::runner::{Context, Event, ExecutionStatus, Runner, Task};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Record of one task's run
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub task: Arc<Task>,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub error: Option<Arc<ExecutionError>>,

    /// Why a skipped task was skipped, when the engine decided it
    pub reason: Option<String>,
}

impl TaskResult {
    pub fn duration(&self) -> Duration {
        (self.ended_at - self.started_at).to_std().unwrap_or_default()
    }
}

/// Overall classification of a run
///
/// Checked in declaration order: a single failure outweighs any number of
/// cancellations, timeouts or skips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Failed,
    Cancelled,
    Timeout,
    Skipped,
    Success,
}

impl RunOutcome {
    pub fn from_statuses<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = ExecutionStatus>,
    {
        let statuses: Vec<ExecutionStatus> = statuses.into_iter().collect();
        let any = |status| statuses.contains(&status);

        if any(ExecutionStatus::Failed) {
            RunOutcome::Failed
        } else if any(ExecutionStatus::Cancelled) {
            RunOutcome::Cancelled
        } else if any(ExecutionStatus::Timeout) {
            RunOutcome::Timeout
        } else if any(ExecutionStatus::Skipped) {
            RunOutcome::Skipped
        } else {
            RunOutcome::Success
        }
    }

    pub fn from_results(results: &[TaskResult]) -> Self {
        Self::from_statuses(results.iter().map(|r| r.status))
    }

    /// Process exit code for this outcome
    pub fn exit_code(self) -> i32 {
        match self {
            RunOutcome::Success => 0,
            RunOutcome::Failed => 1,
            RunOutcome::Cancelled => 2,
            RunOutcome::Timeout => 3,
            RunOutcome::Skipped => 4,
        }
    }
}

/// Everything a finished run leaves behind
#[derive(Debug)]
pub struct RunReport {
    /// One entry per visited task, in execution order
    pub results: Vec<TaskResult>,

    /// Context after the last visited task
    pub context: Arc<Context>,

    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn exit_code(&self) -> i32 {
        self.outcome.exit_code()
    }

    pub fn result(&self, task_id: &str) -> Option<&TaskResult> {
        self.results.iter().find(|r| r.task.id == task_id)
    }
}

impl Runner {
    /// Run a resolved plan in order
    ///
    /// Stops early only when the cancel token is already set as a task is
    /// about to start; those remaining tasks get no result at all.
    pub async fn run(
        &self,
        plan: &[Arc<Task>],
        initial: Arc<Context>,
        cancel: &CancellationToken,
    ) -> RunReport {
        tracing::info!(tasks = plan.len(), "Starting run");

        let mut context = initial;
        let mut running_failed = false;
        let mut results = Vec::with_capacity(plan.len());

        for task in plan {
            let step = self.execute(task, &context, running_failed, cancel).await;
            context = step.context;
            running_failed = step.running_failed;
            results.push(step.result);

            if step.halt {
                tracing::info!(task = %task.id, "Run cancelled");
                break;
            }
        }

        let outcome = RunOutcome::from_results(&results);
        tracing::info!(?outcome, visited = results.len(), "Run finished");

        context.publish(Event::RunSummary {
            results: results.clone(),
            outcome,
        });

        RunReport {
            results,
            context,
            outcome,
        }
    }
}
