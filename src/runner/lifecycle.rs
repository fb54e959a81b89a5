//! Task lifecycle
//!
//! Runs a single task: evaluates its hooks, decides whether it runs at all,
//! races the body against its deadline and the run's cancel token, then
//! classifies the outcome and merges outputs and side-channel variables
//! into a fresh context.

use crate::error::ExecutionError;
use crate::runner::{
    apply_env_file, Context, EnvSink, Event, ExecutionStatus, Hook, Outputs, ProcessEnv, Task,
    TaskOutput, TaskResult, TaskState, RESULT_OUTPUT_KEY,
};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Skip reason given to tasks that follow a failure
pub const PREVIOUS_TASK_FAILED: &str = "previous task failed";

/// Drives tasks through their lifecycle
pub struct Runner {
    global_timeout: Option<Duration>,
    env_sink: Arc<dyn EnvSink>,
}

/// Everything one task hands to the next
pub struct Step {
    pub result: TaskResult,
    pub context: Arc<Context>,
    pub running_failed: bool,

    /// The run must stop here
    pub halt: bool,
}

/// Classified result of invoking a body
struct Outcome {
    status: ExecutionStatus,
    error: Option<ExecutionError>,
    outputs: Outputs,
}

impl Outcome {
    fn ok(outputs: Outputs) -> Self {
        Outcome {
            status: ExecutionStatus::Ok,
            error: None,
            outputs,
        }
    }

    fn error(status: ExecutionStatus, error: ExecutionError) -> Self {
        Outcome {
            status,
            error: Some(error),
            outputs: Outputs::new(),
        }
    }
}

impl Runner {
    pub fn new() -> Self {
        Runner {
            global_timeout: None,
            env_sink: Arc::new(ProcessEnv),
        }
    }

    /// Timeout for tasks that do not resolve their own
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.global_timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    /// Where side-channel variables go besides the context
    pub fn with_env_sink(mut self, sink: Arc<dyn EnvSink>) -> Self {
        self.env_sink = sink;
        self
    }

    pub fn global_timeout(&self) -> Option<Duration> {
        self.global_timeout
    }

    /// Run one task on top of `prior`
    pub async fn execute(
        &self,
        task: &Arc<Task>,
        prior: &Arc<Context>,
        running_failed: bool,
        cancel: &CancellationToken,
    ) -> Step {
        let started_at = Utc::now();
        let mut ctx = prior.derive();

        let timeout = evaluate_hook(task.timeout_hook(), "timeout", task, &ctx, cancel).await;
        let force = evaluate_hook(task.force_hook(), "force", task, &ctx, cancel).await;
        let skip = evaluate_hook(task.skip_hook(), "skip", task, &ctx, cancel).await;

        ctx.insert_task_state(
            task.id.clone(),
            TaskState {
                timeout,
                force,
                skip,
                ..TaskState::default()
            },
        );

        let mut gate = Gate {
            task,
            started_at,
            running_failed,
        };

        if cancel.is_cancelled() && !force {
            tracing::debug!(task = %task.id, "Run cancelled before task start");
            ctx.publish(Event::TaskCancelled {
                task_id: task.id.clone(),
            });
            return gate.conclude(ctx, ExecutionStatus::Cancelled, None, None, true);
        }

        if skip {
            tracing::debug!(task = %task.id, "Task skipped by hook");
            ctx.publish(Event::task_skipped(&task.id, None));
            return gate.conclude(ctx, ExecutionStatus::Skipped, None, None, false);
        }

        if running_failed && !force {
            tracing::debug!(task = %task.id, "Task skipped after earlier failure");
            ctx.publish(Event::task_skipped(&task.id, Some(PREVIOUS_TASK_FAILED)));
            return gate.conclude(
                ctx,
                ExecutionStatus::Skipped,
                None,
                Some(PREVIOUS_TASK_FAILED.to_string()),
                false,
            );
        }

        ctx.publish(Event::task_started(&task.id, &task.name));
        let clock = Instant::now();

        let effective_timeout = if timeout > 0 {
            Some(Duration::from_secs(timeout))
        } else {
            self.global_timeout
        };
        let scope = cancel.child_token();

        let outcome = invoke(task, &ctx, &scope, cancel, effective_timeout).await;

        if let Err(e) = apply_env_file(&mut ctx, self.env_sink.as_ref()).await {
            tracing::warn!(task = %task.id, error = %e, "Failed to apply side-channel environment");
            ctx.publish(Event::unhandled(Some(&task.id), e.to_string()));
        }

        if let Some(state) = ctx.task_state_mut(&task.id) {
            state.outputs.extend(outcome.outputs);
        }

        match outcome.status {
            ExecutionStatus::Timeout => {
                let after = match &outcome.error {
                    Some(ExecutionError::Timeout(after)) => *after,
                    _ => effective_timeout.unwrap_or_default(),
                };
                tracing::debug!(task = %task.id, ?after, "Task timed out");
                ctx.publish(Event::TaskTimedOut {
                    task_id: task.id.clone(),
                    timeout: after,
                });
            }
            ExecutionStatus::Cancelled => {
                tracing::debug!(task = %task.id, "Task cancelled while running");
                ctx.publish(Event::TaskCancelled {
                    task_id: task.id.clone(),
                });
            }
            status => {
                tracing::debug!(task = %task.id, %status, "Task finished");
                ctx.publish(Event::TaskFinished {
                    task_id: task.id.clone(),
                    status,
                    duration: clock.elapsed(),
                    error: outcome.error.as_ref().map(ToString::to_string),
                });
                if status == ExecutionStatus::Failed {
                    gate.running_failed = true;
                }
            }
        }

        gate.conclude(ctx, outcome.status, outcome.error, None, false)
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

/// Bookkeeping shared by every exit path of [`Runner::execute`]
struct Gate<'a> {
    task: &'a Arc<Task>,
    started_at: DateTime<Utc>,
    running_failed: bool,
}

impl Gate<'_> {
    fn conclude(
        &self,
        mut ctx: Context,
        status: ExecutionStatus,
        error: Option<ExecutionError>,
        reason: Option<String>,
        halt: bool,
    ) -> Step {
        if let Some(state) = ctx.task_state_mut(&self.task.id) {
            state.status = Some(status);
        }

        Step {
            result: TaskResult {
                task: Arc::clone(self.task),
                status,
                started_at: self.started_at,
                ended_at: Utc::now(),
                error: error.map(Arc::new),
                reason,
            },
            context: Arc::new(ctx),
            running_failed: self.running_failed,
            halt,
        }
    }
}

/// Evaluate an optional hook, falling back to the default on error
async fn evaluate_hook<T: Default>(
    hook: Option<&Hook<T>>,
    kind: &str,
    task: &Task,
    ctx: &Context,
    cancel: &CancellationToken,
) -> T {
    let Some(hook) = hook else {
        return T::default();
    };

    // A panic while building or polling the hook counts as a hook error
    let answer = match std::panic::catch_unwind(AssertUnwindSafe(|| hook(ctx, cancel.clone()))) {
        Ok(future) => AssertUnwindSafe(future)
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(anyhow::anyhow!("panicked: {}", panic_message(&*panic)))),
        Err(panic) => Err(anyhow::anyhow!("panicked: {}", panic_message(&*panic))),
    };

    match answer {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(task = %task.id, hook = kind, error = %e, "Hook failed, using default");
            ctx.publish(Event::unhandled(
                Some(&task.id),
                format!("{kind} hook failed: {e:#}"),
            ));
            T::default()
        }
    }
}

/// Run the body under `scope`, racing the deadline and the external token
async fn invoke(
    task: &Task,
    ctx: &Context,
    scope: &CancellationToken,
    cancel: &CancellationToken,
    timeout: Option<Duration>,
) -> Outcome {
    if scope.is_cancelled() {
        return Outcome::error(ExecutionStatus::Cancelled, ExecutionError::Cancelled);
    }

    let Some(body) = task.body() else {
        return Outcome::ok(Outputs::new());
    };

    // Bodies do synchronous work before their first await
    let body = match std::panic::catch_unwind(AssertUnwindSafe(|| body(ctx, scope.clone()))) {
        Ok(future) => AssertUnwindSafe(future).catch_unwind(),
        Err(panic) => {
            return classify(Err(ExecutionError::Panicked(panic_message(&*panic))));
        }
    };
    let deadline = async {
        match timeout {
            Some(after) => tokio::time::sleep(after).await,
            None => std::future::pending::<()>().await,
        }
    };

    let result = tokio::select! {
        biased;
        result = body => result.unwrap_or_else(|panic| Err(ExecutionError::Panicked(panic_message(&*panic)))),
        _ = cancel.cancelled() => Err(ExecutionError::Cancelled),
        _ = deadline => {
            scope.cancel();
            Err(ExecutionError::Timeout(timeout.unwrap_or_default()))
        }
    };

    classify(result)
}

fn classify(result: Result<TaskOutput, ExecutionError>) -> Outcome {
    match result {
        Ok(TaskOutput::None) | Ok(TaskOutput::Value(Value::Null)) => Outcome::ok(Outputs::new()),
        Ok(TaskOutput::Process(process)) if !process.success() => Outcome::error(
            ExecutionStatus::Failed,
            ExecutionError::CommandFailed {
                command: process.command,
                code: process.exit_code,
            },
        ),
        Ok(TaskOutput::Process(process)) => Outcome::ok(Outputs::from([
            ("exit_code".to_string(), Value::from(process.exit_code)),
            ("stdout".to_string(), Value::from(process.stdout)),
            ("stderr".to_string(), Value::from(process.stderr)),
            ("command".to_string(), Value::from(process.command)),
        ])),
        Ok(TaskOutput::Map(values)) => Outcome::ok(values),
        Ok(TaskOutput::Value(value)) => {
            Outcome::ok(Outputs::from([(RESULT_OUTPUT_KEY.to_string(), value)]))
        }
        Err(e @ ExecutionError::Timeout(_)) => Outcome::error(ExecutionStatus::Timeout, e),
        Err(e @ ExecutionError::Cancelled) => Outcome::error(ExecutionStatus::Cancelled, e),
        Err(e) => Outcome::error(ExecutionStatus::Failed, e),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
