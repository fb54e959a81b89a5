//! Task definitions
//!
//! A [`Task`] is an immutable description of a unit of work: its identity,
//! its dependencies, an optional body and three optional hooks that decide
//! the task's timeout, force and skip overrides on every run.

use crate::error::ExecutionResult;
use crate::runner::Context;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Key under which a plain (non-map) body result is stored in the outputs
pub const RESULT_OUTPUT_KEY: &str = "result";

/// The body of a task
pub type TaskBody =
    Arc<dyn Fn(&Context, CancellationToken) -> BoxFuture<'static, ExecutionResult<TaskOutput>> + Send + Sync>;

/// A dynamic override evaluated right before the task runs
pub type Hook<T> =
    Arc<dyn Fn(&Context, CancellationToken) -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>;

/// Result of a command-style task body
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub command: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// What a task body hands back on success
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TaskOutput {
    /// Nothing worth recording
    #[default]
    None,

    /// A finished process; a non-zero exit code fails the task
    Process(ProcessOutput),

    /// Named values merged into the task outputs
    Map(BTreeMap<String, Value>),

    /// A single value, stored under [`RESULT_OUTPUT_KEY`]
    Value(Value),
}

/// Immutable task definition
pub struct Task {
    /// Unique key in the registry
    pub id: String,

    /// Display name
    pub name: String,

    /// Longer description
    pub description: Option<String>,

    /// Ids of tasks that must run first, in declaration order
    pub deps: Vec<String>,

    run: Option<TaskBody>,
    timeout: Option<Hook<u64>>,
    force: Option<Hook<bool>>,
    skip: Option<Hook<bool>>,
}

impl Task {
    /// Start building a task with the given id
    pub fn builder(id: impl Into<String>) -> TaskBuilder {
        TaskBuilder::new(id)
    }

    pub fn body(&self) -> Option<&TaskBody> {
        self.run.as_ref()
    }

    pub fn timeout_hook(&self) -> Option<&Hook<u64>> {
        self.timeout.as_ref()
    }

    pub fn force_hook(&self) -> Option<&Hook<bool>> {
        self.force.as_ref()
    }

    pub fn skip_hook(&self) -> Option<&Hook<bool>> {
        self.skip.as_ref()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("description", &self.description)
            .field("deps", &self.deps)
            .field("run", &self.run.is_some())
            .field("timeout", &self.timeout.is_some())
            .field("force", &self.force.is_some())
            .field("skip", &self.skip.is_some())
            .finish()
    }
}

/// Builder for [`Task`]
///
/// Closures receive the current [`Context`] by reference and must return a
/// `'static` future, so anything needed from the context is cloned out
/// before the `async move` block.
///
/// ```
/// use tasked::runner::{Task, TaskOutput};
///
/// let task = Task::builder("hello")
///     .dep("setup")
///     .run(|ctx, _cancel| {
///         let user = ctx.env_var("USER").unwrap_or("world").to_string();
///         async move { Ok(TaskOutput::Value(format!("hello {user}").into())) }
///     })
///     .build();
/// assert_eq!(task.deps, vec!["setup"]);
/// ```
pub struct TaskBuilder {
    id: String,
    name: Option<String>,
    description: Option<String>,
    deps: Vec<String>,
    run: Option<TaskBody>,
    timeout: Option<Hook<u64>>,
    force: Option<Hook<bool>>,
    skip: Option<Hook<bool>>,
}

impl TaskBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        TaskBuilder {
            id: id.into(),
            name: None,
            description: None,
            deps: Vec::new(),
            run: None,
            timeout: None,
            force: None,
            skip: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn dep(mut self, id: impl Into<String>) -> Self {
        self.deps.push(id.into());
        self
    }

    pub fn deps<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deps.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn run<F, Fut>(mut self, body: F) -> Self
    where
        F: Fn(&Context, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ExecutionResult<TaskOutput>> + Send + 'static,
    {
        self.run = Some(Arc::new(move |ctx: &Context, cancel: CancellationToken| {
            body(ctx, cancel).boxed()
        }));
        self
    }

    pub fn timeout<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(&Context, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<u64>> + Send + 'static,
    {
        self.timeout = Some(boxed_hook(hook));
        self
    }

    /// Fixed timeout in seconds
    pub fn timeout_secs(self, secs: u64) -> Self {
        self.timeout(move |_, _| async move { Ok(secs) })
    }

    pub fn force<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(&Context, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        self.force = Some(boxed_hook(hook));
        self
    }

    /// Run even after an earlier failure or a cancellation request
    pub fn always_force(self) -> Self {
        self.force(|_, _| async { Ok(true) })
    }

    pub fn skip<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(&Context, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        self.skip = Some(boxed_hook(hook));
        self
    }

    pub fn build(self) -> Task {
        Task {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            id: self.id,
            description: self.description,
            deps: self.deps,
            run: self.run,
            timeout: self.timeout,
            force: self.force,
            skip: self.skip,
        }
    }
}

fn boxed_hook<T, F, Fut>(hook: F) -> Hook<T>
where
    T: Send + 'static,
    F: Fn(&Context, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    Arc::new(move |ctx: &Context, cancel: CancellationToken| hook(ctx, cancel).boxed())
}
