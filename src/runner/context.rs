//! Execution context for task running
//!
//! Every task in a run gets its own [`Context`], derived from the one the
//! previous task left behind. A derived context starts as a copy of its
//! parent's environment and task states and keeps a link to the parent, so
//! later tasks see what earlier ones changed while earlier snapshots stay
//! untouched.

use crate::runner::{Event, EventBus};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fmt;
use std::sync::Arc;

/// Outputs recorded by a task body
pub type Outputs = BTreeMap<String, Value>;

/// Terminal status of a task within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionStatus {
    Ok,
    Failed,
    Skipped,
    Cancelled,
    Timeout,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExecutionStatus::Ok => "ok",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Skipped => "skipped",
            ExecutionStatus::Cancelled => "cancelled",
            ExecutionStatus::Timeout => "timeout",
        };
        f.write_str(label)
    }
}

/// Per-task, per-run state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskState {
    /// Resolved timeout in seconds (0 = use the run's global timeout)
    pub timeout: u64,

    /// Resolved force override
    pub force: bool,

    /// Resolved skip override
    pub skip: bool,

    /// Final status, `None` while the task is still in flight
    pub status: Option<ExecutionStatus>,

    /// Values produced by the task body
    pub outputs: Outputs,
}

/// Execution context threaded through a run
#[derive(Clone)]
pub struct Context {
    parent: Option<Arc<Context>>,

    /// Environment variables visible to tasks
    env: HashMap<String, String>,

    /// State of every task that has been visited so far
    tasks: HashMap<String, TaskState>,

    events: Arc<EventBus>,
}

impl Context {
    /// Create a root context with an empty environment
    pub fn new(events: Arc<EventBus>) -> Self {
        Context {
            parent: None,
            env: HashMap::new(),
            tasks: HashMap::new(),
            events,
        }
    }

    /// Create a root context seeded with the current process environment
    pub fn from_process_env(events: Arc<EventBus>) -> Self {
        Context::new(events).with_env(env::vars().collect())
    }

    /// Replace the environment
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Set a single environment variable
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Derive the next step's context from this one
    pub fn derive(self: &Arc<Self>) -> Context {
        Context {
            parent: Some(Arc::clone(self)),
            env: self.env.clone(),
            tasks: self.tasks.clone(),
            events: Arc::clone(&self.events),
        }
    }

    /// The context this one was derived from
    pub fn parent(&self) -> Option<&Arc<Context>> {
        self.parent.as_ref()
    }

    /// Walk the chain of earlier contexts, nearest first
    pub fn ancestors(&self) -> impl Iterator<Item = &Context> {
        std::iter::successors(self.parent.as_deref(), |ctx| ctx.parent.as_deref())
    }

    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }

    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    pub fn set_env_var(&mut self, key: String, value: String) {
        self.env.insert(key, value);
    }

    pub fn task_state(&self, id: &str) -> Option<&TaskState> {
        self.tasks.get(id)
    }

    pub fn task_state_mut(&mut self, id: &str) -> Option<&mut TaskState> {
        self.tasks.get_mut(id)
    }

    pub fn insert_task_state(&mut self, id: String, state: TaskState) {
        self.tasks.insert(id, state);
    }

    /// Outputs of a task visited earlier in the run
    pub fn outputs(&self, id: &str) -> Option<&Outputs> {
        self.tasks.get(id).map(|state| &state.outputs)
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn publish(&self, event: Event) {
        self.events.publish(&event);
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new(Arc::new(EventBus::new()))
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("depth", &self.ancestors().count())
            .field("env", &self.env.len())
            .field("tasks", &self.tasks)
            .finish()
    }
}
