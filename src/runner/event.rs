//! Lifecycle events and event handling.
//!
//! The engine publishes an ordered stream of [`Event`]s to an [`EventBus`];
//! presentation (console output, logs, test recorders) lives in the
//! registered [`EventHandler`]s.

use crate::runner::{ExecutionStatus, RunOutcome, TaskResult};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Lifecycle events emitted during a run.
#[derive(Debug, Clone)]
pub enum Event {
    /// A task body is about to run.
    TaskStarted {
        task_id: String,
        name: String,
        timestamp: DateTime<Utc>,
    },

    /// A task ran to completion, successfully or not.
    TaskFinished {
        task_id: String,
        status: ExecutionStatus,
        duration: Duration,
        error: Option<String>,
    },

    /// A task was not run.
    TaskSkipped {
        task_id: String,
        reason: Option<String>,
    },

    /// A task's deadline fired before its body finished.
    TaskTimedOut { task_id: String, timeout: Duration },

    /// A task was cancelled, either at the gate or while running.
    TaskCancelled { task_id: String },

    /// A non-fatal fault outside a task body (hooks, env side-channel).
    UnhandledError {
        task_id: Option<String>,
        message: String,
    },

    /// A requested task or a dependency does not exist.
    TaskNotFound {
        task_id: String,
        required_by: Option<String>,
    },

    /// A dependency cycle, as the path of ids that closes the loop.
    CycleDetected { path: Vec<String> },

    /// The run is over.
    RunSummary {
        results: Vec<TaskResult>,
        outcome: RunOutcome,
    },
}

impl Event {
    /// The task this event is about, if any
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Event::TaskStarted { task_id, .. }
            | Event::TaskFinished { task_id, .. }
            | Event::TaskSkipped { task_id, .. }
            | Event::TaskTimedOut { task_id, .. }
            | Event::TaskCancelled { task_id }
            | Event::TaskNotFound { task_id, .. } => Some(task_id),
            Event::UnhandledError { task_id, .. } => task_id.as_deref(),
            Event::CycleDetected { .. } | Event::RunSummary { .. } => None,
        }
    }

    pub fn task_started(task_id: &str, name: &str) -> Self {
        Event::TaskStarted {
            task_id: task_id.to_string(),
            name: name.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn task_skipped(task_id: &str, reason: Option<&str>) -> Self {
        Event::TaskSkipped {
            task_id: task_id.to_string(),
            reason: reason.map(str::to_string),
        }
    }

    pub fn unhandled(task_id: Option<&str>, message: impl Into<String>) -> Self {
        Event::UnhandledError {
            task_id: task_id.map(str::to_string),
            message: message.into(),
        }
    }
}

/// Handler for receiving lifecycle events.
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    fn handle(&self, event: &Event);
}

/// Event bus for distributing events to registered handlers.
///
/// Handlers are fixed when the bus is built and called in registration
/// order.
#[derive(Default)]
pub struct EventBus {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventBus {
    /// Create a new event bus with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an event handler.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Deliver an event to all registered handlers.
    pub fn publish(&self, event: &Event) {
        for handler in &self.handlers {
            handler.handle(event);
        }
    }

    /// Get the number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Handler that keeps every event it receives
#[derive(Default)]
pub struct EventRecorder {
    events: Mutex<Vec<Event>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events received so far
    pub fn events(&self) -> Vec<Event> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventHandler for EventRecorder {
    fn handle(&self, event: &Event) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}
