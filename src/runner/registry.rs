//! Task registry
//!
//! Ordered collection of task definitions, looked up by id. Registration
//! order is kept for listing.

use crate::error::{ConfigError, ConfigResult};
use crate::runner::Task;
use indexmap::IndexMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: IndexMap<String, Arc<Task>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task, rejecting duplicate ids
    pub fn register(&mut self, task: Task) -> ConfigResult<()> {
        if self.tasks.contains_key(&task.id) {
            return Err(ConfigError::DuplicateTask(task.id));
        }
        self.tasks.insert(task.id.clone(), Arc::new(task));
        Ok(())
    }

    /// Builder-style variant of [`TaskRegistry::register`]
    pub fn with_task(mut self, task: Task) -> ConfigResult<Self> {
        self.register(task)?;
        Ok(self)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Task>> {
        self.tasks.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    /// Tasks in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Task>> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl FromIterator<Task> for TaskRegistry {
    /// Later duplicates replace earlier ones; use [`TaskRegistry::register`]
    /// to reject them instead.
    fn from_iter<I: IntoIterator<Item = Task>>(iter: I) -> Self {
        let tasks = iter
            .into_iter()
            .map(|task| (task.id.clone(), Arc::new(task)))
            .collect();
        TaskRegistry { tasks }
    }
}
