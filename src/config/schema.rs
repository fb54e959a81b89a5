//! Configuration validation
//!
//! This module provides structural checks on a parsed configuration.
//! Dependency graphs are checked later, when a plan is resolved.

use crate::config::types::{Config, Hook, Task};
use crate::error::{ConfigError, ConfigResult};

/// Validate a complete configuration
pub fn validate_config(config: &Config) -> ConfigResult<()> {
    if let Some(interpreter) = &config.interpreter {
        if interpreter.is_empty() || interpreter[0].trim().is_empty() {
            return Err(ConfigError::Invalid(
                "interpreter must name a program".to_string(),
            ));
        }
    }

    for (name, task) in &config.tasks {
        validate_task(name, task)?;
    }

    Ok(())
}

/// Validate a single task
pub fn validate_task(name: &str, task: &Task) -> ConfigResult<()> {
    if name.trim().is_empty() {
        return Err(ConfigError::Invalid("task ids must not be empty".to_string()));
    }

    if task.run.iter().any(|cmd| cmd.trim().is_empty()) {
        return Err(ConfigError::Invalid(format!(
            "task '{}' has an empty command",
            name
        )));
    }

    if task.deps.iter().any(|dep| dep.trim().is_empty()) {
        return Err(ConfigError::Invalid(format!(
            "task '{}' has an empty dependency name",
            name
        )));
    }

    validate_hook(name, "timeout", task.timeout.as_ref())?;
    validate_hook(name, "force", task.force.as_ref())?;
    validate_hook(name, "skip", task.skip.as_ref())?;

    Ok(())
}

fn validate_hook<T>(task: &str, field: &str, hook: Option<&Hook<T>>) -> ConfigResult<()> {
    match hook {
        Some(Hook::Command(cmd)) if cmd.command.trim().is_empty() => Err(ConfigError::Invalid(
            format!("task '{}' has an empty {} command", task, field),
        )),
        _ => Ok(()),
    }
}
