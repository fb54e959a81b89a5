//! Task listing

use crate::config::Config;
use crate::runner::TaskRegistry;
use colored::{ColoredString, Colorize};

/// Render the registry in registration order, one task per line
///
/// The config's `name` and `usage`, when set, head the list.
pub fn render_task_list(registry: &TaskRegistry, config: &Config) -> String {
    let mut lines = Vec::new();
    if let Some(name) = &config.name {
        lines.push(name.bold().to_string());
    }
    if let Some(usage) = &config.usage {
        lines.push(usage.clone());
    }
    if !lines.is_empty() {
        lines.push(String::new());
    }

    if registry.is_empty() {
        lines.push("No tasks defined".to_string());
        return lines.join("\n");
    }

    let width = registry.iter().map(|t| t.id.len()).max().unwrap_or(0);
    lines.push("Tasks:".bold().to_string());

    for task in registry.iter() {
        let mut line = format!("  {}", id_column(&task.id, width));
        let about = task
            .description
            .as_deref()
            .or_else(|| (task.name != task.id).then_some(task.name.as_str()));
        if let Some(about) = about {
            line.push_str("  ");
            line.push_str(about);
        }
        if !task.deps.is_empty() {
            line.push_str(&format!("  [deps: {}]", task.deps.join(", ")).dimmed().to_string());
        }
        lines.push(line.trim_end().to_string());
    }

    lines.join("\n")
}

/// Pad before coloring so escape codes never count toward the width
fn id_column(id: &str, width: usize) -> ColoredString {
    format!("{:<width$}", id, width = width).green()
}

/// Print the task list to stdout
pub fn print_task_list(registry: &TaskRegistry, config: &Config) {
    println!("{}", render_task_list(registry, config));
}
