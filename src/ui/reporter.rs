//! Console rendering of lifecycle events
//!
//! [`render_event`] and [`render_summary`] are pure and return the text to
//! print; [`ConsoleReporter`] writes it to stderr so that command output
//! keeps stdout to itself. Resolution failures are only echoed when
//! verbose, since the caller reports them as errors anyway.

use crate::runner::{Event, EventHandler, ExecutionStatus, RunOutcome, TaskResult};
use crate::ui::Verbosity;
use colored::Colorize;
use std::io::Write;
use std::time::Duration;

/// Width of the task column in the summary
const NAME_WIDTH: usize = 24;

/// Event handler printing progress to stderr
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleReporter {
    verbosity: Verbosity,
}

impl ConsoleReporter {
    pub fn new(verbosity: Verbosity) -> Self {
        ConsoleReporter { verbosity }
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }
}

impl EventHandler for ConsoleReporter {
    fn handle(&self, event: &Event) {
        if let Some(text) = render_event(event, self.verbosity) {
            let mut stderr = std::io::stderr().lock();
            // A closed stderr is not worth failing a run over
            let _ = writeln!(stderr, "{}", text);
        }
    }
}

/// Render one event at the given verbosity, or `None` to print nothing
pub fn render_event(event: &Event, verbosity: Verbosity) -> Option<String> {
    if verbosity == Verbosity::Silent {
        return None;
    }
    let normal = verbosity >= Verbosity::Normal;
    let verbose = verbosity >= Verbosity::Verbose;

    let text = match event {
        Event::TaskStarted { name, .. } if normal => {
            format!("{} {}", "==>".blue().bold(), name.bold())
        }
        Event::TaskFinished {
            task_id,
            status: ExecutionStatus::Failed,
            duration,
            error,
        } => format!(
            "{} {} failed after {}{}",
            "✗".red().bold(),
            task_id.bold(),
            format_duration(*duration),
            error
                .as_ref()
                .map(|e| format!(": {}", e))
                .unwrap_or_default()
        ),
        Event::TaskFinished {
            task_id, duration, ..
        } if normal => format!(
            "{} {} ({})",
            "✓".green().bold(),
            task_id,
            format_duration(*duration)
        ),
        Event::TaskSkipped { task_id, reason } if normal => match reason {
            Some(reason) => format!("{} {} skipped: {}", "-".yellow(), task_id, reason),
            None => format!("{} {} skipped", "-".yellow(), task_id),
        },
        Event::TaskTimedOut { task_id, timeout } => format!(
            "{} {} timed out after {}",
            "⏱".yellow().bold(),
            task_id.bold(),
            format_duration(*timeout)
        ),
        Event::TaskCancelled { task_id } => {
            format!("{} {} cancelled", "✗".yellow().bold(), task_id.bold())
        }
        Event::UnhandledError { task_id, message } if verbose => match task_id {
            Some(task_id) => format!("{} {}: {}", "warning:".yellow(), task_id, message),
            None => format!("{} {}", "warning:".yellow(), message),
        },
        Event::TaskNotFound {
            task_id,
            required_by: Some(parent),
        } if verbose => format!(
            "{} task '{}' required by '{}' is not defined",
            "error:".red().bold(),
            task_id,
            parent
        ),
        Event::TaskNotFound {
            task_id,
            required_by: None,
        } if verbose => format!("{} task '{}' is not defined", "error:".red().bold(), task_id),
        Event::CycleDetected { path } if verbose => format!(
            "{} circular dependency: {}",
            "error:".red().bold(),
            path.join(" -> ")
        ),
        Event::RunSummary { results, outcome } if normal => render_summary(results, *outcome),
        Event::RunSummary { outcome, .. } if *outcome != RunOutcome::Success => {
            format!("{} {}", "run".bold(), outcome_label(*outcome))
        }
        _ => return None,
    };

    Some(text)
}

/// Render the end-of-run table: one row per visited task plus the outcome
pub fn render_summary(results: &[TaskResult], outcome: RunOutcome) -> String {
    let mut lines = vec![String::new(), "Summary".bold().to_string()];

    for result in results {
        let dots = ".".repeat(NAME_WIDTH.saturating_sub(result.task.id.len()).max(2));
        lines.push(format!(
            "  {}{}: {} ({})",
            result.task.id,
            dots.dimmed(),
            status_label(result.status),
            format_duration(result.duration())
        ));
    }

    lines.push(format!("  {}", outcome_label(outcome)));
    lines.join("\n")
}

fn status_label(status: ExecutionStatus) -> String {
    let label = status.to_string();
    match status {
        ExecutionStatus::Ok => label.green().to_string(),
        ExecutionStatus::Failed => label.red().to_string(),
        ExecutionStatus::Skipped => label.dimmed().to_string(),
        ExecutionStatus::Cancelled | ExecutionStatus::Timeout => label.yellow().to_string(),
    }
}

fn outcome_label(outcome: RunOutcome) -> String {
    match outcome {
        RunOutcome::Success => "succeeded".green().bold().to_string(),
        RunOutcome::Failed => "failed".red().bold().to_string(),
        RunOutcome::Cancelled => "cancelled".yellow().bold().to_string(),
        RunOutcome::Timeout => "timed out".yellow().bold().to_string(),
        RunOutcome::Skipped => "finished with skipped tasks".yellow().to_string(),
    }
}

/// Short human duration: `850ms`, `4.2s`, `3m05s`
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        format!("{:.1}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m{:02}s", secs / 60, secs % 60)
    }
}
