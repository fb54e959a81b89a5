//! Core configuration types
//!
//! This module defines the data structures that represent a tasked.yml
//! configuration file.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Top-level configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Application name (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Application usage description (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,

    /// Global interpreter to use for commands (e.g., ["sh", "-c"])
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<Vec<String>>,

    /// Global timeout in seconds for tasks without their own (0 = none)
    #[serde(default)]
    pub timeout: u64,

    /// Extra environment variables for every task
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,

    /// Dotenv file loaded into the initial environment
    #[serde(rename = "env-file", default, skip_serializing_if = "Option::is_none")]
    pub env_file: Option<String>,

    /// Tasks defined in the configuration, in file order
    #[serde(default)]
    pub tasks: IndexMap<String, Task>,
}

/// A task definition
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Task {
    /// Display name (defaults to the task id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Longer description for help text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Tasks that must run before this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<String>,

    /// Commands to execute, in order
    #[serde(default, deserialize_with = "deserialize_commands")]
    pub run: Vec<String>,

    /// Working directory, relative to the config file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,

    /// Capture command output without echoing it
    #[serde(default)]
    pub quiet: bool,

    /// Timeout in seconds, fixed or computed by a command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Hook<u64>>,

    /// Run even after a failure or a cancellation request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force: Option<Hook<bool>>,

    /// Do not run this task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<Hook<bool>>,

    /// Include another file as task definition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<String>,
}

/// A dynamic override: either a literal or a command evaluated at run time
///
/// For boolean hooks the command's exit status is the answer; for the
/// timeout hook its trimmed stdout is parsed as seconds.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Hook<T> {
    Value(T),
    Command(CommandHook),
}

/// Command form of a [`Hook`]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CommandHook {
    pub command: String,
}

/// Custom deserializer for commands that handles both a single string and
/// a list
fn deserialize_commands<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    use serde_yaml::Value;

    let value = Value::deserialize(deserializer)?;

    match value {
        // Single string command
        Value::String(s) => Ok(vec![s]),
        // Array of commands
        Value::Sequence(seq) => seq
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                _ => Err(D::Error::custom("run items must be strings")),
            })
            .collect(),
        // Null or not present
        Value::Null => Ok(Vec::new()),
        _ => Err(D::Error::custom("run must be a string or array")),
    }
}
