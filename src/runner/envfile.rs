//! Environment side-channel
//!
//! A running task can hand environment variables to the tasks after it by
//! writing `KEY=VALUE` lines to the file named by [`ENV_FILE_VAR`]. After
//! each task body the file is read, merged and emptied.

use crate::error::{ExecutionError, ExecutionResult};
use crate::runner::Context;
use std::env;
use std::path::Path;
use std::sync::Mutex;
use tokio::fs;

/// Variable holding the side-channel file path
pub const ENV_FILE_VAR: &str = "TASKED_ENV";

/// Destination for variables published through the side-channel, besides
/// the context itself
pub trait EnvSink: Send + Sync {
    fn set_var(&self, key: &str, value: &str);
}

/// Writes into the environment of the current process
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl EnvSink for ProcessEnv {
    fn set_var(&self, key: &str, value: &str) {
        env::set_var(key, value);
    }
}

/// Keeps the variables in memory instead of touching the process
#[derive(Debug, Default)]
pub struct MemoryEnv {
    vars: Mutex<Vec<(String, String)>>,
}

impl MemoryEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Variables set so far, in order
    pub fn vars(&self) -> Vec<(String, String)> {
        match self.vars.lock() {
            Ok(vars) => vars.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EnvSink for MemoryEnv {
    fn set_var(&self, key: &str, value: &str) {
        let pair = (key.to_string(), value.to_string());
        match self.vars.lock() {
            Ok(mut vars) => vars.push(pair),
            Err(poisoned) => poisoned.into_inner().push(pair),
        }
    }
}

/// Side-channel variables read from one file
#[derive(Debug, Default)]
pub struct EnvFileContents {
    /// Every well-formed pair, in file order
    pub vars: Vec<(String, String)>,

    /// First malformed line, if any
    pub error: Option<ExecutionError>,
}

/// Parse side-channel text, keeping the valid pairs around a bad line
pub fn parse_env_file(contents: &str, path: &Path) -> EnvFileContents {
    let mut parsed = EnvFileContents::default();

    for item in dotenvy::from_read_iter(contents.as_bytes()) {
        match item {
            Ok(pair) => parsed.vars.push(pair),
            Err(e) if parsed.error.is_none() => {
                parsed.error = Some(ExecutionError::Environment(format!(
                    "Failed to parse '{}': {}",
                    path.display(),
                    e
                )));
            }
            Err(_) => {}
        }
    }

    parsed
}

/// Merge the side-channel file named in `ctx` into the context and `sink`,
/// then truncate the file
///
/// The file is emptied before parsing, so a malformed file is reported
/// once. Its valid pairs are still merged. Returns the number of
/// variables merged.
pub async fn apply_env_file(ctx: &mut Context, sink: &dyn EnvSink) -> ExecutionResult<usize> {
    let Some(path) = ctx.env_var(ENV_FILE_VAR).filter(|p| !p.is_empty()) else {
        return Ok(0);
    };
    let path = Path::new(path).to_path_buf();

    if !fs::try_exists(&path).await? {
        return Ok(0);
    }

    let contents = fs::read(&path).await?;
    if contents.is_empty() {
        return Ok(0);
    }
    fs::write(&path, "").await?;

    let contents = String::from_utf8_lossy(&contents);
    if contents.trim().is_empty() {
        return Ok(0);
    }

    let parsed = parse_env_file(&contents, &path);
    let count = parsed.vars.len();
    for (key, value) in parsed.vars {
        sink.set_var(&key, &value);
        ctx.set_env_var(key, value);
    }

    tracing::debug!(path = %path.display(), count, "Merged side-channel environment");
    match parsed.error {
        Some(e) => Err(e),
        None => Ok(count),
    }
}
