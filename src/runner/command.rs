//! Command execution
//!
//! This module runs shell commands for task bodies and hooks. Output is
//! captured and, unless the command is quiet, echoed as it arrives.

use crate::error::{ExecutionError, ExecutionResult};
use crate::runner::ProcessOutput;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Default interpreter for commands
pub fn default_interpreter() -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string()]
}

/// Everything needed to spawn one command
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Command line handed to the interpreter
    pub exec: String,

    /// Interpreter and its leading arguments, e.g. `["sh", "-c"]`
    pub interpreter: Vec<String>,

    /// Working directory
    pub dir: Option<PathBuf>,

    /// Environment for the child, on top of the inherited one
    pub env: HashMap<String, String>,

    /// Capture output without echoing it
    pub quiet: bool,
}

impl CommandSpec {
    pub fn new(exec: impl Into<String>) -> Self {
        CommandSpec {
            exec: exec.into(),
            interpreter: default_interpreter(),
            dir: None,
            env: HashMap::new(),
            quiet: false,
        }
    }

    pub fn with_interpreter(mut self, interpreter: Vec<String>) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn with_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.dir = dir;
        self
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }
}

/// Execute a command, stopping it when `cancel` fires
///
/// A non-zero exit is not an error here: it comes back in the
/// [`ProcessOutput`] for the caller to judge.
pub async fn execute_command(
    spec: &CommandSpec,
    cancel: &CancellationToken,
) -> ExecutionResult<ProcessOutput> {
    let (program, leading) = spec
        .interpreter
        .split_first()
        .ok_or_else(|| ExecutionError::Spawn {
            command: spec.exec.clone(),
            error: "empty interpreter".to_string(),
        })?;

    let mut command = Command::new(program);
    command.args(leading);
    command.arg(&spec.exec);
    if let Some(dir) = &spec.dir {
        command.current_dir(dir);
    }
    command.envs(&spec.env);
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());
    command.kill_on_drop(true);

    tracing::debug!(command = %spec.exec, "Spawning command");

    let mut child = command.spawn().map_err(|e| ExecutionError::Spawn {
        command: spec.exec.clone(),
        error: e.to_string(),
    })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let echo = !spec.quiet;

    let run = async {
        let (stdout, stderr) = tokio::join!(
            collect_stream(stdout, echo, false),
            collect_stream(stderr, echo, true)
        );
        let status = child.wait().await?;
        Ok::<_, std::io::Error>((status, stdout?, stderr?))
    };

    let (status, stdout, stderr) = tokio::select! {
        result = run => result?,
        _ = cancel.cancelled() => {
            tracing::debug!(command = %spec.exec, "Command cancelled");
            return Err(ExecutionError::Cancelled);
        }
    };

    Ok(ProcessOutput {
        // Killed by a signal: no code
        exit_code: status.code().unwrap_or(-1),
        stdout,
        stderr,
        command: spec.exec.clone(),
    })
}

/// Check if a command succeeds (for force/skip hooks)
pub async fn check_command(spec: &CommandSpec, cancel: &CancellationToken) -> ExecutionResult<bool> {
    let output = execute_command(&spec.clone().quiet(true), cancel).await?;
    Ok(output.success())
}

async fn collect_stream<R>(stream: Option<R>, echo: bool, is_stderr: bool) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let Some(stream) = stream else {
        return Ok(String::new());
    };

    let mut reader = BufReader::new(stream);
    let mut collected = Vec::new();
    let mut line = Vec::new();
    let mut stdout = tokio::io::stdout();
    let mut stderr = tokio::io::stderr();

    // Raw lines with their terminator, so the capture matches the output
    // exactly and non-UTF-8 bytes never fail the command
    while reader.read_until(b'\n', &mut line).await? > 0 {
        if echo && is_stderr {
            stderr.write_all(&line).await?;
            stderr.flush().await?;
        } else if echo {
            stdout.write_all(&line).await?;
            stdout.flush().await?;
        }

        collected.append(&mut line);
    }

    Ok(String::from_utf8_lossy(&collected).into_owned())
}
