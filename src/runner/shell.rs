//! Shell-backed tasks
//!
//! Turns a parsed task file into a [`TaskRegistry`] whose bodies and hooks
//! run commands through the configured interpreter.

use crate::config::{self, CommandHook, Config};
use crate::error::{ConfigResult, ExecutionError, ExecutionResult};
use crate::runner::{
    check_command, default_interpreter, execute_command, interpolate, interpolate_list,
    CommandSpec, Context, ProcessOutput, Task, TaskOutput, TaskRegistry,
};
use futures::future::{self, BoxFuture};
use futures::FutureExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Settings shared by every command of one task
#[derive(Debug, Clone)]
struct ShellSettings {
    interpreter: Vec<String>,
    dir: PathBuf,
    quiet: bool,
}

impl ShellSettings {
    /// Build a spec for `exec`, interpolated against `ctx`
    fn spec(&self, exec: String, ctx: &Context) -> CommandSpec {
        CommandSpec::new(exec)
            .with_interpreter(self.interpreter.clone())
            .with_dir(Some(self.dir.clone()))
            .with_env(ctx.env().clone())
            .quiet(self.quiet)
    }

    fn hook_spec(&self, hook: &CommandHook, ctx: &Context) -> ExecutionResult<CommandSpec> {
        let exec = interpolate(&hook.command, ctx)?;
        Ok(self.spec(exec, ctx).quiet(true))
    }
}

/// Build a registry from a task file
///
/// `base_dir` is the directory relative task `dir`s are resolved against,
/// normally the one holding the config file.
pub fn build_registry(config: &Config, base_dir: &Path) -> ConfigResult<TaskRegistry> {
    let interpreter = config
        .interpreter
        .clone()
        .unwrap_or_else(default_interpreter);

    let mut registry = TaskRegistry::new();
    for (id, task) in &config.tasks {
        let settings = ShellSettings {
            interpreter: interpreter.clone(),
            dir: match &task.dir {
                Some(dir) => base_dir.join(dir),
                None => base_dir.to_path_buf(),
            },
            quiet: task.quiet,
        };
        registry.register(build_task(id, task, Arc::new(settings)))?;
    }

    Ok(registry)
}

/// Environment of the first context: the config's `env-file`, then its
/// `env` map, each overriding what came before
pub fn config_env(config: &Config, base_dir: &Path) -> ConfigResult<HashMap<String, String>> {
    let mut env = config::load_env_file(config, base_dir)?;
    env.extend(config.env.iter().map(|(k, v)| (k.clone(), v.clone())));
    Ok(env)
}

fn build_task(id: &str, task: &config::Task, settings: Arc<ShellSettings>) -> Task {
    let mut builder = Task::builder(id).deps(task.deps.iter().cloned());
    if let Some(name) = &task.name {
        builder = builder.name(name);
    }
    if let Some(description) = &task.description {
        builder = builder.description(description);
    }

    if !task.run.is_empty() {
        let commands = task.run.clone();
        let settings = Arc::clone(&settings);
        builder = builder.run(move |ctx, cancel| {
            let specs = interpolate_list(&commands, ctx).map(|commands| {
                commands
                    .into_iter()
                    .map(|exec| settings.spec(exec, ctx))
                    .collect::<Vec<_>>()
            });
            async move {
                let output = run_commands(&specs?, &cancel).await?;
                Ok::<_, ExecutionError>(TaskOutput::Process(output))
            }
        });
    }

    builder = match &task.timeout {
        None => builder,
        Some(config::Hook::Value(secs)) => builder.timeout_secs(*secs),
        Some(config::Hook::Command(hook)) => {
            let hook = hook.clone();
            let settings = Arc::clone(&settings);
            builder.timeout(move |ctx, cancel| {
                let spec = settings.hook_spec(&hook, ctx);
                async move {
                    let output = execute_command(&spec?, &cancel).await?;
                    anyhow::Ok(parse_timeout(&output)?)
                }
            })
        }
    };

    if let Some(force) = &task.force {
        builder = builder.force(bool_hook(force.clone(), Arc::clone(&settings)));
    }
    if let Some(skip) = &task.skip {
        builder = builder.skip(bool_hook(skip.clone(), settings));
    }

    builder.build()
}

/// Force or skip hook from its config form
///
/// A command hook answers `true` when the command exits with status zero.
fn bool_hook(
    hook: config::Hook<bool>,
    settings: Arc<ShellSettings>,
) -> impl Fn(&Context, CancellationToken) -> BoxFuture<'static, anyhow::Result<bool>> + Send + Sync
{
    move |ctx: &Context, cancel: CancellationToken| match &hook {
        config::Hook::Value(value) => future::ready(Ok(*value)).boxed(),
        config::Hook::Command(command) => {
            let spec = settings.hook_spec(command, ctx);
            async move { anyhow::Ok(check_command(&spec?, &cancel).await?) }.boxed()
        }
    }
}

/// Run commands in order, stopping at the first non-zero exit
///
/// The returned output carries the last command run and the output of
/// every command so far.
async fn run_commands(
    specs: &[CommandSpec],
    cancel: &CancellationToken,
) -> ExecutionResult<ProcessOutput> {
    let mut combined = ProcessOutput::default();

    for spec in specs {
        let output = execute_command(spec, cancel).await?;
        combined.stdout.push_str(&output.stdout);
        combined.stderr.push_str(&output.stderr);
        combined.exit_code = output.exit_code;
        combined.command = output.command;

        if !combined.success() {
            break;
        }
    }

    Ok(combined)
}

/// Read a timeout hook's answer from its trimmed stdout
fn parse_timeout(output: &ProcessOutput) -> ExecutionResult<u64> {
    if !output.success() {
        return Err(ExecutionError::InvalidHookOutput(format!(
            "timeout command '{}' exited with code {}",
            output.command, output.exit_code
        )));
    }

    let answer = output.stdout.trim();
    answer.parse().map_err(|_| {
        ExecutionError::InvalidHookOutput(format!(
            "timeout command '{}' printed '{}', expected whole seconds",
            output.command, answer
        ))
    })
}
