//! Main CLI application

use crate::config::{config_dir, parse_config_auto, parse_config_file, validate_config, Config};
use crate::error::TaskedError;
use crate::runner::{
    build_registry, config_env, run_tasks, Context, EventBus, Runner, TaskRegistry, ENV_FILE_VAR,
};
use crate::ui::{print_task_list, ConsoleReporter, Verbosity};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use clap_complete::Shell;
use std::collections::HashMap;
use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Variable holding a `tracing` filter that overrides the verbosity flags
pub const LOG_ENV_VAR: &str = "TASKED_LOG";

/// Per-invocation options taken from the command line
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Tasks to run, in the order given
    pub tasks: Vec<String>,

    /// Global timeout in seconds, overriding the config file
    pub timeout: Option<u64>,

    /// List tasks instead of running them
    pub list: bool,

    pub verbosity: Verbosity,
}

impl RunOptions {
    pub fn from_matches(matches: &ArgMatches) -> Self {
        RunOptions {
            tasks: matches
                .get_many::<String>("tasks")
                .map(|tasks| tasks.cloned().collect())
                .unwrap_or_default(),
            timeout: matches.get_one::<u64>("timeout").copied(),
            list: matches.get_flag("list"),
            verbosity: get_verbosity(matches),
        }
    }
}

/// CLI application
pub struct App {
    /// Parsed configuration
    config: Config,

    /// Config file path
    config_path: PathBuf,
}

impl App {
    /// Create a new app from the discovered configuration file
    pub fn new() -> Result<Self, TaskedError> {
        let (config, config_path) = parse_config_auto()?;
        validate_config(&config)?;

        Ok(App {
            config,
            config_path,
        })
    }

    /// Create app with a specific config file
    pub fn with_config_file(path: PathBuf) -> Result<Self, TaskedError> {
        let config = parse_config_file(&path)?;
        validate_config(&config)?;

        Ok(App {
            config,
            config_path: path,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Directory the config's relative paths are resolved against
    pub fn base_dir(&self) -> &Path {
        config_dir(&self.config_path)
    }

    pub fn registry(&self) -> Result<TaskRegistry, TaskedError> {
        Ok(build_registry(&self.config, self.base_dir())?)
    }

    /// Run the requested tasks and return the process exit code
    pub async fn run(&self, options: &RunOptions, cancel: &CancellationToken) -> Result<i32, TaskedError> {
        let registry = self.registry()?;

        if options.list || options.tasks.is_empty() {
            print_task_list(&registry, &self.config);
            return Ok(0);
        }

        // Keep the side-channel file alive until the run is over
        let (side_channel, _guard) = side_channel_file()?;

        let mut env: HashMap<String, String> = env::vars().collect();
        env.extend(config_env(&self.config, self.base_dir())?);
        env.insert(ENV_FILE_VAR.to_string(), side_channel);

        let events = EventBus::new().with_handler(Arc::new(ConsoleReporter::new(options.verbosity)));
        let initial = Arc::new(Context::new(Arc::new(events)).with_env(env));

        let timeout = options.timeout.unwrap_or(self.config.timeout);
        let runner = Runner::new().with_timeout(Some(Duration::from_secs(timeout)));

        let report = run_tasks(&registry, &options.tasks, initial, &runner, cancel).await?;
        Ok(report.exit_code())
    }
}

/// Build the clap command
pub fn build_command() -> Command {
    Command::new("tasked")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Run project tasks and their dependencies")
        .arg(
            Arg::new("tasks")
                .value_name("TASK")
                .help("Tasks to run; lists tasks when omitted")
                .num_args(0..)
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("Path to tasked.yml config file"),
        )
        .arg(
            Arg::new("timeout")
                .short('t')
                .long("timeout")
                .value_name("SECS")
                .value_parser(value_parser!(u64))
                .help("Default timeout per task in seconds (0 = none)"),
        )
        .arg(
            Arg::new("list")
                .short('l')
                .long("list")
                .help("List available tasks")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Only print command output and errors")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("silent")
                .short('s')
                .long("silent")
                .help("Print no output")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Print verbose output")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("completions")
                .long("completions")
                .value_name("SHELL")
                .value_parser(value_parser!(Shell))
                .help("Print a shell completion script"),
        )
}

/// Get verbosity level from matches
fn get_verbosity(matches: &ArgMatches) -> Verbosity {
    if matches.get_flag("silent") {
        Verbosity::Silent
    } else if matches.get_flag("quiet") {
        Verbosity::Quiet
    } else if matches.get_flag("verbose") {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    }
}

/// Install the stderr log subscriber
///
/// `TASKED_LOG` wins over the verbosity flags when set.
fn init_tracing(verbosity: Verbosity) {
    let level = match verbosity {
        Verbosity::Verbose => "debug",
        Verbosity::Normal => "warn",
        Verbosity::Quiet | Verbosity::Silent => "error",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(format!("tasked={}", level)));

    // Already installed when embedded
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

/// Path of the side-channel file, creating a temporary one unless the
/// caller's environment already names one
fn side_channel_file() -> io::Result<(String, Option<NamedTempFile>)> {
    match env::var(ENV_FILE_VAR) {
        Ok(path) if !path.is_empty() => Ok((path, None)),
        _ => {
            let file = NamedTempFile::new()?;
            let path = file.path().display().to_string();
            Ok((path, Some(file)))
        }
    }
}

/// Run the CLI application and return the exit code
pub fn run() -> Result<i32, TaskedError> {
    let matches = build_command().get_matches();

    if let Some(shell) = matches.get_one::<Shell>("completions").copied() {
        clap_complete::generate(shell, &mut build_command(), "tasked", &mut io::stdout());
        return Ok(0);
    }

    let options = RunOptions::from_matches(&matches);
    init_tracing(options.verbosity);

    let app = match matches.get_one::<PathBuf>("file") {
        Some(path) => App::with_config_file(path.clone())?,
        None => App::new()?,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling run");
                on_interrupt.cancel();
            }
        });

        app.run(&options, &cancel).await
    })
}
