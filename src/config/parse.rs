//! Configuration file parsing and discovery

use crate::config::types::{Config, Task};
use crate::error::{ConfigError, ConfigResult, TaskedError};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Default configuration file names to search for
const CONFIG_FILE_NAMES: &[&str] = &["tasked.yml", "tasked.yaml"];

/// Find the configuration file by searching current and parent directories
pub fn find_config_file() -> ConfigResult<PathBuf> {
    find_config_file_from(env::current_dir().map_err(|e| {
        ConfigError::Invalid(format!("Failed to get current directory: {}", e))
    })?)
}

/// Find the configuration file starting from a specific directory
pub fn find_config_file_from(start_dir: PathBuf) -> ConfigResult<PathBuf> {
    let mut current_dir = start_dir;
    let mut searched_paths = Vec::new();

    loop {
        for file_name in CONFIG_FILE_NAMES {
            let config_path = current_dir.join(file_name);
            searched_paths.push(config_path.display().to_string());

            if config_path.is_file() {
                return Ok(config_path);
            }
        }

        // Try parent directory
        match current_dir.parent() {
            Some(parent) => current_dir = parent.to_path_buf(),
            None => return Err(ConfigError::NotFound(searched_paths.join(", "))),
        }
    }
}

/// Parse a configuration file from a path
pub fn parse_config_file(path: &Path) -> Result<Config, TaskedError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read file: {}", e)))?;

    parse_config(&contents, Some(path))
}

/// Parse configuration from a string
pub fn parse_config(yaml: &str, config_path: Option<&Path>) -> Result<Config, TaskedError> {
    let mut config: Config = serde_yaml::from_str(yaml)?;

    // Process includes if present
    if let Some(path) = config_path {
        process_includes(&mut config, config_dir(path))?;
    }

    Ok(config)
}

/// Parse configuration with automatic file discovery
pub fn parse_config_auto() -> Result<(Config, PathBuf), TaskedError> {
    let config_path = find_config_file()?;
    let config = parse_config_file(&config_path)?;
    Ok((config, config_path))
}

/// Directory that relative paths in a config file are resolved against
pub fn config_dir(config_path: &Path) -> &Path {
    match config_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

/// Load the config's `env-file`, if any, resolved against `base_dir`
pub fn load_env_file(config: &Config, base_dir: &Path) -> ConfigResult<HashMap<String, String>> {
    let Some(env_file) = &config.env_file else {
        return Ok(HashMap::new());
    };

    let path = base_dir.join(env_file);
    let to_error = |e: dotenvy::Error| ConfigError::EnvFile {
        path: path.clone(),
        error: e.to_string(),
    };

    dotenvy::from_path_iter(&path)
        .map_err(to_error)?
        .map(|item| item.map_err(to_error))
        .collect()
}

/// Replace tasks that point at another file with that file's contents
fn process_includes(config: &mut Config, base_dir: &Path) -> Result<(), TaskedError> {
    for task in config.tasks.values_mut() {
        if let Some(include_path) = &task.include {
            *task = load_included_task(&base_dir.join(include_path))?;
        }
    }

    Ok(())
}

/// Load a task from an included file
fn load_included_task(path: &Path) -> Result<Task, TaskedError> {
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::IncludeFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;

    let task: Task = serde_yaml::from_str(&contents).map_err(|e| ConfigError::IncludeFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;

    if task.include.is_some() {
        return Err(ConfigError::IncludeFile {
            path: path.to_path_buf(),
            error: "included tasks cannot include other files".to_string(),
        }
        .into());
    }

    Ok(task)
}
