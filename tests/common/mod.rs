//! Common test utilities

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tasked::runner::{Context, EventBus, EventRecorder};
use tempfile::TempDir;

/// Create a temporary directory with a tasked.yml file
pub fn create_test_config(content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("tasked.yml");
    fs::write(&config_path, content).unwrap();
    (temp_dir, config_path)
}

/// Create a test config with an empty subdirectory next to it
pub fn create_test_config_in_subdir(content: &str) -> (TempDir, PathBuf, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("tasked.yml");
    let sub_dir = temp_dir.path().join("subdir");

    fs::write(&config_path, content).unwrap();
    fs::create_dir(&sub_dir).unwrap();

    (temp_dir, config_path, sub_dir)
}

/// Root context whose events are captured by the returned recorder
pub fn recording_context() -> (Arc<EventRecorder>, Arc<Context>) {
    let recorder = Arc::new(EventRecorder::new());
    let events = Arc::new(EventBus::new().with_handler(recorder.clone()));
    (recorder, Arc::new(Context::new(events)))
}
