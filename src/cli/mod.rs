//! CLI interface and argument parsing
//!
//! This module handles command-line parsing, config loading, and shell
//! completion for the `tasked` binary.

pub mod app;

// Re-export main types
pub use app::*;
