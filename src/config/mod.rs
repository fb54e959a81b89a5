//! Task file loading
//!
//! This module finds and parses tasked.yml files, resolves `include:` and
//! `env-file` references, and checks the result before tasks are built
//! from it.

pub mod parse;
pub mod schema;
pub mod types;

pub use parse::*;
pub use schema::*;
pub use types::*;
