//! Terminal output
//!
//! Event rendering for runs started from the command line, and the task
//! listing shown by `--list`.

pub mod list;
pub mod reporter;

pub use list::*;
pub use reporter::*;

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// Nothing but command output
    Silent = 0,

    /// Failures and the final outcome
    Quiet = 1,

    /// Task progress and the summary
    #[default]
    Normal = 2,

    /// Everything, including hook faults and durations of skipped tasks
    Verbose = 3,
}
