//! Step configuration and execution.
//!
//! A step is a shell command attached to a package. When a git hook fires,
//! one [`StepExecutor`] is created per (package, step) pair; it decides
//! whether the step applies to the changed files, runs it, and reports its
//! status on a [`crate::status::StatusBus`].
//!
//! # Module Organization
//!
//! - [`types`] - Step, StepKind and ExecutionContext
//! - [`command`] - Building the final command line from a template
//! - [`shell`] - Shell selection and quoting
//! - [`output`] - Bounded capture of subprocess output
//! - [`executor`] - The per-step state machine

pub mod command;
mod executor;
mod output;
mod shell;
mod types;

pub use command::{ARGS_PLACEHOLDER, build as build_command};
pub use executor::{Outcome, StepExecutor, StepFailure};
pub use output::CapturedOutput;
pub use shell::Shell;
pub use types::{ExecutionContext, Step, StepKind};
