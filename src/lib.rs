//! Git hook step orchestration for multi-package repositories.
//!
//! Each configured step is a shell command attached to a package. When a hook
//! fires, a [`step::StepExecutor`] per (package, step) decides whether the
//! changed files concern it, runs it in the package directory and reports its
//! lifecycle on a [`status::StatusBus`]. [`hook::HookRunner`] runs a batch of
//! executors and turns their outcomes into the hook's exit code.

#[macro_use]
extern crate log;

pub use error::{Error, Result};

pub mod env;
mod error;
pub mod glob;
pub mod hook;
pub mod logger;
pub mod reporter;
pub mod status;
pub mod step;
