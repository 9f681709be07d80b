//! Core type definitions for steps and their execution context.
//!
//! - [`Step`] - A named command bound to a package, optionally gated by `only_on`
//! - [`StepKind`] - Whether the command needs a Python virtualenv activated
//! - [`ExecutionContext`] - Everything one executor needs about the hook invocation

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};

use super::command;
use crate::Result;

/// A single shell command bound to a package.
///
/// # Example
///
/// ```
/// use monohook::step::Step;
///
/// let step = Step::new("lint", "golangci-lint run {args}", Some("**/*.go")).unwrap();
/// assert_eq!(step.only_on.as_deref(), Some("**/*.go"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct Step {
    /// Unique within a package
    pub name: String,
    /// Shell command template; `{args}` is replaced with the hook arguments
    pub command: String,
    /// Glob relative to the package directory. The step only runs when a
    /// changed file matches it.
    #[serde(default, alias = "onlyOn", skip_serializing_if = "Option::is_none")]
    pub only_on: Option<String>,
}

impl Step {
    pub fn new(name: &str, command: &str, only_on: Option<&str>) -> Result<Self> {
        let step = Self {
            name: name.to_string(),
            command: command.to_string(),
            only_on: only_on.map(|s| s.to_string()),
        };
        step.validate()?;
        Ok(step)
    }

    /// Checks the command template. Steps built through serde should call
    /// this once after loading.
    pub fn validate(&self) -> Result<()> {
        command::validate_template(&self.name, &self.command)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// What kind of environment a step's command runs in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    #[default]
    Generic,
    /// Runs inside a virtualenv when `venv_activate` points at its
    /// activation script.
    Python {
        #[serde(default, alias = "venvActivate")]
        venv_activate: Option<PathBuf>,
    },
}

/// Per (package, step, hook invocation) inputs of a [`super::StepExecutor`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ExecutionContext {
    pub package_name: String,
    /// Absolute package directory; also the working directory of the command
    pub package_path: PathBuf,
    /// Absolute repository root
    pub root_dir: PathBuf,
    #[serde(default)]
    pub kind: StepKind,
    /// Raw argument string git passed to the hook
    #[serde(default)]
    pub hook_arguments: String,
    /// Files changed by the current git operation, relative to `root_dir`
    #[serde(default)]
    pub staged_files: IndexSet<PathBuf>,
}

impl ExecutionContext {
    pub fn new(
        package_name: impl Into<String>,
        package_path: impl Into<PathBuf>,
        root_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            package_name: package_name.into(),
            package_path: package_path.into(),
            root_dir: root_dir.into(),
            kind: StepKind::Generic,
            hook_arguments: String::new(),
            staged_files: IndexSet::new(),
        }
    }

    pub fn with_kind(mut self, kind: StepKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_hook_arguments(mut self, args: impl Into<String>) -> Self {
        self.hook_arguments = args.into();
        self
    }

    pub fn with_staged_files<I, P>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.staged_files = files.into_iter().map(Into::into).collect();
        self
    }
}
