//! Turning a step's command template into the command line that is executed.

use itertools::Itertools;

use super::shell::Shell;
use super::types::StepKind;
use crate::{Error, Result};

/// Replaced by the (whitespace-normalized) hook arguments.
pub const ARGS_PLACEHOLDER: &str = "{args}";

/// Builds the final shell command for a step.
///
/// The hook arguments are split on whitespace and rejoined with single
/// spaces, then substituted for the first `{args}` in `template`. A template
/// without `{args}` is used as-is. For a Python step with an activation
/// script the command is wrapped as `activate && cmd && deactivate`.
pub fn build(template: &str, hook_arguments: &str, kind: &StepKind) -> String {
    build_for(Shell::detect(), template, hook_arguments, kind)
}

pub(crate) fn build_for(
    shell: Shell,
    template: &str,
    hook_arguments: &str,
    kind: &StepKind,
) -> String {
    let args = hook_arguments.split_whitespace().join(" ");
    let cmd = template.replacen(ARGS_PLACEHOLDER, &args, 1);
    match kind {
        StepKind::Python {
            venv_activate: Some(activate),
        } => format!("{} && {cmd} && deactivate", shell.source(activate)),
        StepKind::Python {
            venv_activate: None,
        }
        | StepKind::Generic => cmd,
    }
}

/// Rejects templates that would silently misbehave at hook time.
pub fn validate_template(step: &str, template: &str) -> Result<()> {
    let invalid = |reason: String| Error::InvalidCommand {
        step: step.to_string(),
        reason,
    };
    if template.trim().is_empty() {
        return Err(invalid("command is empty".to_string()));
    }
    if template.contains("{{args}}") {
        return Err(invalid(format!(
            "found {{{{args}}}}, the placeholder is {ARGS_PLACEHOLDER}"
        )));
    }
    let placeholders = template.matches(ARGS_PLACEHOLDER).count();
    if placeholders > 1 {
        return Err(invalid(format!(
            "{ARGS_PLACEHOLDER} may appear at most once, found {placeholders}"
        )));
    }
    if template.matches("{args").count() != placeholders {
        return Err(invalid(format!(
            "unterminated placeholder, expected {ARGS_PLACEHOLDER}"
        )));
    }
    Ok(())
}
