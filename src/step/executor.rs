//! Running one step for one package in one hook invocation.
//!
//! A [`StepExecutor`] decides at construction whether the step is skipped,
//! then on [`StepExecutor::run`] publishes `Running`, launches the command
//! (unless skipped) and publishes exactly one terminal status. Dropping the
//! first `run` future kills the child; the step then resolves to a failure
//! and is never launched again.
//!
//! ```text
//! Created ──run()──> Running ──> Skipped | Success | Failure
//! ```

use indexmap::IndexSet;
use itertools::Itertools;
use std::{
    fmt,
    process::{ExitStatus, Stdio},
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};
use tokio::{process::Command, sync::OnceCell};

use super::command;
use super::output::{CapturedOutput, drain};
use super::shell::Shell;
use super::types::{ExecutionContext, Step};
use crate::glob::PackageGlob;
use crate::status::{ExecutionStatus, StatusBus, StatusEvent};
use crate::{Error, Result, env};

/// A step whose command did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{package} › {step} failed")]
pub struct StepFailure {
    pub package: String,
    pub step: String,
    /// Captured stderr followed by `stdout:` and the captured stdout
    pub message: String,
}

/// Resolved result of [`StepExecutor::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Skipped,
    Success,
    Failure(StepFailure),
}

/// The subprocess never produced an exit status.
#[derive(Debug, thiserror::Error)]
enum ProcessError {
    #[error("failed to launch `{cmd}`: {source}")]
    Launch {
        cmd: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed waiting for `{cmd}`: {source}")]
    Wait {
        cmd: String,
        #[source]
        source: std::io::Error,
    },
}

impl Outcome {
    pub fn status(&self) -> ExecutionStatus {
        match self {
            Outcome::Skipped => ExecutionStatus::Skipped,
            Outcome::Success => ExecutionStatus::Success,
            Outcome::Failure(_) => ExecutionStatus::Failure,
        }
    }

    /// The error half of the outcome; `None` when skipped or successful.
    pub fn failure(&self) -> Option<&StepFailure> {
        match self {
            Outcome::Failure(f) => Some(f),
            Outcome::Skipped | Outcome::Success => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.failure().is_some()
    }
}

pub struct StepExecutor {
    step: Step,
    ctx: ExecutionContext,
    bus: StatusBus,
    shell: Shell,
    skipped: bool,
    output_limit: usize,
    started: AtomicBool,
    launches: AtomicUsize,
    outcome: OnceCell<Outcome>,
}

impl StepExecutor {
    /// Fails with [`Error::InvalidPattern`] when `only_on` is not a valid glob.
    /// Steps named in `MONOHOOK_SKIP_STEPS` are always skipped.
    pub fn new(step: Step, ctx: ExecutionContext, bus: StatusBus) -> Result<Self> {
        Self::with_skip_steps(step, ctx, bus, &env::MONOHOOK_SKIP_STEPS)
    }

    pub fn with_skip_steps(
        step: Step,
        ctx: ExecutionContext,
        bus: StatusBus,
        skip_steps: &IndexSet<String>,
    ) -> Result<Self> {
        let skipped = compute_skipped(&step, &ctx, skip_steps)?;
        Ok(Self {
            step,
            ctx,
            bus,
            shell: Shell::detect(),
            skipped,
            output_limit: *env::MONOHOOK_OUTPUT_LIMIT,
            started: AtomicBool::new(false),
            launches: AtomicUsize::new(0),
            outcome: OnceCell::new(),
        })
    }

    pub fn output_limit(mut self, limit: usize) -> Self {
        self.output_limit = limit;
        self
    }

    pub fn step(&self) -> &Step {
        &self.step
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped
    }

    /// Number of subprocesses launched so far; never more than one.
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// The command line that `run` executes.
    pub fn command(&self) -> String {
        command::build_for(
            self.shell,
            &self.step.command,
            &self.ctx.hook_arguments,
            &self.ctx.kind,
        )
    }

    /// Runs the step once. Later (or concurrent) calls wait for and return
    /// the same outcome without launching anything or publishing events.
    ///
    /// If the first call is dropped before it resolves, the next call records
    /// a cancellation failure instead of launching a second time.
    pub async fn run(&self) -> Outcome {
        self.outcome
            .get_or_init(|| async {
                if self.started.swap(true, Ordering::SeqCst) {
                    self.cancelled()
                } else {
                    self.execute().await
                }
            })
            .await
            .clone()
    }

    /// Closes a lifecycle whose `Running` was published by a dropped `run`.
    fn cancelled(&self) -> Outcome {
        warn!("{self}: run was cancelled before the step finished");
        let stderr = "\nrun was cancelled before the step finished".to_string();
        let outcome = self.failure(stderr, &CapturedOutput::default());
        self.publish(outcome.status());
        outcome
    }

    async fn execute(&self) -> Outcome {
        self.publish(ExecutionStatus::Running);
        if self.skipped {
            debug!("{self}: skipped");
            self.publish(ExecutionStatus::Skipped);
            return Outcome::Skipped;
        }
        let cmd = self.command();
        debug!("{self}: $ {cmd}");
        let outcome = match self.spawn(&cmd).await {
            Ok((status, _, _)) if status.success() => Outcome::Success,
            Ok((status, stdout, stderr)) => {
                debug!("{self}: {}", render_exit_status(&status));
                let mut stderr = stderr.render();
                if status.code().is_none() {
                    stderr.push_str(&format!("\n{}", render_exit_status(&status)));
                }
                self.failure(stderr, &stdout)
            }
            Err(err) => {
                debug!("{self}: {err}");
                self.failure(format!("\n{err}"), &CapturedOutput::default())
            }
        };
        self.publish(outcome.status());
        outcome
    }

    async fn spawn(
        &self,
        cmd: &str,
    ) -> std::result::Result<(ExitStatus, CapturedOutput, CapturedOutput), ProcessError> {
        let (program, args) = self.shell.argv();
        self.launches.fetch_add(1, Ordering::SeqCst);
        let mut child = Command::new(program)
            .args(args)
            .arg(cmd)
            .current_dir(&self.ctx.package_path)
            .env("MONOHOOK_PACKAGE", &self.ctx.package_name)
            .env("MONOHOOK_STEP", &self.step.name)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Launch {
                cmd: cmd.to_string(),
                source,
            })?;
        trace!("{self}: started process {:?}", child.id());
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (status, stdout, stderr) = tokio::join!(
            child.wait(),
            drain(stdout, self.output_limit),
            drain(stderr, self.output_limit),
        );
        let status = status.map_err(|source| ProcessError::Wait {
            cmd: cmd.to_string(),
            source,
        })?;
        Ok((status, stdout, stderr))
    }

    fn failure(&self, stderr: String, stdout: &CapturedOutput) -> Outcome {
        Outcome::Failure(StepFailure {
            package: self.ctx.package_name.clone(),
            step: self.step.name.clone(),
            message: format!("{stderr}\nstdout:{}", stdout.render()),
        })
    }

    fn publish(&self, status: ExecutionStatus) {
        self.bus.publish(&StatusEvent {
            package_name: self.ctx.package_name.clone(),
            step_name: self.step.name.clone(),
            status,
        });
    }
}

impl fmt::Display for StepExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} › {}", self.ctx.package_name, self.step.name)
    }
}

impl fmt::Debug for StepExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepExecutor")
            .field("step", &self.step)
            .field("package", &self.ctx.package_name)
            .field("skipped", &self.skipped)
            .finish_non_exhaustive()
    }
}

fn compute_skipped(
    step: &Step,
    ctx: &ExecutionContext,
    skip_steps: &IndexSet<String>,
) -> Result<bool> {
    if skip_steps.contains(&step.name) {
        debug!("{} › {step}: disabled via MONOHOOK_SKIP_STEPS", ctx.package_name);
        return Ok(true);
    }
    let Some(pattern) = &step.only_on else {
        return Ok(false);
    };
    let glob = PackageGlob::new(pattern, &ctx.package_path, &ctx.root_dir).map_err(|source| {
        Error::InvalidPattern {
            step: step.name.clone(),
            pattern: pattern.clone(),
            source,
        }
    })?;
    let files = ctx.staged_files.iter().collect_vec();
    let matches = glob.matches(&files);
    debug!(
        "{} › {step}: {} of {} changed file(s) match {pattern}",
        ctx.package_name,
        matches.len(),
        files.len()
    );
    Ok(matches.is_empty())
}

fn render_exit_status(status: &ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exited with code {code}"),
        None => "terminated without an exit status".into(),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::status::Subscription;
    use crate::step::StepKind;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn record(bus: &StatusBus) -> (Arc<Mutex<Vec<StatusEvent>>>, Subscription) {
        let events = Arc::new(Mutex::new(vec![]));
        let sub = bus.subscribe({
            let events = events.clone();
            move |e| {
                events.lock().unwrap().push(e.clone());
                Ok(())
            }
        });
        (events, sub)
    }

    fn statuses(events: &Mutex<Vec<StatusEvent>>) -> Vec<ExecutionStatus> {
        events.lock().unwrap().iter().map(|e| e.status).collect()
    }

    fn ctx(root: &Path) -> ExecutionContext {
        ExecutionContext::new("api", root.join("api"), root)
    }

    fn repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("api")).unwrap();
        dir
    }

    fn executor(step: Step, ctx: ExecutionContext, bus: &StatusBus) -> StepExecutor {
        StepExecutor::with_skip_steps(step, ctx, bus.clone(), &IndexSet::new()).unwrap()
    }

    #[test]
    fn no_only_on_is_never_skipped() {
        let dir = repo();
        let bus = StatusBus::new();
        let step = Step::new("test", "true", None).unwrap();
        for files in [vec![], vec!["web/app.ts"], vec!["api/main.go"]] {
            let ctx = ctx(dir.path()).with_staged_files(files);
            assert!(!executor(step.clone(), ctx, &bus).is_skipped());
        }
    }

    #[tokio::test]
    async fn unmatched_only_on_skips_without_launching() {
        let dir = repo();
        let bus = StatusBus::new();
        let (events, _sub) = record(&bus);
        let step = Step::new("lint", "touch launched", Some("*.go")).unwrap();
        let ctx = ctx(dir.path()).with_staged_files(["web/main.go", "api/README.md"]);
        let exec = executor(step, ctx, &bus);
        assert!(exec.is_skipped());

        assert_eq!(exec.run().await, Outcome::Skipped);
        assert_eq!(exec.launches(), 0);
        assert!(!dir.path().join("api/launched").exists());
        assert_eq!(
            statuses(&events),
            vec![ExecutionStatus::Running, ExecutionStatus::Skipped]
        );
    }

    #[tokio::test]
    async fn matched_only_on_runs() {
        let dir = repo();
        let bus = StatusBus::new();
        let step = Step::new("lint", "true", Some("*.go")).unwrap();
        let ctx = ctx(dir.path()).with_staged_files(["api/main.go"]);
        let exec = executor(step, ctx, &bus);
        assert!(!exec.is_skipped());
        assert_eq!(exec.run().await, Outcome::Success);
        assert_eq!(exec.launches(), 1);
    }

    #[test]
    fn skip_list_forces_skip() {
        let dir = repo();
        let step = Step::new("slow", "true", None).unwrap();
        let skip = IndexSet::from(["slow".to_string()]);
        let exec =
            StepExecutor::with_skip_steps(step, ctx(dir.path()), StatusBus::new(), &skip).unwrap();
        assert!(exec.is_skipped());
    }

    #[test]
    fn invalid_only_on_is_a_construction_error() {
        let dir = repo();
        let step = Step::new("lint", "true", Some("src/[abc")).unwrap();
        let err =
            StepExecutor::with_skip_steps(step, ctx(dir.path()), StatusBus::new(), &IndexSet::new())
                .unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { .. }));
        assert!(err.to_string().starts_with("Invalid onlyOn pattern"));
    }

    #[tokio::test]
    async fn success_emits_running_then_success() {
        let dir = repo();
        let bus = StatusBus::new();
        let (events, _sub) = record(&bus);
        let exec = executor(Step::new("ok", "exit 0", None).unwrap(), ctx(dir.path()), &bus);
        let outcome = exec.run().await;
        assert_eq!(outcome, Outcome::Success);
        assert!(outcome.failure().is_none());
        assert_eq!(
            statuses(&events),
            vec![ExecutionStatus::Running, ExecutionStatus::Success]
        );
        let events = events.lock().unwrap();
        assert_eq!(events[0].package_name, "api");
        assert_eq!(events[0].step_name, "ok");
    }

    #[tokio::test]
    async fn failure_surfaces_stderr_then_stdout() {
        let dir = repo();
        let bus = StatusBus::new();
        let (events, _sub) = record(&bus);
        let step = Step::new("bad", "echo context; echo boom >&2; exit 1", None).unwrap();
        let exec = executor(step, ctx(dir.path()), &bus);
        let outcome = exec.run().await;
        let failure = outcome.failure().expect("step should fail");
        assert_eq!(failure.step, "bad");
        assert_eq!(failure.package, "api");
        assert!(failure.message.contains("boom"));
        assert_eq!(failure.message, "\nboom\nstdout:\ncontext");
        assert_eq!(
            statuses(&events),
            vec![ExecutionStatus::Running, ExecutionStatus::Failure]
        );
    }

    #[tokio::test]
    async fn unknown_command_is_a_failure() {
        let dir = repo();
        let bus = StatusBus::new();
        let step = Step::new("missing", "monohook-no-such-binary-xyz", None).unwrap();
        let outcome = executor(step, ctx(dir.path()), &bus).run().await;
        assert!(outcome.is_failure());
    }

    #[tokio::test]
    async fn launch_fault_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let bus = StatusBus::new();
        let (events, _sub) = record(&bus);
        // package directory does not exist
        let exec = executor(Step::new("ok", "true", None).unwrap(), ctx(dir.path()), &bus);
        let outcome = exec.run().await;
        let failure = outcome.failure().unwrap();
        assert!(failure.message.contains("failed to launch"));
        assert_eq!(
            statuses(&events),
            vec![ExecutionStatus::Running, ExecutionStatus::Failure]
        );
    }

    #[tokio::test]
    async fn runs_in_package_directory() {
        let dir = repo();
        std::fs::write(dir.path().join("api/marker.txt"), "").unwrap();
        let bus = StatusBus::new();
        let exec = executor(
            Step::new("pwd", "test -f marker.txt", None).unwrap(),
            ctx(dir.path()),
            &bus,
        );
        assert_eq!(exec.run().await, Outcome::Success);
    }

    #[tokio::test]
    async fn hook_arguments_are_interpolated() {
        let dir = repo();
        let bus = StatusBus::new();
        let ctx = ctx(dir.path()).with_hook_arguments("  a  b ");
        let exec = executor(
            Step::new("args", "echo {args} > args.txt", None).unwrap(),
            ctx,
            &bus,
        );
        assert_eq!(exec.command(), "echo a b > args.txt");
        assert_eq!(exec.run().await, Outcome::Success);
        let written = std::fs::read_to_string(dir.path().join("api/args.txt")).unwrap();
        assert_eq!(written, "a b\n");
    }

    #[tokio::test]
    async fn python_step_activates_venv() {
        let dir = repo();
        let activate = dir.path().join("activate");
        std::fs::write(
            &activate,
            "export MONOHOOK_VENV=on\ndeactivate() { unset MONOHOOK_VENV; }\n",
        )
        .unwrap();
        let bus = StatusBus::new();
        let kind = StepKind::Python {
            venv_activate: Some(activate),
        };
        let exec = executor(
            Step::new("py", "test \"$MONOHOOK_VENV\" = on", None).unwrap(),
            ctx(dir.path()).with_kind(kind),
            &bus,
        );
        assert_eq!(exec.run().await, Outcome::Success);
    }

    #[tokio::test]
    async fn python_step_fails_when_activation_fails() {
        let dir = repo();
        let bus = StatusBus::new();
        let kind = StepKind::Python {
            venv_activate: Some(dir.path().join("missing/activate")),
        };
        let exec = executor(
            Step::new("py", "true", None).unwrap(),
            ctx(dir.path()).with_kind(kind),
            &bus,
        );
        assert!(exec.run().await.is_failure());
    }

    #[tokio::test]
    async fn python_step_propagates_command_failure() {
        let dir = repo();
        let activate = dir.path().join("activate");
        std::fs::write(&activate, "deactivate() { :; }\n").unwrap();
        let bus = StatusBus::new();
        let kind = StepKind::Python {
            venv_activate: Some(activate),
        };
        let exec = executor(
            Step::new("py", "exit 3", None).unwrap(),
            ctx(dir.path()).with_kind(kind),
            &bus,
        );
        assert!(exec.run().await.is_failure());
    }

    #[tokio::test]
    async fn second_run_returns_memoized_outcome() {
        let dir = repo();
        let bus = StatusBus::new();
        let (events, _sub) = record(&bus);
        let exec = executor(
            Step::new("count", "echo x >> count.txt", None).unwrap(),
            ctx(dir.path()),
            &bus,
        );
        let first = exec.run().await;
        let second = exec.run().await;
        assert_eq!(first, second);
        assert_eq!(exec.launches(), 1);
        let written = std::fs::read_to_string(dir.path().join("api/count.txt")).unwrap();
        assert_eq!(written, "x\n");
        assert_eq!(
            statuses(&events),
            vec![ExecutionStatus::Running, ExecutionStatus::Success]
        );
    }

    #[tokio::test]
    async fn concurrent_runs_launch_once() {
        let dir = repo();
        let bus = StatusBus::new();
        let exec = executor(Step::new("once", "sleep 0.1", None).unwrap(), ctx(dir.path()), &bus);
        let (a, b) = tokio::join!(exec.run(), exec.run());
        assert_eq!(a, b);
        assert_eq!(exec.launches(), 1);
    }

    #[tokio::test]
    async fn cancelled_run_is_not_relaunched() {
        let dir = repo();
        let bus = StatusBus::new();
        let (events, _sub) = record(&bus);
        let exec = executor(
            Step::new("count", "echo x >> count.txt; sleep 0.3", None).unwrap(),
            ctx(dir.path()),
            &bus,
        );
        let first = tokio::time::timeout(Duration::from_millis(100), exec.run()).await;
        assert!(first.is_err());
        let outcome = exec.run().await;
        assert!(outcome.failure().unwrap().message.contains("cancelled"));
        assert_eq!(exec.run().await, outcome);
        assert_eq!(exec.launches(), 1);
        let written =
            std::fs::read_to_string(dir.path().join("api/count.txt")).unwrap_or_default();
        assert_ne!(written, "x\nx\n");
        assert_eq!(
            statuses(&events),
            vec![ExecutionStatus::Running, ExecutionStatus::Failure]
        );
    }

    #[test]
    fn wait_errors_are_not_launch_errors() {
        let launch = ProcessError::Launch {
            cmd: "lint".to_string(),
            source: std::io::Error::other("no such file"),
        };
        let wait = ProcessError::Wait {
            cmd: "lint".to_string(),
            source: std::io::Error::other("interrupted"),
        };
        assert_eq!(launch.to_string(), "failed to launch `lint`: no such file");
        assert_eq!(wait.to_string(), "failed waiting for `lint`: interrupted");
    }

    #[tokio::test]
    async fn independent_executors_keep_their_own_event_order() {
        let dir = repo();
        std::fs::create_dir(dir.path().join("web")).unwrap();
        let bus = StatusBus::new();
        let (events, _sub) = record(&bus);
        let a = executor(Step::new("a", "sleep 0.2", None).unwrap(), ctx(dir.path()), &bus);
        let b = executor(
            Step::new("b", "exit 1", None).unwrap(),
            ExecutionContext::new("web", dir.path().join("web"), dir.path()),
            &bus,
        );
        let (ra, rb) = tokio::join!(a.run(), b.run());
        assert_eq!(ra, Outcome::Success);
        assert!(rb.is_failure());

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 4);
        for step in ["a", "b"] {
            let own = events
                .iter()
                .filter(|e| e.step_name == step)
                .map(|e| e.status)
                .collect_vec();
            assert_eq!(own.len(), 2);
            assert_eq!(own[0], ExecutionStatus::Running);
            assert!(own[1].is_terminal());
        }
    }

    #[tokio::test]
    async fn output_is_capped() {
        let dir = repo();
        let bus = StatusBus::new();
        let exec = executor(
            Step::new("loud", "yes error | head -n 1000 >&2; exit 1", None).unwrap(),
            ctx(dir.path()),
            &bus,
        )
        .output_limit(64);
        let outcome = exec.run().await;
        let failure = outcome.failure().unwrap();
        assert!(failure.message.contains("[... output truncated]"));
        assert!(failure.message.len() < 200);
    }
}
