use std::io::BufRead;
use std::num::NonZero;
use std::path::PathBuf;

use clap::Parser;
use eyre::{Result, WrapErr};
use monohook::{
    hook::HookRunner,
    logger,
    reporter::{ReportMode, Reporter},
    status::StatusBus,
    step::{ExecutionContext, Step, StepKind},
};

#[derive(clap::Parser)]
#[clap(name = "monohook", version = env!("CARGO_PKG_VERSION"), about = env!("CARGO_PKG_DESCRIPTION"))]
struct Cli {
    /// Number of steps to run in parallel
    #[clap(short, long, global = true)]
    jobs: Option<NonZero<usize>>,
    /// Enables verbose output
    #[clap(short, long, global = true, action = clap::ArgAction::Count, overrides_with = "quiet")]
    verbose: u8,
    /// Only show warnings and errors
    #[clap(short, long, global = true, overrides_with = "verbose")]
    quiet: bool,
    /// Print status events as JSON lines
    #[clap(long, global = true)]
    json: bool,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    Step(Box<StepCmd>),
}

/// Run a single package step for the current hook invocation
#[derive(clap::Args)]
struct StepCmd {
    /// Package name, used in status output
    #[clap(long)]
    package: String,
    /// Package directory; relative paths are resolved against --root
    #[clap(long, value_name = "DIR")]
    package_path: PathBuf,
    /// Repository root (default: current directory)
    #[clap(long, value_name = "DIR")]
    root: Option<PathBuf>,
    /// Step name
    #[clap(long)]
    name: String,
    /// Command template; {args} is replaced with --hook-args
    #[clap(long)]
    command: String,
    /// Only run when a changed file matches this glob (relative to the package)
    #[clap(long, value_name = "GLOB")]
    only_on: Option<String>,
    /// Treat the step as a Python step
    #[clap(long)]
    python: bool,
    /// Virtualenv activation script for a Python step
    #[clap(long, value_name = "PATH", requires = "python")]
    venv: Option<PathBuf>,
    /// Arguments git passed to the hook
    #[clap(long, default_value = "", allow_hyphen_values = true)]
    hook_args: String,
    /// Read changed files from stdin, one per line
    #[clap(long)]
    stdin: bool,
    /// Changed files, relative to the repository root
    files: Vec<PathBuf>,
}

pub async fn run() -> Result<i32> {
    let args = Cli::parse();
    let level = if args.quiet {
        Some(log::LevelFilter::Warn)
    } else {
        match args.verbose {
            0 => None,
            1 => Some(log::LevelFilter::Debug),
            _ => Some(log::LevelFilter::Trace),
        }
    };
    logger::init(level);
    let mode = if args.json {
        ReportMode::Json
    } else {
        ReportMode::from_env()
    };
    match args.command {
        Commands::Step(cmd) => cmd.run(args.jobs, mode).await,
    }
}

impl StepCmd {
    async fn run(self, jobs: Option<NonZero<usize>>, mode: ReportMode) -> Result<i32> {
        let root = match self.root {
            Some(root) => root,
            None => std::env::current_dir().wrap_err("failed to read current directory")?,
        };
        let package_path = root.join(&self.package_path);
        let mut files = self.files;
        if self.stdin {
            for line in std::io::stdin().lock().lines() {
                let line = line?;
                let line = line.trim();
                if !line.is_empty() {
                    files.push(PathBuf::from(line));
                }
            }
        }
        let kind = if self.python {
            StepKind::Python {
                venv_activate: self.venv.map(|v| root.join(v)),
            }
        } else {
            StepKind::Generic
        };
        let step = Step::new(&self.name, &self.command, self.only_on.as_deref())?;
        let ctx = ExecutionContext::new(self.package, package_path, root)
            .with_kind(kind)
            .with_hook_arguments(self.hook_args)
            .with_staged_files(files);

        let bus = StatusBus::new();
        let _reporter = Reporter::attach(&bus, mode);
        let mut runner = HookRunner::new(bus);
        if let Some(jobs) = jobs {
            runner = runner.jobs(jobs);
        }
        runner.add(step, ctx)?;
        let report = runner.run().await?;
        Reporter::print_failures(&report)?;
        Ok(report.exit_code())
    }
}
