//! Terminal rendering of step status events.

use console::style;
use std::{
    io::{self, Write},
    sync::Mutex,
};

use crate::{
    env,
    hook::HookReport,
    status::{ExecutionStatus, StatusBus, StatusEvent, Subscription},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    Text,
    /// One JSON object per event
    Json,
}

impl ReportMode {
    pub fn from_env() -> Self {
        if *env::MONOHOOK_JSON {
            ReportMode::Json
        } else {
            ReportMode::Text
        }
    }
}

pub struct Reporter;

impl Reporter {
    /// Prints every event on `bus` to stderr until the subscription is dropped.
    pub fn attach(bus: &StatusBus, mode: ReportMode) -> Subscription {
        Self::attach_to(bus, mode, io::stderr())
    }

    pub fn attach_to<W>(bus: &StatusBus, mode: ReportMode, writer: W) -> Subscription
    where
        W: Write + Send + 'static,
    {
        let writer = Mutex::new(writer);
        bus.subscribe(move |event| {
            let line = Self::render(event, mode)?;
            let mut writer = writer.lock().unwrap();
            writeln!(writer, "{line}")?;
            writer.flush()?;
            Ok(())
        })
    }

    pub fn render(event: &StatusEvent, mode: ReportMode) -> eyre::Result<String> {
        Ok(match mode {
            ReportMode::Json => serde_json::to_string(event)?,
            ReportMode::Text => {
                let icon = match event.status {
                    ExecutionStatus::Running => style("❯").dim(),
                    ExecutionStatus::Skipped => style("⇢").blue().bold(),
                    ExecutionStatus::Success => style("✔").green().bold(),
                    ExecutionStatus::Failure => style("✗").red().bold(),
                };
                format!(
                    "{icon} {} {} {} {}",
                    style(&event.package_name).bold(),
                    style("›").dim(),
                    event.step_name,
                    style(event.status).dim()
                )
            }
        })
    }

    /// Prints the captured output of every failed step.
    pub fn print_failures(report: &HookReport) -> io::Result<()> {
        Self::print_failures_to(report, &mut io::stderr().lock())
    }

    pub fn print_failures_to<W: Write>(report: &HookReport, writer: &mut W) -> io::Result<()> {
        for failure in report.failures() {
            writeln!(
                writer,
                "{} {}",
                style("✗").red().bold(),
                style(failure.to_string()).red()
            )?;
            for line in failure.message.lines().filter(|l| !l.trim().is_empty()) {
                writeln!(writer, "  {line}")?;
            }
        }
        Ok(())
    }
}
