//! Running every applicable step for one hook invocation.
//!
//! [`HookRunner`] owns the executors for a hook invocation, runs them
//! concurrently (bounded by `jobs`) and aggregates their outcomes into a
//! [`HookReport`]. A failing step never aborts its siblings.

use std::{num::NonZero, sync::Arc};
use tokio::sync::Semaphore;

use crate::status::StatusBus;
use crate::step::{ExecutionContext, Outcome, Step, StepExecutor, StepFailure};
use crate::{Result, env};

pub struct HookRunner {
    bus: StatusBus,
    jobs: NonZero<usize>,
    executors: Vec<StepExecutor>,
}

impl HookRunner {
    pub fn new(bus: StatusBus) -> Self {
        Self {
            bus,
            jobs: *env::MONOHOOK_JOBS,
            executors: vec![],
        }
    }

    /// Maximum number of steps running at the same time.
    pub fn jobs(mut self, jobs: NonZero<usize>) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn bus(&self) -> &StatusBus {
        &self.bus
    }

    /// Creates the executor for `step`. An invalid `only_on` pattern is
    /// returned as an error so the whole hook can abort before anything runs.
    pub fn add(&mut self, step: Step, ctx: ExecutionContext) -> Result<()> {
        let executor = StepExecutor::new(step, ctx, self.bus.clone())?;
        self.executors.push(executor);
        Ok(())
    }

    pub fn push(&mut self, executor: StepExecutor) {
        self.executors.push(executor);
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    pub async fn run(self) -> Result<HookReport> {
        let total = self.executors.len();
        debug!("running {total} step(s) with {} job(s)", self.jobs);
        let semaphore = Arc::new(Semaphore::new(self.jobs.get()));
        let mut set = tokio::task::JoinSet::new();
        for (idx, executor) in self.executors.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let outcome = executor.run().await;
                let result = StepResult {
                    package: executor.context().package_name.clone(),
                    step: executor.step().name.clone(),
                    outcome,
                };
                (idx, result)
            });
        }
        let mut results: Vec<Option<StepResult>> = (0..total).map(|_| None).collect();
        while let Some(res) = set.join_next().await {
            match res {
                Ok((idx, result)) => results[idx] = Some(result),
                Err(e) => match e.try_into_panic() {
                    Ok(panic) => std::panic::resume_unwind(panic),
                    Err(e) => return Err(e.into()),
                },
            }
        }
        Ok(HookReport {
            results: results.into_iter().flatten().collect(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub package: String,
    pub step: String,
    pub outcome: Outcome,
}

/// Outcomes of one hook invocation, in the order the steps were added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookReport {
    pub results: Vec<StepResult>,
}

impl HookReport {
    pub fn failures(&self) -> impl Iterator<Item = &StepFailure> {
        self.results.iter().filter_map(|r| r.outcome.failure())
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    /// `1` if any step failed, `0` when every step was skipped or succeeded.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }
}
