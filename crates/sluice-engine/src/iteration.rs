//! Repeat loop around a task or a replication.

use std::fmt;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::str::FromStr;

use sluice_types::config::RunConfig;

use crate::context::RunContext;
use crate::error::{RunError, RunUnit};
use crate::orchestrator::Orchestrator;
use crate::result::AggregateReport;

/// How many times to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iterate {
    Times(NonZeroU32),
    /// Until cancelled.
    Infinite,
}

impl Iterate {
    pub const ONCE: Self = Self::Times(NonZeroU32::MIN);

    /// Whether another iteration may start after `completed` ones.
    #[must_use]
    pub fn allows_more(self, completed: u32) -> bool {
        match self {
            Self::Times(times) => completed < times.get(),
            Self::Infinite => true,
        }
    }
}

impl Default for Iterate {
    fn default() -> Self {
        Self::ONCE
    }
}

impl fmt::Display for Iterate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Times(times) => write!(f, "{times}"),
            Self::Infinite => f.write_str("infinite"),
        }
    }
}

impl FromStr for Iterate {
    type Err = RunError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        if value.eq_ignore_ascii_case("infinite") {
            return Ok(Self::Infinite);
        }
        value
            .parse::<NonZeroU32>()
            .map(Self::Times)
            .map_err(|_| {
                RunError::config(format!(
                    "invalid value for iterate: '{s}', expected 'infinite' or a positive integer"
                ))
            })
    }
}

/// What each iteration runs.
#[derive(Debug, Clone)]
pub enum RunTarget {
    Task(RunConfig),
    /// Reloaded from disk on every iteration.
    Replication {
        path: PathBuf,
        selectors: Vec<String>,
    },
}

impl RunTarget {
    #[must_use]
    pub fn unit(&self) -> RunUnit {
        match self {
            Self::Task(_) => RunUnit::Task,
            Self::Replication { .. } => RunUnit::Replication,
        }
    }
}

/// Result of the whole repeat loop.
#[derive(Debug, Default)]
pub struct IterationSummary {
    pub iterations: u32,
    /// Replication iterations with at least one failed stream.
    pub failed_iterations: u32,
    pub last_report: Option<AggregateReport>,
    pub interrupted: bool,
}

impl IterationSummary {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed_iterations == 0
    }
}

/// Run `target` according to `iterate`.
///
/// Sleeps the orchestrator's iteration delay between runs and stops early
/// once `ctx` is cancelled.
///
/// # Errors
///
/// A failed task, or a replication that can't be loaded or resolved, ends the
/// loop with [`RunError::Iteration`]. Stream failures inside a replication are
/// counted on the summary instead.
pub async fn run_iterations(
    orchestrator: &Orchestrator,
    ctx: &RunContext,
    target: &RunTarget,
    iterate: Iterate,
) -> Result<IterationSummary, RunError> {
    let mut summary = IterationSummary::default();
    let delay = orchestrator.options().iteration_delay;
    let unit = target.unit();

    loop {
        if ctx.is_cancelled() {
            summary.interrupted = true;
            break;
        }

        let iteration = summary.iterations.saturating_add(1);
        if iteration > 1 {
            let cancelled = tokio::select! {
                () = ctx.cancellation().cancelled() => true,
                () = tokio::time::sleep(delay) => false,
            };
            if cancelled {
                summary.interrupted = true;
                break;
            }
            tracing::info!("Iteration #{iteration}");
        }

        let wrap = |source: RunError| RunError::Iteration {
            unit,
            iteration,
            source: Box::new(source),
        };

        match target {
            RunTarget::Task(config) => {
                orchestrator
                    .run_task(ctx, config.clone())
                    .await
                    .map_err(wrap)?;
            }
            RunTarget::Replication { path, selectors } => {
                let report = orchestrator
                    .run_replication_file(ctx, path, selectors)
                    .await
                    .map_err(wrap)?;
                if report.has_failures() {
                    summary.failed_iterations += 1;
                    tracing::warn!(
                        iteration,
                        failures = report.failure_count(),
                        "Replication iteration finished with failures"
                    );
                }
                summary.interrupted |= report.interrupted;
                summary.last_report = Some(report);
            }
        }

        summary.iterations = iteration;
        if summary.interrupted || !iterate.allows_more(iteration) {
            break;
        }
    }

    Ok(summary)
}
