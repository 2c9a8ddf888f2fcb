//! Run orchestrator: prepares tasks, runs replication streams in isolation,
//! records history and telemetry, and aggregates outcomes.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use sluice_state::HistoryStore;
use sluice_types::config::RunConfig;
use sluice_types::state::{RunStatus, StreamName};

use crate::config::parser::load_replication;
use crate::config::task::{prepare, PreparedTask};
use crate::config::types::ReplicationSpec;
use crate::config::validator::validate_replication;
use crate::context::RunContext;
use crate::error::{RunError, RunUnit};
use crate::execution::ExecutionOptions;
use crate::registry::ConnectionRegistry;
use crate::resolve::resolve_streams;
use crate::result::{AggregateReport, RunOutcome};
use crate::selection::select_streams;
use crate::telemetry::Telemetry;
use crate::transfer::{TransferCounters, TransferEngine};

/// Drives tasks and replications against a transfer engine and a registry.
#[derive(Clone)]
pub struct Orchestrator {
    engine: Arc<dyn TransferEngine>,
    registry: Arc<dyn ConnectionRegistry>,
    history: Option<Arc<dyn HistoryStore>>,
    options: ExecutionOptions,
}

impl Orchestrator {
    pub fn new(engine: Arc<dyn TransferEngine>, registry: Arc<dyn ConnectionRegistry>) -> Self {
        Self {
            engine,
            registry,
            history: None,
            options: ExecutionOptions::default(),
        }
    }

    #[must_use]
    pub fn with_history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    /// Prepare and run one ad-hoc task.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Configuration`] or [`RunError::Resolution`] if the
    /// task can't be prepared, [`RunError::StreamExecution`] if the transfer
    /// fails and [`RunError::Fault`] if the engine panics.
    pub async fn run_task(
        &self,
        ctx: &RunContext,
        mut config: RunConfig,
    ) -> Result<RunOutcome, RunError> {
        let mut telemetry = Telemetry::new(RunUnit::Task);
        tracing::info!(
            exec_id = %ctx.exec_id(),
            stream = config.display_name(),
            mode = %config.mode,
            "Starting task"
        );

        let prepared = match prepare(ctx, &mut config, self.registry.as_ref()) {
            Ok(prepared) => prepared,
            Err(err) => {
                let rejected = RunOutcome::rejected(
                    StreamName::new(config.display_name()),
                    anyhow::anyhow!("could not set task configuration: {err}"),
                );
                telemetry.record_task(&config, None, &rejected);
                telemetry.emit();
                return Err(err);
            }
        };

        let mut outcome = self
            .execute_prepared(ctx, config, &prepared, &mut telemetry)
            .await?;
        match outcome.error.take() {
            Some(source) => Err(RunError::StreamExecution {
                stream: outcome.stream,
                source,
            }),
            None => Ok(outcome),
        }
    }

    /// Load a replication file and run it.
    ///
    /// # Errors
    ///
    /// See [`Orchestrator::run_replication`]; unreadable or malformed files are
    /// [`RunError::Configuration`].
    pub async fn run_replication_file(
        &self,
        ctx: &RunContext,
        path: &Path,
        selectors: &[String],
    ) -> Result<AggregateReport, RunError> {
        let spec = load_replication(path, |name| ctx.env_var(name))
            .map_err(|e| RunError::config(format!("{e:#}")))?;
        self.run_replication(ctx, &spec, selectors).await
    }

    /// Run every selected stream of `spec` in order.
    ///
    /// Stream failures do not stop the run; they are collected on the
    /// returned report. Cancellation is checked before each stream.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Configuration`] or [`RunError::Resolution`] before
    /// any stream runs, and [`RunError::Fault`] if the engine panics.
    pub async fn run_replication(
        &self,
        ctx: &RunContext,
        spec: &ReplicationSpec,
        selectors: &[String],
    ) -> Result<AggregateReport, RunError> {
        let start = Instant::now();

        validate_replication(spec).map_err(|e| RunError::config(format!("{e:#}")))?;
        let resolved = resolve_streams(spec, self.registry.as_ref())?;
        for (role, name) in [("source", resolved.source()), ("target", resolved.target())] {
            self.registry.resolve(name).map_err(|e| {
                RunError::resolution(format!("could not resolve {role} connection '{name}'"), e)
            })?;
        }

        let selected = select_streams(&resolved.order(), selectors, self.options.unmatched_selectors);
        resolved.validate(&selected)?;

        let total = selected.len();
        tracing::info!(
            exec_id = %ctx.exec_id(),
            streams = total,
            "Replication [{total} streams] | {} -> {}",
            resolved.source(),
            resolved.target()
        );

        let mut telemetry = Telemetry::new(RunUnit::Replication);
        let mut outcomes = Vec::with_capacity(total);
        let mut interrupted = false;

        for (idx, name) in selected.iter().enumerate() {
            let position = idx + 1;
            if ctx.is_cancelled() {
                interrupted = true;
                tracing::warn!(
                    remaining = total - idx,
                    "Interrupted, skipping remaining streams"
                );
                break;
            }

            let Some(entry) = resolved.get(name) else {
                continue;
            };
            if entry.is_disabled() {
                tracing::debug!("[{position} / {total}] skipping stream {name} since it is disabled");
                continue;
            }
            let Some(mut config) = resolved.build_config(name) else {
                continue;
            };

            tracing::info!("[{position} / {total}] running stream {name}");

            let outcome = match prepare(ctx, &mut config, self.registry.as_ref()) {
                Ok(prepared) => {
                    self.execute_prepared(ctx, config, &prepared, &mut telemetry)
                        .await?
                }
                Err(err) => {
                    let rejected = RunOutcome::rejected(name.clone(), anyhow::Error::from(err));
                    telemetry.record_task(&config, None, &rejected);
                    telemetry.emit();
                    rejected
                }
            };

            if let Some(err) = &outcome.error {
                tracing::error!(stream = %name, error = %format!("{err:#}"), "Stream failed");
            }
            outcomes.push(outcome);
            telemetry.reset();
        }

        let report = AggregateReport::from_outcomes(
            resolved.source(),
            resolved.target(),
            outcomes,
            start.elapsed(),
            interrupted,
        );
        tracing::info!(
            successes = report.successes,
            failures = report.failure_count(),
            rows = report.rows,
            "{}",
            report.summary_line()
        );
        Ok(report)
    }

    /// Run the transfer for a prepared config on a blocking worker.
    async fn execute_prepared(
        &self,
        ctx: &RunContext,
        config: RunConfig,
        prepared: &PreparedTask,
        telemetry: &mut Telemetry,
    ) -> Result<RunOutcome, RunError> {
        let stream = StreamName::new(config.display_name());

        if ctx.dry_run_for(&config.env) {
            tracing::info!(stream = %stream, "Dry run, skipping transfer");
            let now = Utc::now();
            return Ok(RunOutcome {
                stream,
                error: None,
                rows: 0,
                bytes_in: 0,
                bytes_out: 0,
                started_at: now,
                finished_at: now,
            });
        }

        let run_id = self.start_history(ctx, &stream, &config).await;

        let counters = Arc::new(TransferCounters::new());
        let engine = Arc::clone(&self.engine);
        let task_counters = Arc::clone(&counters);
        let started_at = Utc::now();

        let (config, result) = tokio::task::spawn_blocking(move || {
            let mut config = config;
            let result = engine.execute(&mut config, &task_counters);
            (config, result)
        })
        .await
        .map_err(|e| RunError::Fault(format!("transfer task panicked for stream '{stream}': {e}")))?;

        let finished_at = Utc::now();
        let (bytes_in, bytes_out) = counters.byte_counts();
        let outcome = RunOutcome {
            stream,
            error: result.err(),
            rows: counters.row_count(),
            bytes_in,
            bytes_out,
            started_at,
            finished_at,
        };
        tracing::info!(
            stream = %outcome.stream,
            rows = outcome.rows,
            bytes_in,
            bytes_out,
            duration_secs = outcome.duration().as_secs_f64(),
            success = outcome.is_success(),
            "Transfer finished"
        );

        self.complete_history(run_id, &outcome).await;
        telemetry.record_task(&config, Some(prepared), &outcome);
        telemetry.emit();

        Ok(outcome)
    }

    async fn start_history(
        &self,
        ctx: &RunContext,
        stream: &StreamName,
        config: &RunConfig,
    ) -> Option<i64> {
        let history = self.history.clone()?;
        let config_json = match serde_json::to_string(config) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(stream = %stream, error = %e, "Could not serialize task for history");
                return None;
            }
        };
        let exec_id = ctx.exec_id().clone();
        let stream_for_run = stream.clone();

        match tokio::task::spawn_blocking(move || {
            history.start_run(&exec_id, &stream_for_run, &config_json)
        })
        .await
        {
            Ok(Ok(run_id)) => Some(run_id),
            Ok(Err(e)) => {
                tracing::warn!(stream = %stream, error = %e, "Could not record run start");
                None
            }
            Err(e) => {
                tracing::warn!(stream = %stream, "start_run task panicked: {e}");
                None
            }
        }
    }

    async fn complete_history(&self, run_id: Option<i64>, outcome: &RunOutcome) {
        let (Some(history), Some(run_id)) = (self.history.clone(), run_id) else {
            return;
        };
        let status = if outcome.is_success() {
            RunStatus::Success
        } else {
            RunStatus::Failed
        };
        let stats = outcome.stats();

        match tokio::task::spawn_blocking(move || history.complete_run(run_id, status, &stats)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(stream = %outcome.stream, error = %e, "Could not record run completion");
            }
            Err(e) => {
                tracing::warn!(stream = %outcome.stream, "complete_run task panicked: {e}");
            }
        }
    }
}
