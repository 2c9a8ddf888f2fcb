use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Deserialize;

use sluice_engine::config::parser::{load_task, process_env};
use sluice_engine::config::task::{resolve_task, TaskOverrides};
use sluice_engine::update::UpdateCheck;
use sluice_engine::{run_iterations, Iterate, IterationSummary, Orchestrator, RunContext, RunTarget};
use sluice_state::SqliteHistoryStore;
use sluice_types::config::split_list;

use crate::local::{EnvRegistry, LocalFileEngine};
use crate::ui;

const HOME_VAR: &str = "SLUICE_HOME";
const UPDATE_URL_VAR: &str = "SLUICE_UPDATE_URL";
const HISTORY_FILE: &str = "history.db";

#[derive(Debug, Default, Args)]
pub struct RunArgs {
    /// Task document: a YAML/JSON file path or inline text
    #[arg(short, long, conflicts_with = "replication")]
    pub config: Option<String>,
    /// Replication YAML file
    #[arg(short, long)]
    pub replication: Option<PathBuf>,

    /// Source connection name or URL
    #[arg(long)]
    pub src_conn: Option<String>,
    /// Source table, query or file path
    #[arg(long)]
    pub src_stream: Option<String>,
    /// Source options as JSON or YAML
    #[arg(long)]
    pub src_options: Option<String>,
    /// Target connection name or URL
    #[arg(long)]
    pub tgt_conn: Option<String>,
    /// Target table or file path
    #[arg(long)]
    pub tgt_object: Option<String>,
    /// Target options as JSON or YAML
    #[arg(long)]
    pub tgt_options: Option<String>,
    /// Environment variables as a JSON or YAML map
    #[arg(long)]
    pub env: Option<String>,
    /// Sync mode (full-refresh, incremental, truncate, snapshot)
    #[arg(short, long)]
    pub mode: Option<String>,
    /// Comma-separated columns to read
    #[arg(short, long)]
    pub select: Option<String>,
    /// Comma-separated replication streams to run (globs allowed)
    #[arg(long)]
    pub streams: Option<String>,
    /// Comma-separated primary key columns
    #[arg(long)]
    pub primary_key: Option<String>,
    /// Column used to detect new or changed rows
    #[arg(long)]
    pub update_key: Option<String>,
    /// Maximum number of rows to read
    #[arg(short, long)]
    pub limit: Option<u64>,
    /// Update-key range, e.g. `2024-01-01,2024-02-01`
    #[arg(long)]
    pub range: Option<String>,

    /// Number of runs, or `infinite`
    #[arg(long, default_value = "1")]
    pub iterate: String,
    /// Write rows to standard output instead of a target
    #[arg(long)]
    pub stdout: bool,
    /// Shortcut for `--log-level debug`
    #[arg(short, long)]
    pub debug: bool,
}

impl RunArgs {
    fn overrides(&self) -> TaskOverrides {
        TaskOverrides {
            src_conn: self.src_conn.clone(),
            src_stream: self.src_stream.clone(),
            src_options: self.src_options.clone(),
            tgt_conn: self.tgt_conn.clone(),
            tgt_object: self.tgt_object.clone(),
            tgt_options: self.tgt_options.clone(),
            env: self.env.clone(),
            mode: self.mode.clone(),
            select: self.select.clone(),
            primary_key: self.primary_key.clone(),
            update_key: self.update_key.clone(),
            limit: self.limit,
            range: self.range.clone(),
            stdout: self.stdout,
        }
    }

    fn has_task_flags(&self) -> bool {
        self.src_conn.is_some() || self.src_stream.is_some()
    }

    /// What every iteration runs.
    fn target(&self) -> Result<RunTarget> {
        if let Some(path) = &self.replication {
            let selectors = self.streams.as_deref().map(split_list).unwrap_or_default();
            return Ok(RunTarget::Replication {
                path: path.clone(),
                selectors,
            });
        }

        if self.config.is_none() && !self.has_task_flags() {
            bail!("nothing to run: pass --replication, --config or --src-conn/--src-stream");
        }
        let base = self
            .config
            .as_deref()
            .map(|text| load_task(text, process_env))
            .transpose()
            .context("Failed to load task configuration")?;
        Ok(RunTarget::Task(resolve_task(base, &self.overrides())?))
    }
}

/// Execute the `run` command: build the run target, then run it `--iterate` times.
pub async fn execute(args: RunArgs) -> Result<()> {
    let iterate: Iterate = args.iterate.parse()?;
    let target = args.target()?;

    let ctx = RunContext::from_env();
    let cancel = ctx.cancellation().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current stream");
            cancel.cancel();
        }
    });

    let mut update = start_update_check();

    let registry = Arc::new(EnvRegistry::from_env());
    let engine = Arc::new(LocalFileEngine::new(Arc::clone(&registry)));
    let mut orchestrator = Orchestrator::new(engine, registry);
    if let Some(history) = open_history() {
        orchestrator = orchestrator.with_history(Arc::new(history));
    }

    tracing::debug!(exec_id = %ctx.exec_id(), iterate = %iterate, "Run starting");
    let result = run_iterations(&orchestrator, &ctx, &target, iterate).await;

    if let Some(notice) = update.notice() {
        ui::info(notice);
    }

    report(&target, result?)
}

/// Print the final status. Failed streams of the last replication become
/// the command's error, listing each stream with its cause.
fn report(target: &RunTarget, summary: IterationSummary) -> Result<()> {
    let IterationSummary {
        iterations,
        failed_iterations,
        last_report,
        interrupted,
    } = summary;

    if interrupted {
        ui::warning("Run interrupted");
    }

    if let Some(report) = last_report {
        let line = report.summary_line();
        if report.has_failures() {
            ui::warning(line);
        } else {
            ui::success(line);
            ui::detail(format!("{} rows transferred", report.rows));
        }
        report.into_result()?;
    } else if matches!(target, RunTarget::Task(_)) && iterations > 0 {
        ui::success(format!(
            "Task completed ({iterations} iteration{})",
            if iterations == 1 { "" } else { "s" }
        ));
    }

    if failed_iterations > 0 {
        bail!("{failed_iterations} of {iterations} iteration(s) finished with failed streams");
    }
    Ok(())
}

/// Directory for local state: `$SLUICE_HOME`, else `~/.sluice`.
fn home_dir() -> Option<PathBuf> {
    match std::env::var(HOME_VAR) {
        Ok(dir) if !dir.trim().is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::home_dir().map(|home| home.join(".sluice")),
    }
}

/// Run history is best effort; a store that can't be opened is skipped.
fn open_history() -> Option<SqliteHistoryStore> {
    let path = home_dir()?.join(HISTORY_FILE);
    match SqliteHistoryStore::open(&path) {
        Ok(store) => Some(store),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Run history disabled");
            None
        }
    }
}

fn start_update_check() -> UpdateCheck {
    match std::env::var(UPDATE_URL_VAR) {
        Ok(url) if !url.trim().is_empty() => {
            UpdateCheck::spawn(env!("CARGO_PKG_VERSION"), latest_version(url))
        }
        _ => UpdateCheck::disabled(),
    }
}

#[derive(Deserialize)]
struct Release {
    version: String,
}

/// Fetch `{"version": "..."}` from the release endpoint.
async fn latest_version(url: String) -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .context("Failed to build HTTP client")?;
    let release: Release = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("Failed to reach {url}"))?
        .error_for_status()?
        .json()
        .await
        .context("Invalid release document")?;
    Ok(release.version)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use sluice_engine::{AggregateReport, RunError, RunOutcome};
    use sluice_types::state::StreamName;

    use super::*;

    fn outcome(stream: &str, error: Option<&str>) -> RunOutcome {
        let now = Utc::now();
        RunOutcome {
            stream: StreamName::new(stream),
            error: error.map(|e| anyhow::anyhow!(e.to_string())),
            rows: 10,
            bytes_in: 0,
            bytes_out: 0,
            started_at: now,
            finished_at: now,
        }
    }

    #[test]
    fn replication_target_splits_selectors() {
        let args = RunArgs {
            replication: Some(PathBuf::from("repl.yaml")),
            streams: Some("public.users, sales.*".into()),
            ..RunArgs::default()
        };
        match args.target().unwrap() {
            RunTarget::Replication { path, selectors } => {
                assert_eq!(path, PathBuf::from("repl.yaml"));
                assert_eq!(selectors, ["public.users", "sales.*"]);
            }
            RunTarget::Task(_) => panic!("expected a replication"),
        }
    }

    #[test]
    fn task_target_from_flags() {
        let args = RunArgs {
            src_stream: Some("file:///tmp/in.csv".into()),
            tgt_object: Some("file:///tmp/out.csv".into()),
            mode: Some("truncate".into()),
            limit: Some(5),
            ..RunArgs::default()
        };
        let RunTarget::Task(config) = args.target().unwrap() else {
            panic!("expected a task");
        };
        assert_eq!(config.source.conn, "file:///tmp/in.csv");
        assert_eq!(config.target.conn, "file:///tmp/out.csv");
        assert_eq!(config.limit(), Some(5));
    }

    #[test]
    fn empty_invocation_is_rejected() {
        let err = RunArgs::default().target().unwrap_err();
        assert!(err.to_string().contains("nothing to run"));
    }

    #[test]
    fn inline_config_is_merged_with_flags() {
        let args = RunArgs {
            config: Some("source:\n  conn: A\n  stream: t\ntarget:\n  conn: B\n  object: t2\n".into()),
            tgt_object: Some("t3".into()),
            ..RunArgs::default()
        };
        let RunTarget::Task(config) = args.target().unwrap() else {
            panic!("expected a task");
        };
        assert_eq!(config.source.conn, "A");
        assert_eq!(config.target.object, "t3");
    }

    #[test]
    fn stream_failures_become_the_command_error() {
        let last = AggregateReport::from_outcomes(
            "PG",
            "DUCK",
            vec![
                outcome("public.users", None),
                outcome("public.orders", Some("relation does not exist")),
            ],
            Duration::from_secs(3),
            false,
        );
        let summary = IterationSummary {
            iterations: 1,
            failed_iterations: 1,
            last_report: Some(last),
            interrupted: false,
        };
        let target = RunTarget::Replication {
            path: PathBuf::from("r.yaml"),
            selectors: Vec::new(),
        };

        let err = report(&target, summary).unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("1 successes / 1 failures"));
        assert!(message.contains("public.orders: relation does not exist"));
        assert!(err.downcast_ref::<RunError>().is_some());
    }

    #[test]
    fn failed_iterations_fail_the_command() {
        let summary = IterationSummary {
            iterations: 2,
            failed_iterations: 1,
            ..IterationSummary::default()
        };
        let target = RunTarget::Replication {
            path: PathBuf::from("r.yaml"),
            selectors: Vec::new(),
        };
        let err = report(&target, summary).unwrap_err();
        assert_eq!(err.to_string(), "1 of 2 iteration(s) finished with failed streams");
    }
}
