//! Per-stream outcomes and the aggregate report built from them.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sluice_types::state::{RunStats, StreamName};

use crate::error::RunError;

/// Result of one stream (or one ad-hoc task).
///
/// Built by the orchestrator around a single transfer call and never
/// modified afterwards.
#[derive(Debug)]
pub struct RunOutcome {
    pub stream: StreamName,
    /// `None` on success.
    pub error: Option<anyhow::Error>,
    pub rows: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunOutcome {
    /// Outcome for a stream that failed before its transfer could start.
    pub(crate) fn rejected(stream: StreamName, error: anyhow::Error) -> Self {
        let now = Utc::now();
        Self {
            stream,
            error: Some(error),
            rows: 0,
            bytes_in: 0,
            bytes_out: 0,
            started_at: now,
            finished_at: now,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }

    /// Counters in the shape the history store persists.
    #[must_use]
    pub fn stats(&self) -> RunStats {
        RunStats {
            rows: self.rows,
            bytes_in: self.bytes_in,
            bytes_out: self.bytes_out,
            error_message: self.error.as_ref().map(|e| format!("{e:#}")),
        }
    }
}

/// A failed stream and its cause.
#[derive(Debug)]
pub struct StreamFailure {
    pub stream: StreamName,
    pub error: anyhow::Error,
}

/// Summary of a replication run, projected from its outcomes in run order.
#[derive(Debug)]
pub struct AggregateReport {
    pub source: String,
    pub target: String,
    pub successes: usize,
    pub failures: Vec<StreamFailure>,
    pub rows: u64,
    /// Wall-clock time since the run began.
    pub elapsed: Duration,
    /// The run stopped early because cancellation was requested.
    pub interrupted: bool,
}

impl AggregateReport {
    #[must_use]
    pub fn from_outcomes(
        source: impl Into<String>,
        target: impl Into<String>,
        outcomes: Vec<RunOutcome>,
        elapsed: Duration,
        interrupted: bool,
    ) -> Self {
        let mut successes = 0;
        let mut rows = 0;
        let mut failures = Vec::new();

        for outcome in outcomes {
            rows += outcome.rows;
            match outcome.error {
                None => successes += 1,
                Some(error) => failures.push(StreamFailure {
                    stream: outcome.stream,
                    error,
                }),
            }
        }

        Self {
            source: source.into(),
            target: target.into(),
            successes,
            failures,
            rows,
            elapsed,
            interrupted,
        }
    }

    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// One-line completion status.
    #[must_use]
    pub fn summary_line(&self) -> String {
        let verb = if self.interrupted {
            "Interrupted"
        } else {
            "Completed"
        };
        format!(
            "Replication {verb} in {} | {} -> {} | {} Successes | {} Failures",
            format_duration(self.elapsed),
            self.source,
            self.target,
            self.successes,
            self.failure_count(),
        )
    }

    /// Turn partial failure into a single error while keeping successes counted.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::StreamFailures`] if at least one stream failed.
    pub fn into_result(self) -> Result<Self, RunError> {
        if self.has_failures() {
            Err(RunError::StreamFailures {
                successes: self.successes,
                failures: self.failures,
            })
        } else {
            Ok(self)
        }
    }
}

/// Compact human duration: `350ms`, `12s`, `3m4s`, `1h0m5s`.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    if total == 0 {
        return format!("{}ms", duration.as_millis());
    }
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(stream: &str, rows: u64) -> RunOutcome {
        let now = Utc::now();
        RunOutcome {
            stream: StreamName::new(stream),
            error: None,
            rows,
            bytes_in: rows * 10,
            bytes_out: rows * 10,
            started_at: now,
            finished_at: now,
        }
    }

    fn failed(stream: &str, message: &str) -> RunOutcome {
        RunOutcome::rejected(StreamName::new(stream), anyhow::anyhow!(message.to_string()))
    }

    #[test]
    fn report_counts_successes_and_orders_failures() {
        let report = AggregateReport::from_outcomes(
            "PG",
            "SNOWFLAKE",
            vec![ok("a", 10), failed("b", "boom"), ok("c", 5), failed("d", "bang")],
            Duration::from_secs(3),
            false,
        );
        assert_eq!(report.successes, 2);
        assert_eq!(report.failure_count(), 2);
        assert_eq!(report.failures[0].stream.as_str(), "b");
        assert_eq!(report.failures[1].stream.as_str(), "d");
        assert_eq!(report.rows, 15);
    }

    #[test]
    fn into_result_fails_only_with_failures() {
        let clean = AggregateReport::from_outcomes("A", "B", vec![ok("a", 1)], Duration::ZERO, false);
        assert!(clean.into_result().is_ok());

        let partial = AggregateReport::from_outcomes(
            "A",
            "B",
            vec![ok("a", 1), failed("b", "boom")],
            Duration::ZERO,
            false,
        );
        let err = partial.into_result().unwrap_err();
        assert!(err.to_string().starts_with("1 successes / 1 failures"));
    }

    #[test]
    fn summary_line_mentions_both_ends() {
        let report = AggregateReport::from_outcomes(
            "PG",
            "DUCK",
            vec![ok("a", 1)],
            Duration::from_secs(65),
            false,
        );
        assert_eq!(
            report.summary_line(),
            "Replication Completed in 1m5s | PG -> DUCK | 1 Successes | 0 Failures"
        );
    }

    #[test]
    fn rejected_outcome_records_error_message() {
        let outcome = failed("a", "no object");
        assert!(!outcome.is_success());
        assert_eq!(outcome.stats().error_message.as_deref(), Some("no object"));
        assert_eq!(outcome.duration(), Duration::ZERO);
    }

    #[test]
    fn durations_format_compactly() {
        assert_eq!(format_duration(Duration::from_millis(350)), "350ms");
        assert_eq!(format_duration(Duration::from_secs(12)), "12s");
        assert_eq!(format_duration(Duration::from_secs(3605)), "1h0m5s");
    }
}
