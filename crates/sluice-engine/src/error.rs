//! Run error taxonomy.

use std::fmt;
use std::fmt::Write as _;

use sluice_types::state::StreamName;

use crate::result::StreamFailure;

/// Kind of unit an iteration runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunUnit {
    /// One ad-hoc source -> target task.
    Task,
    /// A whole replication file.
    Replication,
}

impl RunUnit {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Replication => "replication",
        }
    }
}

impl fmt::Display for RunUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categorized orchestration error.
///
/// `Configuration` and `Resolution` are fatal to the unit that raised them.
/// Stream failures inside a replication are isolated and only surface at the
/// end as `StreamFailures`. Interruption is not an error; it is reported on
/// the [`AggregateReport`](crate::result::AggregateReport).
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Malformed payload, missing required field or conflicting options.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Wildcard expansion or connection lookup failed.
    #[error("resolution error: {message}")]
    Resolution {
        message: String,
        #[source]
        source: anyhow::Error,
    },

    /// The transfer for a single task failed.
    #[error("stream '{stream}' failed")]
    StreamExecution {
        stream: StreamName,
        #[source]
        source: anyhow::Error,
    },

    /// One or more replication streams failed while the others ran.
    #[error("{}", summarize(.successes, .failures))]
    StreamFailures {
        successes: usize,
        failures: Vec<StreamFailure>,
    },

    /// An iteration of the repeat loop failed.
    #[error("failure running {unit} (iteration #{iteration})")]
    Iteration {
        unit: RunUnit,
        iteration: u32,
        #[source]
        source: Box<RunError>,
    },

    /// A collaborator panicked; converted here so it never unwinds into the caller.
    #[error("unexpected fault: {0}")]
    Fault(String),
}

impl RunError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn resolution(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Resolution {
            message: message.into(),
            source: source.into(),
        }
    }

    /// Returns `true` for errors that invalidate the whole unit rather than one stream.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        match self {
            Self::Configuration(_) | Self::Resolution { .. } | Self::Fault(_) => true,
            Self::StreamExecution { .. } | Self::StreamFailures { .. } => false,
            Self::Iteration { source, .. } => source.is_structural(),
        }
    }
}

fn summarize(successes: &usize, failures: &[StreamFailure]) -> String {
    let mut out = format!("{successes} successes / {} failures", failures.len());
    for failure in failures {
        let _ = write!(out, "\n  - {}: {:#}", failure.stream, failure.error);
    }
    out
}
