//! Run orchestration for sluice.
//!
//! Resolves replication stream sets, runs each stream in isolation against an
//! external [`TransferEngine`], aggregates outcomes, and drives repeat loops.

pub mod config;
pub mod context;
pub mod error;
pub mod execution;
pub mod iteration;
pub mod orchestrator;
pub mod registry;
pub mod resolve;
pub mod result;
pub mod selection;
pub mod telemetry;
pub mod transfer;
pub mod update;

// Re-export public API for convenience
pub use context::RunContext;
pub use error::{RunError, RunUnit};
pub use execution::ExecutionOptions;
pub use iteration::{run_iterations, Iterate, IterationSummary, RunTarget};
pub use orchestrator::Orchestrator;
pub use registry::{ConnectionInfo, ConnectionKind, ConnectionRegistry, DiscoverOptions, RegistryError};
pub use result::{AggregateReport, RunOutcome};
pub use selection::UnmatchedSelectors;
pub use transfer::{TransferCounters, TransferEngine};
