//! History store trait definition.
//!
//! [`HistoryStore`] defines the storage contract for task execution
//! history. Model types live in [`sluice_types::state`].

use sluice_types::state::{ExecId, RunStats, RunStatus, StreamName};

use crate::error;

/// Storage contract for run history.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn HistoryStore>`.
pub trait HistoryStore: Send + Sync {
    /// Record the start of a task execution, returning its row ID.
    ///
    /// `config_json` is the serialized run configuration the task executes.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn start_run(
        &self,
        exec_id: &ExecId,
        stream: &StreamName,
        config_json: &str,
    ) -> error::Result<i64>;

    /// Finalize a task execution with status and counters.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn complete_run(&self, run_id: i64, status: RunStatus, stats: &RunStats) -> error::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Verify the trait is object-safe (can be used as `dyn HistoryStore`).
    #[test]
    fn trait_is_object_safe() {
        fn _assert_object_safe(_: &dyn HistoryStore) {}
    }
}
