//! Execution options that shape how runs are driven.

use std::time::Duration;

use crate::selection::UnmatchedSelectors;

/// Pause between iterations of a repeated run.
pub const DEFAULT_ITERATION_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOptions {
    pub iteration_delay: Duration,
    pub unmatched_selectors: UnmatchedSelectors,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            iteration_delay: DEFAULT_ITERATION_DELAY,
            unmatched_selectors: UnmatchedSelectors::default(),
        }
    }
}
