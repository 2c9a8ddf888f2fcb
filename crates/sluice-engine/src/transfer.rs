//! Transfer engine seam and the counters it reports through.

use std::sync::atomic::{AtomicU64, Ordering};

use sluice_types::config::RunConfig;

/// Row and byte counters for one transfer.
///
/// Written by the engine while it runs, read by the orchestrator afterwards.
/// A fresh set is created for every stream.
#[derive(Debug, Default)]
pub struct TransferCounters {
    rows: AtomicU64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
}

impl TransferCounters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rows(&self, rows: u64) {
        self.rows.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn add_bytes(&self, bytes_in: u64, bytes_out: u64) {
        self.bytes_in.fetch_add(bytes_in, Ordering::Relaxed);
        self.bytes_out.fetch_add(bytes_out, Ordering::Relaxed);
    }

    #[must_use]
    pub fn row_count(&self) -> u64 {
        self.rows.load(Ordering::Relaxed)
    }

    /// `(bytes_in, bytes_out)`.
    #[must_use]
    pub fn byte_counts(&self) -> (u64, u64) {
        (
            self.bytes_in.load(Ordering::Relaxed),
            self.bytes_out.load(Ordering::Relaxed),
        )
    }
}

/// Moves rows for one fully resolved configuration.
///
/// `execute` is synchronous and may block for a long time; the orchestrator
/// runs it on a blocking worker. The engine may fill in defaults on `config`;
/// the changes stay local to that one stream.
pub trait TransferEngine: Send + Sync {
    /// Run one transfer to completion.
    ///
    /// # Errors
    ///
    /// Returns the transfer failure with as much context as the engine has.
    fn execute(&self, config: &mut RunConfig, counters: &TransferCounters) -> anyhow::Result<()>;
}
