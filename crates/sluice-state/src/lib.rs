//! Run-history persistence for the sluice orchestrator.
//!
//! Provides the [`HistoryStore`] trait and a [`SqliteHistoryStore`]
//! implementation recording one row per task execution.

#![warn(clippy::pedantic)]

pub mod backend;
pub mod error;
pub mod sqlite;

pub use backend::HistoryStore;
pub use error::StateError;
pub use sqlite::SqliteHistoryStore;
