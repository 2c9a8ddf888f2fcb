//! Shared sluice model types.
//!
//! Holds the fully resolved [`config::RunConfig`] handed to transfer engines and
//! the run-history newtypes shared by the engine and state crates.

pub mod config;
pub mod state;
