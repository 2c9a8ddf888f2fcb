//! Replication and task configuration: parsing, validation, task assembly.

pub mod parser;
pub mod payload;
pub mod task;
pub mod types;
pub mod validator;
