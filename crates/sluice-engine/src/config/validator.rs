//! Structural validation for parsed replication documents.

use anyhow::{bail, Result};

use crate::config::types::{is_wildcard, ReplicationSpec};

/// Validate a parsed replication.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// Per-stream checks that depend on merged defaults (such as an empty target
/// object) run later, after wildcard expansion.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the replication.
pub fn validate_replication(spec: &ReplicationSpec) -> Result<()> {
    let mut errors = Vec::new();

    if spec.source.trim().is_empty() {
        errors.push("Source connection must not be empty".to_string());
    }

    if spec.target.trim().is_empty() {
        errors.push("Target connection must not be empty".to_string());
    }

    if spec.streams.is_empty() {
        errors.push("At least one stream must be declared".to_string());
    }

    for name in spec.streams.keys() {
        if name.trim().is_empty() {
            errors.push("Stream name must not be empty".to_string());
            continue;
        }
        if is_wildcard(name) {
            if let Err(e) = glob::Pattern::new(name) {
                errors.push(format!("Stream '{name}': invalid wildcard pattern: {e}"));
            }
        }
    }

    if !errors.is_empty() {
        bail!("Replication validation failed:\n  - {}", errors.join("\n  - "));
    }

    Ok(())
}
