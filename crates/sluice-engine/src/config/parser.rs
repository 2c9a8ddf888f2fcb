//! Replication and task document parsing with `${VAR}` substitution.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::{Captures, Regex};
use sluice_types::config::RunConfig;

use crate::config::types::ReplicationSpec;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Look up variables in the process environment.
#[must_use]
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Substitute `${VAR_NAME}` patterns using `lookup`.
///
/// # Errors
///
/// Returns an error listing every referenced variable `lookup` can't resolve.
pub fn substitute_vars<F>(input: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut missing = BTreeSet::new();
    let result = ENV_VAR_RE.replace_all(input, |caps: &Captures<'_>| {
        lookup(&caps[1]).unwrap_or_else(|| {
            missing.insert(caps[1].to_string());
            String::new()
        })
    });

    if !missing.is_empty() {
        let names: Vec<String> = missing.into_iter().collect();
        anyhow::bail!("Missing environment variable(s): {}", names.join(", "));
    }

    Ok(result.into_owned())
}

/// Parse a replication YAML string (after variable substitution).
///
/// # Errors
///
/// Returns an error if substitution fails or the YAML is invalid.
pub fn parse_replication_str<F>(yaml_str: &str, lookup: F) -> Result<ReplicationSpec>
where
    F: Fn(&str) -> Option<String>,
{
    let substituted = substitute_vars(yaml_str, lookup)?;
    let spec: ReplicationSpec =
        serde_yaml::from_str(&substituted).context("Failed to parse replication YAML")?;
    Ok(spec)
}

/// Parse a replication YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the YAML is invalid.
pub fn load_replication<F>(path: &Path, lookup: F) -> Result<ReplicationSpec>
where
    F: Fn(&str) -> Option<String>,
{
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read replication file: {}", path.display()))?;
    parse_replication_str(&content, lookup)
}

/// Parse a task document given inline (YAML or JSON) or as a path to one.
///
/// # Errors
///
/// Returns an error if the file cannot be read, substitution fails, or the
/// document does not describe a task.
pub fn load_task<F>(text_or_path: &str, lookup: F) -> Result<RunConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let trimmed = text_or_path.trim();
    let path = Path::new(trimmed);
    let content = if !trimmed.contains('\n') && path.is_file() {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read task file: {}", path.display()))?
    } else {
        trimmed.to_string()
    };

    let substituted = substitute_vars(&content, lookup)?;
    let config: RunConfig =
        serde_yaml::from_str(&substituted).context("Failed to parse task document")?;
    Ok(config)
}
