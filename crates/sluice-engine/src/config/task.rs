//! Single-task assembly from discrete overrides and pre-run preparation.

use sluice_types::config::{split_list, RunConfig, SourceOptions, SyncMode, TargetOptions};

use crate::config::parser::substitute_vars;
use crate::config::payload::{parse_env_map, parse_options};
use crate::context::RunContext;
use crate::error::RunError;
use crate::registry::{ConnectionInfo, ConnectionRegistry};

/// Discrete task settings, typically one per command-line flag.
///
/// Option and env fields hold raw payloads (JSON or YAML text).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOverrides {
    pub src_conn: Option<String>,
    pub src_stream: Option<String>,
    pub src_options: Option<String>,
    pub tgt_conn: Option<String>,
    pub tgt_object: Option<String>,
    pub tgt_options: Option<String>,
    pub env: Option<String>,
    pub mode: Option<String>,
    /// Comma-separated column list.
    pub select: Option<String>,
    /// Comma-separated key list.
    pub primary_key: Option<String>,
    pub update_key: Option<String>,
    pub limit: Option<u64>,
    pub range: Option<String>,
    pub stdout: bool,
}

/// Connections a prepared task will use.
#[derive(Debug, Clone)]
pub struct PreparedTask {
    pub source: ConnectionInfo,
    /// `None` when rows go to standard output.
    pub target: Option<ConnectionInfo>,
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Apply `overrides` on top of `base` (or an empty task).
///
/// Override values win over the base document. Option payloads are merged
/// field by field into any options the base already carries.
///
/// # Errors
///
/// Returns [`RunError::Configuration`] for malformed payloads or an unknown mode.
pub fn resolve_task(base: Option<RunConfig>, overrides: &TaskOverrides) -> Result<RunConfig, RunError> {
    let mut config = base.unwrap_or_default();

    let src_conn = non_blank(overrides.src_conn.as_ref());
    if let Some(conn) = src_conn {
        config.source.conn = conn.to_string();
    }
    if let Some(stream) = non_blank(overrides.src_stream.as_ref()) {
        if stream.contains("://") && src_conn.is_none() && config.source.conn.is_empty() {
            config.source.conn = stream.to_string();
        }
        config.source.stream = stream.to_string();
    }

    let tgt_conn = non_blank(overrides.tgt_conn.as_ref());
    if let Some(conn) = tgt_conn {
        config.target.conn = conn.to_string();
    }
    if let Some(object) = non_blank(overrides.tgt_object.as_ref()) {
        if object.contains("://") && tgt_conn.is_none() && config.target.conn.is_empty() {
            config.target.conn = object.to_string();
        }
        config.target.object = object.to_string();
    }

    if let Some(payload) = &overrides.src_options {
        if let Some(mut patch) = parse_options::<SourceOptions>(payload, "source options")? {
            if let Some(existing) = &config.source.options {
                patch.merge_defaults(existing);
            }
            config.source.options = Some(patch);
        }
    }
    if let Some(payload) = &overrides.tgt_options {
        if let Some(mut patch) = parse_options::<TargetOptions>(payload, "target options")? {
            if let Some(existing) = &config.target.options {
                patch.merge_defaults(existing);
            }
            config.target.options = Some(patch);
        }
    }
    if let Some(payload) = &overrides.env {
        config.env.extend(parse_env_map(payload)?);
    }

    if let Some(mode) = non_blank(overrides.mode.as_ref()) {
        config.mode = mode.parse::<SyncMode>().map_err(RunError::Configuration)?;
    }
    if let Some(select) = non_blank(overrides.select.as_ref()) {
        config.source.select = split_list(select);
    }
    if let Some(keys) = non_blank(overrides.primary_key.as_ref()) {
        config.source.primary_key = split_list(keys);
    }
    if let Some(key) = non_blank(overrides.update_key.as_ref()) {
        config.source.update_key = Some(key.to_string());
    }
    if let Some(limit) = overrides.limit {
        config.source_options_mut().limit = Some(limit);
    }
    if let Some(range) = non_blank(overrides.range.as_ref()) {
        config.source_options_mut().range = Some(range.to_string());
    }
    if overrides.stdout {
        config.options.stdout = true;
    }

    Ok(config)
}

/// Finalize a task before it runs.
///
/// Fills both option blocks, substitutes `${VAR}` references from the task
/// env then the context env, checks required fields and resolves the
/// connections through `registry`.
///
/// # Errors
///
/// Returns [`RunError::Configuration`] listing every problem found, or
/// [`RunError::Resolution`] if a connection can't be resolved.
pub fn prepare(
    ctx: &RunContext,
    config: &mut RunConfig,
    registry: &dyn ConnectionRegistry,
) -> Result<PreparedTask, RunError> {
    config.ensure_options();

    let run_env = config.env.clone();
    let lookup = |name: &str| run_env.get(name).cloned().or_else(|| ctx.env_var(name));
    let mut errors = Vec::new();

    for (field, value) in [
        ("source connection", &mut config.source.conn),
        ("source stream", &mut config.source.stream),
        ("target connection", &mut config.target.conn),
        ("target object", &mut config.target.object),
    ] {
        match substitute_vars(value, lookup) {
            Ok(substituted) => *value = substituted,
            Err(e) => errors.push(format!("{field}: {e}")),
        }
    }

    if config.source.conn.trim().is_empty() {
        errors.push("source connection must be provided".to_string());
    }
    if config.source.stream.trim().is_empty() {
        errors.push("source stream must be provided".to_string());
    }
    if !config.options.stdout {
        if config.target.conn.trim().is_empty() {
            errors.push("target connection must be provided".to_string());
        }
        if config.target.object.trim().is_empty() {
            errors.push("target object must be provided".to_string());
        }
    }
    if config.mode == SyncMode::Incremental && !config.has_primary_key() && !config.has_update_key() {
        errors.push("incremental mode requires a primary key or an update key".to_string());
    }

    if !errors.is_empty() {
        return Err(RunError::config(format!(
            "invalid task '{}':\n  - {}",
            config.display_name(),
            errors.join("\n  - ")
        )));
    }

    let source = registry.resolve(&config.source.conn).map_err(|e| {
        RunError::resolution(
            format!("could not resolve source connection '{}'", config.source.conn),
            e,
        )
    })?;
    let target = if config.options.stdout {
        None
    } else {
        Some(registry.resolve(&config.target.conn).map_err(|e| {
            RunError::resolution(
                format!("could not resolve target connection '{}'", config.target.conn),
                e,
            )
        })?)
    };

    Ok(PreparedTask { source, target })
}
