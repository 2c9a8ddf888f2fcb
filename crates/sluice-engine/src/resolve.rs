//! Stream set resolution: wildcard expansion, default merging and ordering.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use sluice_types::config::{RunConfig, Source, Target, TaskOptions};
use sluice_types::state::StreamName;

use crate::config::types::{is_wildcard, ReplicationSpec, StreamOverride};
use crate::error::RunError;
use crate::registry::{ConnectionRegistry, DiscoverOptions};

/// A replication after expansion and default merging.
///
/// Iteration order is the execution order: declaration order, with each
/// wildcard replaced in place by its sorted matches.
#[derive(Debug, Clone)]
pub struct ResolvedReplication {
    source: String,
    target: String,
    env: BTreeMap<String, String>,
    streams: IndexMap<StreamName, StreamOverride>,
}

/// Expand and merge `spec` into an executable stream set.
///
/// Names discovered for a wildcard that are also declared literally keep
/// their literal entry at its declared position.
///
/// # Errors
///
/// Returns [`RunError::Resolution`] if a wildcard can't be expanded.
pub fn resolve_streams(
    spec: &ReplicationSpec,
    registry: &dyn ConnectionRegistry,
) -> Result<ResolvedReplication, RunError> {
    let mut streams: IndexMap<StreamName, StreamOverride> = IndexMap::new();

    for (name, entry) in &spec.streams {
        let entry = entry.clone().unwrap_or_default();
        if !is_wildcard(name) {
            streams.insert(StreamName::new(name.as_str()), entry);
            continue;
        }

        let options = DiscoverOptions {
            schema: schema_hint(name),
            recursive: name.contains("**"),
        };
        let mut found = registry
            .discover(&spec.source, name, &options)
            .map_err(|e| {
                RunError::resolution(format!("could not expand wildcard stream '{name}'"), e)
            })?;
        found.sort();
        found.dedup();

        if found.is_empty() {
            tracing::warn!(pattern = %name, source = %spec.source, "Wildcard stream matched nothing");
        }
        for discovered in found {
            if spec.declares(&discovered) {
                continue;
            }
            streams
                .entry(StreamName::new(discovered))
                .or_insert_with(|| entry.clone());
        }
    }

    for (name, entry) in &mut streams {
        entry.merge_defaults(&spec.defaults);
        entry.object = entry
            .object
            .as_deref()
            .map(|object| render_object(object, name.as_str()));
    }

    tracing::debug!(streams = streams.len(), "Resolved replication streams");

    Ok(ResolvedReplication {
        source: spec.source.clone(),
        target: spec.target.clone(),
        env: spec.env.clone(),
        streams,
    })
}

impl ResolvedReplication {
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Stream names in execution order.
    #[must_use]
    pub fn order(&self) -> Vec<StreamName> {
        self.streams.keys().cloned().collect()
    }

    #[must_use]
    pub fn get(&self, name: &StreamName) -> Option<&StreamOverride> {
        self.streams.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Check the selected, enabled streams before any of them runs.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Configuration`] listing every stream without a
    /// target object.
    pub fn validate(&self, selected: &[StreamName]) -> Result<(), RunError> {
        let missing: Vec<&str> = selected
            .iter()
            .filter_map(|name| self.streams.get(name).map(|entry| (name, entry)))
            .filter(|(_, entry)| !entry.is_disabled())
            .filter(|(_, entry)| {
                entry
                    .object
                    .as_deref()
                    .map_or(true, |object| object.trim().is_empty())
            })
            .map(|(name, _)| name.as_str())
            .collect();

        if missing.is_empty() {
            return Ok(());
        }
        Err(RunError::config(format!(
            "need to specify a target object for stream(s):\n  - {}",
            missing.join("\n  - ")
        )))
    }

    /// Build the task for one stream. Every option block is copied, so the
    /// result shares nothing with this set or with other streams.
    #[must_use]
    pub fn build_config(&self, name: &StreamName) -> Option<RunConfig> {
        let entry = self.streams.get(name)?;
        Some(RunConfig {
            source: Source {
                conn: self.source.clone(),
                stream: entry
                    .sql
                    .clone()
                    .filter(|sql| !sql.trim().is_empty())
                    .unwrap_or_else(|| name.to_string()),
                select: entry.select.clone().unwrap_or_default(),
                primary_key: entry.primary_key.clone().unwrap_or_default(),
                update_key: entry.update_key.clone(),
                options: entry.source_options.clone(),
            },
            target: Target {
                conn: self.target.clone(),
                object: entry.object.clone().unwrap_or_default(),
                options: entry.target_options.clone(),
            },
            mode: entry.mode.unwrap_or_default(),
            env: self.env.clone(),
            stream_name: Some(name.to_string()),
            options: TaskOptions::default(),
        })
    }
}

/// Schema named by a `schema.pattern` wildcard, if the schema part is literal.
fn schema_hint(pattern: &str) -> Option<String> {
    if pattern.contains('/') {
        return None;
    }
    let (schema, _) = pattern.split_once('.')?;
    (!schema.is_empty() && !is_wildcard(schema)).then(|| schema.to_string())
}

/// Lowercase, with every non-alphanumeric character replaced by `_`.
fn clean(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Render `{stream_name}`, `{stream_schema}`, `{stream_table}` and
/// `{stream_file_name}` in a target object for `stream`.
fn render_object(template: &str, stream: &str) -> String {
    if !template.contains('{') {
        return template.to_string();
    }

    let (schema, table, file_name) = if stream.contains('/') {
        let last = stream.rsplit('/').next().unwrap_or(stream);
        let stem = last.split_once('.').map_or(last, |(stem, _)| stem);
        (String::new(), clean(stem), clean(stem))
    } else {
        match stream.rsplit_once('.') {
            Some((schema, table)) => (clean(schema), clean(table), String::new()),
            None => (String::new(), clean(stream), String::new()),
        }
    };

    template
        .replace("{stream_name}", &clean(stream))
        .replace("{stream_schema}", &schema)
        .replace("{stream_table}", &table)
        .replace("{stream_file_name}", &file_name)
}
