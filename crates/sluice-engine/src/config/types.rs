//! Replication document types.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sluice_types::config::{opt_one_or_many, string_map, SourceOptions, SyncMode, TargetOptions};

/// A replication file: one source, one target, many streams.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplicationSpec {
    /// Source connection name or URL.
    #[serde(default)]
    pub source: String,
    /// Target connection name or URL.
    #[serde(default)]
    pub target: String,
    /// Applied to every stream for fields the stream leaves unset.
    #[serde(default)]
    pub defaults: StreamOverride,
    /// Declaration order is the default execution order. A `null` entry takes
    /// the defaults unchanged.
    #[serde(default)]
    pub streams: IndexMap<String, Option<StreamOverride>>,
    #[serde(
        default,
        deserialize_with = "string_map",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub env: BTreeMap<String, String>,
}

impl ReplicationSpec {
    /// Whether `name` is declared literally (not as a pattern).
    #[must_use]
    pub fn declares(&self, name: &str) -> bool {
        !is_wildcard(name) && self.streams.contains_key(name)
    }
}

/// Whether a stream entry is a pattern to expand against the source.
#[must_use]
pub fn is_wildcard(name: &str) -> bool {
    name.contains('*')
}

/// Per-stream settings. Unset fields inherit from [`ReplicationSpec::defaults`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamOverride {
    /// Target object; may contain `{stream_schema}`-style placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<SyncMode>,
    #[serde(
        default,
        deserialize_with = "opt_one_or_many",
        skip_serializing_if = "Option::is_none"
    )]
    pub select: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "opt_one_or_many",
        skip_serializing_if = "Option::is_none"
    )]
    pub primary_key: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_key: Option<String>,
    /// Custom query that replaces the stream name as the source stream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_options: Option<SourceOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_options: Option<TargetOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
}

impl StreamOverride {
    /// Fill unset fields from `defaults`. Option blocks merge field by field.
    pub fn merge_defaults(&mut self, defaults: &Self) {
        sluice_types::fill_unset!(self, defaults;
            object, mode, select, primary_key, update_key, sql, disabled);

        if let Some(source_defaults) = &defaults.source_options {
            self.source_options
                .get_or_insert_with(SourceOptions::default)
                .merge_defaults(source_defaults);
        }
        if let Some(target_defaults) = &defaults.target_options {
            self.target_options
                .get_or_insert_with(TargetOptions::default)
                .merge_defaults(target_defaults);
        }
    }

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r"
source: PG
target: SNOWFLAKE
defaults:
  mode: full-refresh
  object: raw.{stream_table}
  target_options:
    use_bulk: true
streams:
  public.users:
  public.orders:
    mode: incremental
    primary_key: id
    update_key: updated_at
    target_options:
      add_new_columns: true
  public.audit:
    disabled: true
";

    #[test]
    fn parses_streams_in_declaration_order() {
        let spec: ReplicationSpec = serde_yaml::from_str(YAML).unwrap();
        let names: Vec<&str> = spec.streams.keys().map(String::as_str).collect();
        assert_eq!(names, ["public.users", "public.orders", "public.audit"]);
        assert!(spec.streams["public.users"].is_none());
        assert!(spec.declares("public.orders"));
    }

    #[test]
    fn merge_keeps_stream_values_and_fills_the_rest() {
        let spec: ReplicationSpec = serde_yaml::from_str(YAML).unwrap();
        let mut orders = spec.streams["public.orders"].clone().unwrap();
        orders.merge_defaults(&spec.defaults);

        assert_eq!(orders.mode, Some(SyncMode::Incremental));
        assert_eq!(orders.object.as_deref(), Some("raw.{stream_table}"));
        assert_eq!(orders.primary_key, Some(vec!["id".to_string()]));
        let target = orders.target_options.unwrap();
        assert_eq!(target.use_bulk, Some(true));
        assert_eq!(target.add_new_columns, Some(true));
    }

    #[test]
    fn disabled_is_inherited_and_defaults_to_false() {
        let mut entry = StreamOverride::default();
        assert!(!entry.is_disabled());
        entry.merge_defaults(&StreamOverride {
            disabled: Some(true),
            ..StreamOverride::default()
        });
        assert!(entry.is_disabled());
    }

    #[test]
    fn unknown_stream_fields_are_rejected() {
        let yaml = "source: A\ntarget: B\nstreams:\n  t:\n    objekt: x\n";
        assert!(serde_yaml::from_str::<ReplicationSpec>(yaml).is_err());
    }

    #[test]
    fn wildcard_names_are_not_declarations() {
        let yaml = "source: A\ntarget: B\nstreams:\n  'public.*':\n";
        let spec: ReplicationSpec = serde_yaml::from_str(yaml).unwrap();
        assert!(is_wildcard("public.*"));
        assert!(!spec.declares("public.*"));
    }
}
