//! Resolved run configuration handed to transfer engines.
//!
//! A [`RunConfig`] describes exactly one source -> target synchronization. It
//! owns every option block it carries, so cloning one produces a fully
//! independent configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// Fill every `None` field of `$target` from `$defaults`, leaving set fields alone.
#[macro_export]
macro_rules! fill_unset {
    ($target:expr, $defaults:expr; $($field:ident),+ $(,)?) => {
        $(
            if $target.$field.is_none() {
                $target.$field.clone_from(&$defaults.$field);
            }
        )+
    };
}

// ── Enums ───────────────────────────────────────────────────────────

/// How the target object is written on each run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// Recreate the target object from a full source read.
    #[default]
    #[serde(alias = "full_refresh")]
    FullRefresh,
    /// Merge rows newer than the last seen update key.
    Incremental,
    /// Empty the target object, then load a full source read.
    Truncate,
    /// Append a full source read as a new snapshot.
    Snapshot,
}

impl SyncMode {
    /// Every accepted mode, in documentation order.
    pub const ALL: [SyncMode; 4] = [
        Self::FullRefresh,
        Self::Incremental,
        Self::Truncate,
        Self::Snapshot,
    ];

    /// Canonical string form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FullRefresh => "full-refresh",
            Self::Incremental => "incremental",
            Self::Truncate => "truncate",
            Self::Snapshot => "snapshot",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == normalized)
            .ok_or_else(|| {
                let expected: Vec<&str> = Self::ALL.iter().map(|m| m.as_str()).collect();
                format!(
                    "unknown sync mode '{s}', expected one of: {}",
                    expected.join(", ")
                )
            })
    }
}

/// File format for file-based sources and targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Json,
    #[serde(alias = "jsonl")]
    JsonLines,
    Parquet,
}

/// Casing applied to column names on the target side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnCasing {
    /// Keep the source column names.
    Source,
    /// Convert to `snake_case`.
    Snake,
    /// Use the target database's native casing.
    Target,
}

// ── Option blocks ───────────────────────────────────────────────────

/// Source-side options. Every field is optional; unset fields inherit defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceOptions {
    /// Maximum number of rows to read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// Update-key range filter, e.g. `2024-01-01,2024-02-01`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<FileFormat>,
    /// Flatten nested records into top-level columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flatten: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transforms: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    /// Literal value read as NULL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub null_if: Option<String>,
}

impl SourceOptions {
    /// Fill unset fields from `defaults`. Fields already set are kept.
    pub fn merge_defaults(&mut self, defaults: &Self) {
        fill_unset!(self, defaults;
            limit, range, format, flatten, transforms, header, delimiter, null_if);
    }
}

/// Target-side options. Every field is optional; unset fields inherit defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_max_rows: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_max_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<FileFormat>,
    /// Use the target's bulk-load path when it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_bulk: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_new_columns: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjust_column_type: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_casing: Option<ColumnCasing>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_ddl: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_tmp: Option<String>,
    /// Statement executed on the target before loading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_sql: Option<String>,
    /// Statement executed on the target after loading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_sql: Option<String>,
}

impl TargetOptions {
    /// Fill unset fields from `defaults`. Fields already set are kept.
    pub fn merge_defaults(&mut self, defaults: &Self) {
        fill_unset!(self, defaults;
            file_max_rows, file_max_bytes, format, use_bulk, add_new_columns,
            adjust_column_type, column_casing, table_ddl, table_tmp, pre_sql, post_sql);
    }
}

// ── Run configuration ───────────────────────────────────────────────

/// Source half of a [`RunConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Source {
    /// Connection name or URL.
    #[serde(default)]
    pub conn: String,
    /// Table, query or file path to read.
    #[serde(default)]
    pub stream: String,
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub select: Vec<String>,
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub primary_key: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<SourceOptions>,
}

/// Target half of a [`RunConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Target {
    /// Connection name or URL.
    #[serde(default)]
    pub conn: String,
    /// Table or file path to write.
    #[serde(default)]
    pub object: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<TargetOptions>,
}

/// Task-level switches that are not tied to either side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskOptions {
    /// Write rows to standard output instead of a target connection.
    #[serde(default)]
    pub stdout: bool,
}

/// Fully resolved description of one source -> target synchronization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default)]
    pub source: Source,
    #[serde(default)]
    pub target: Target,
    #[serde(default)]
    pub mode: SyncMode,
    #[serde(
        default,
        deserialize_with = "string_map",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub env: BTreeMap<String, String>,
    /// Replication stream this config was built for, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_name: Option<String>,
    #[serde(default)]
    pub options: TaskOptions,
}

impl RunConfig {
    #[must_use]
    pub fn has_primary_key(&self) -> bool {
        !self.source.primary_key.is_empty()
    }

    #[must_use]
    pub fn has_update_key(&self) -> bool {
        self.source
            .update_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }

    /// Mutable source options, creating an empty block if absent.
    pub fn source_options_mut(&mut self) -> &mut SourceOptions {
        self.source.options.get_or_insert_with(SourceOptions::default)
    }

    /// Mutable target options, creating an empty block if absent.
    pub fn target_options_mut(&mut self) -> &mut TargetOptions {
        self.target.options.get_or_insert_with(TargetOptions::default)
    }

    /// Make both option blocks present so readers never need to null-check.
    pub fn ensure_options(&mut self) {
        self.source_options_mut();
        self.target_options_mut();
    }

    /// Row limit from the source options.
    #[must_use]
    pub fn limit(&self) -> Option<u64> {
        self.source.options.as_ref().and_then(|o| o.limit)
    }

    /// Name used for logs: the replication stream name, else the source stream.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.stream_name.as_deref().unwrap_or(&self.source.stream)
    }
}

// ── Serde helpers ───────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(joined) => split_list(&joined),
            Self::Many(items) => items,
        }
    }
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
#[must_use]
pub fn split_list(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Accept either `"a,b"` or `[a, b]` for key lists.
///
/// # Errors
///
/// Returns the deserializer's error for values that are neither form.
pub fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(Option::<OneOrMany>::deserialize(deserializer)?
        .map(OneOrMany::into_vec)
        .unwrap_or_default())
}

/// Like [`one_or_many`] but keeps "absent" distinct from "empty".
///
/// # Errors
///
/// Returns the deserializer's error for values that are neither form.
pub fn opt_one_or_many<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Vec<String>>, D::Error> {
    Ok(Option::<OneOrMany>::deserialize(deserializer)?.map(OneOrMany::into_vec))
}

/// Deserialize an env map whose values may be any scalar.
///
/// # Errors
///
/// Returns the deserializer's error when the value is not a mapping.
pub fn string_map<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, String>, D::Error> {
    let raw = Option::<BTreeMap<String, serde_json::Value>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| (key, scalar_to_string(&value)))
        .collect())
}

/// Render a loosely typed value the way it would appear in an env var.
#[must_use]
pub fn scalar_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_mode_accepts_both_spellings() {
        assert_eq!("full-refresh".parse::<SyncMode>().unwrap(), SyncMode::FullRefresh);
        assert_eq!("full_refresh".parse::<SyncMode>().unwrap(), SyncMode::FullRefresh);
        assert_eq!("Incremental".parse::<SyncMode>().unwrap(), SyncMode::Incremental);
        let err = "drop".parse::<SyncMode>().unwrap_err();
        assert!(err.contains("unknown sync mode 'drop'"));
        assert!(err.contains("snapshot"));
    }

    #[test]
    fn source_options_merge_keeps_explicit_values() {
        let mut options = SourceOptions {
            limit: Some(10),
            ..SourceOptions::default()
        };
        let defaults = SourceOptions {
            limit: Some(500),
            flatten: Some(true),
            ..SourceOptions::default()
        };
        options.merge_defaults(&defaults);
        assert_eq!(options.limit, Some(10));
        assert_eq!(options.flatten, Some(true));
        assert!(options.range.is_none());
    }

    #[test]
    fn target_options_reject_unknown_fields() {
        let result: Result<TargetOptions, _> =
            serde_json::from_value(serde_json::json!({"use_bulk": true, "usebulk": false}));
        assert!(result.is_err());
    }

    #[test]
    fn primary_key_accepts_string_or_list() {
        let yaml = "conn: PG\nstream: public.users\nprimary_key: id, tenant_id\n";
        let source: Source = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(source.primary_key, vec!["id", "tenant_id"]);

        let yaml = "conn: PG\nstream: public.users\nprimary_key: [id]\n";
        let source: Source = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(source.primary_key, vec!["id"]);
    }

    #[test]
    fn select_accepts_string_or_list() {
        let yaml = "conn: PG\nstream: public.users\nselect: id, name\n";
        let source: Source = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(source.select, vec!["id", "name"]);

        let yaml = "conn: PG\nstream: public.users\nselect: [id, email]\n";
        let source: Source = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(source.select, vec!["id", "email"]);
    }

    #[test]
    fn env_values_are_stringified() {
        let yaml = r"
source: {conn: A, stream: t}
target: {conn: B, object: t2}
env:
  BATCH: 500
  FLAG: true
  NAME: nightly
";
        let config: RunConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.env["BATCH"], "500");
        assert_eq!(config.env["FLAG"], "true");
        assert_eq!(config.env["NAME"], "nightly");
    }

    #[test]
    fn ensure_options_makes_blocks_present() {
        let mut config = RunConfig::default();
        assert!(config.source.options.is_none());
        config.ensure_options();
        assert!(config.source.options.is_some());
        assert!(config.target.options.is_some());
        assert_eq!(config.limit(), None);
    }

    #[test]
    fn clone_does_not_share_option_blocks() {
        let mut first = RunConfig::default();
        first.source_options_mut().limit = Some(5);
        let mut second = first.clone();
        second.source_options_mut().limit = Some(99);
        assert_eq!(first.limit(), Some(5));
        assert_eq!(second.limit(), Some(99));
    }

    #[test]
    fn update_key_must_be_non_blank() {
        let mut config = RunConfig::default();
        config.source.update_key = Some("  ".into());
        assert!(!config.has_update_key());
        config.source.update_key = Some("updated_at".into());
        assert!(config.has_update_key());
    }
}
