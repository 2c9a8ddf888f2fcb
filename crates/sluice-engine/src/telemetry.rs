//! Usage record for each task, emitted as a tracing event.
//!
//! Nothing is sent anywhere from here; a subscriber listening on the
//! `sluice::telemetry` target decides what to do with the payload.

use chrono::Utc;
use serde_json::{json, Map, Value};
use sluice_types::config::RunConfig;

use crate::config::task::PreparedTask;
use crate::error::RunUnit;
use crate::result::RunOutcome;

/// Tracing target for telemetry events.
pub const TELEMETRY_TARGET: &str = "sluice::telemetry";

#[derive(Debug, Clone)]
pub struct Telemetry {
    unit: RunUnit,
    fields: Map<String, Value>,
}

impl Telemetry {
    #[must_use]
    pub fn new(unit: RunUnit) -> Self {
        let mut telemetry = Self {
            unit,
            fields: Map::new(),
        };
        telemetry.reset();
        telemetry
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.fields.insert(key.to_string(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Record the task, its options and its outcome.
    pub fn record_task(
        &mut self,
        config: &RunConfig,
        prepared: Option<&PreparedTask>,
        outcome: &RunOutcome,
    ) {
        let source = config.source.options.clone().unwrap_or_default();
        let target = config.target.options.clone().unwrap_or_default();

        self.set(
            "task_options",
            json!({
                "src_has_primary_key": config.has_primary_key(),
                "src_has_update_key": config.has_update_key(),
                "src_flatten": source.flatten,
                "src_format": source.format,
                "src_transforms": source.transforms,
                "tgt_file_max_rows": target.file_max_rows,
                "tgt_file_max_bytes": target.file_max_bytes,
                "tgt_format": target.format,
                "tgt_use_bulk": target.use_bulk,
                "tgt_add_new_columns": target.add_new_columns,
                "tgt_adjust_column_type": target.adjust_column_type,
                "tgt_column_casing": target.column_casing,
            }),
        );

        let source_type = prepared.map(|p| p.source.kind.as_str());
        let target_type = if config.options.stdout {
            Some("stdout")
        } else {
            prepared.and_then(|p| p.target.as_ref()).map(|t| t.kind.as_str())
        };
        let status = if outcome.is_success() { "success" } else { "error" };
        self.set(
            "task",
            json!({
                "mode": config.mode,
                "status": status,
                "source_type": source_type,
                "target_type": target_type,
            }),
        );

        self.set(
            "task_stats",
            json!({
                "start_time": outcome.started_at.to_rfc3339(),
                "end_time": outcome.finished_at.to_rfc3339(),
                "rows_count": outcome.rows,
                "rows_in_bytes": outcome.bytes_in,
                "rows_out_bytes": outcome.bytes_out,
            }),
        );
        self.set("task_status", status);

        if let Some(error) = &outcome.error {
            self.set("error", format!("{error:#}"));
        }
    }

    /// Emit the current record.
    pub fn emit(&self) {
        let payload = Value::Object(self.fields.clone());
        tracing::debug!(target: TELEMETRY_TARGET, event = "run", %payload, "telemetry");
    }

    /// Start a fresh record, keeping only the run mode.
    pub fn reset(&mut self) {
        self.fields.clear();
        self.set("begin_time", Utc::now().timestamp_micros());
        self.set("run_mode", self.unit.as_str());
    }
}

#[cfg(test)]
mod tests {
    use sluice_types::state::StreamName;

    use super::*;

    #[test]
    fn reset_keeps_only_run_mode() {
        let mut telemetry = Telemetry::new(RunUnit::Replication);
        telemetry.set("error", "boom");
        telemetry.reset();
        assert!(telemetry.get("error").is_none());
        assert_eq!(telemetry.get("run_mode"), Some(&json!("replication")));
        assert!(telemetry.get("begin_time").is_some());
    }

    #[test]
    fn records_failed_task() {
        let mut config = RunConfig::default();
        config.source.primary_key = vec!["id".into()];
        config.target_options_mut().use_bulk = Some(false);
        config.options.stdout = true;
        let outcome = RunOutcome::rejected(StreamName::new("t"), anyhow::anyhow!("boom"));

        let mut telemetry = Telemetry::new(RunUnit::Task);
        telemetry.record_task(&config, None, &outcome);

        assert_eq!(telemetry.get("task_status"), Some(&json!("error")));
        assert_eq!(telemetry.get("error"), Some(&json!("boom")));
        let options = telemetry.get("task_options").unwrap();
        assert_eq!(options["src_has_primary_key"], json!(true));
        assert_eq!(options["tgt_use_bulk"], json!(false));
        assert_eq!(telemetry.get("task").unwrap()["target_type"], json!("stdout"));
        assert_eq!(telemetry.get("task").unwrap()["mode"], json!("full-refresh"));
    }
}
