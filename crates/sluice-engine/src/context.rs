//! Per-execution context passed explicitly through every run.

use std::collections::BTreeMap;

use chrono::Utc;
use sluice_types::state::ExecId;
use tokio_util::sync::CancellationToken;

/// Env var that supplies the execution id.
pub const EXEC_ID_VAR: &str = "SLUICE_EXEC_ID";
/// Env var that turns on dry runs.
pub const DRY_RUN_VAR: &str = "SLUICE_DRY_RUN";

/// Execution id, cancellation, dry-run switch and a snapshot of the process env.
#[derive(Debug, Clone)]
pub struct RunContext {
    exec_id: ExecId,
    cancel: CancellationToken,
    dry_run: bool,
    env: BTreeMap<String, String>,
}

impl RunContext {
    /// Context with a fresh exec id and an empty env snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            exec_id: new_exec_id(),
            cancel: CancellationToken::new(),
            dry_run: false,
            env: BTreeMap::new(),
        }
    }

    /// Context initialized from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let env: BTreeMap<String, String> = std::env::vars().collect();
        let exec_id = env
            .get(EXEC_ID_VAR)
            .filter(|id| !id.trim().is_empty())
            .map_or_else(new_exec_id, |id| ExecId::new(id.trim()));
        let dry_run = env.get(DRY_RUN_VAR).is_some_and(|v| parse_bool_flag(v));
        Self {
            exec_id,
            cancel: CancellationToken::new(),
            dry_run,
            env,
        }
    }

    #[must_use]
    pub fn with_exec_id(mut self, exec_id: ExecId) -> Self {
        self.exec_id = exec_id;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[must_use]
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    #[must_use]
    pub fn exec_id(&self) -> &ExecId {
        &self.exec_id
    }

    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Look up a variable in the env snapshot.
    #[must_use]
    pub fn env_var(&self, name: &str) -> Option<String> {
        self.env.get(name).cloned()
    }

    /// Dry run applies if set on the context or in the run's own env map.
    #[must_use]
    pub fn dry_run_for(&self, run_env: &BTreeMap<String, String>) -> bool {
        self.dry_run || run_env.get(DRY_RUN_VAR).is_some_and(|v| parse_bool_flag(v))
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Timestamp-based execution id, unique per process.
#[must_use]
pub fn new_exec_id() -> ExecId {
    ExecId::new(format!(
        "{}-{}",
        Utc::now().format("%Y%m%dT%H%M%S%3f"),
        std::process::id()
    ))
}

/// Truthy values for boolean env flags.
#[must_use]
pub fn parse_bool_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "t" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_flags() {
        for v in ["1", "true", "TRUE", " yes ", "on", "t"] {
            assert!(parse_bool_flag(v), "{v}");
        }
        for v in ["", "0", "false", "off", "nope"] {
            assert!(!parse_bool_flag(v), "{v}");
        }
    }

    #[test]
    fn dry_run_from_run_env() {
        let ctx = RunContext::new();
        let mut env = BTreeMap::new();
        assert!(!ctx.dry_run_for(&env));
        env.insert(DRY_RUN_VAR.to_string(), "true".to_string());
        assert!(ctx.dry_run_for(&env));
        assert!(ctx.with_dry_run(true).dry_run_for(&BTreeMap::new()));
    }

    #[test]
    fn cancellation_is_shared_with_clones() {
        let token = CancellationToken::new();
        let ctx = RunContext::new().with_cancellation(token.clone());
        let copy = ctx.clone();
        assert!(!copy.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
        assert!(copy.is_cancelled());
    }

    #[test]
    fn env_snapshot_lookup() {
        let ctx = RunContext::new().with_env(BTreeMap::from([("HOST".to_string(), "db".to_string())]));
        assert_eq!(ctx.env_var("HOST").as_deref(), Some("db"));
        assert!(ctx.env_var("PORT").is_none());
    }

    #[test]
    fn exec_ids_embed_pid() {
        let id = new_exec_id();
        assert!(id.as_str().ends_with(&format!("-{}", std::process::id())));
    }
}
