//! Test doubles shared by the engine integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;

use sluice_engine::config::parser::parse_replication_str;
use sluice_engine::config::types::ReplicationSpec;
use sluice_engine::registry::{
    ConnectionInfo, ConnectionKind, ConnectionRegistry, DiscoverOptions, RegistryError,
};
use sluice_engine::transfer::{TransferCounters, TransferEngine};
use sluice_types::config::RunConfig;
use tokio_util::sync::CancellationToken;

/// Path to a file under the workspace `tests/fixtures` directory.
pub fn fixture(relative: &str) -> PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("tests/fixtures")
        .join(relative)
}

pub fn spec(yaml: &str) -> ReplicationSpec {
    parse_replication_str(yaml, |_| None).expect("test replication must parse")
}

/// Engine that records every config it receives.
#[derive(Default)]
pub struct RecordingEngine {
    calls: Mutex<Vec<RunConfig>>,
    fail: HashSet<String>,
    cancel_after: Option<(usize, CancellationToken)>,
    mutate: bool,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the named streams.
    pub fn failing(mut self, streams: &[&str]) -> Self {
        self.fail = streams.iter().map(|s| (*s).to_string()).collect();
        self
    }

    /// Cancel `token` once `calls` transfers have started.
    pub fn cancelling_after(mut self, calls: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((calls, token));
        self
    }

    /// Scribble over the options of every config received.
    pub fn mutating(mut self) -> Self {
        self.mutate = true;
        self
    }

    pub fn calls(&self) -> Vec<RunConfig> {
        self.calls.lock().unwrap().clone()
    }

    pub fn stream_names(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|c| c.display_name().to_string())
            .collect()
    }
}

impl TransferEngine for RecordingEngine {
    fn execute(&self, config: &mut RunConfig, counters: &TransferCounters) -> anyhow::Result<()> {
        let count = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(config.clone());
            calls.len()
        };

        if self.mutate {
            config.target_options_mut().use_bulk = Some(false);
            config.source_options_mut().limit = Some(1);
            config.env.insert("MUTATED".into(), "yes".into());
        }
        if let Some((after, token)) = &self.cancel_after {
            if count >= *after {
                token.cancel();
            }
        }

        let name = config.display_name().to_string();
        if self.fail.contains(&name) {
            anyhow::bail!("simulated failure for {name}");
        }
        counters.add_rows(10);
        counters.add_bytes(100, 90);
        Ok(())
    }
}

/// Registry with a fixed set of connections and per-connection catalogs.
#[derive(Default)]
pub struct StaticRegistry {
    known: HashSet<String>,
    catalogs: BTreeMap<String, Vec<String>>,
}

impl StaticRegistry {
    pub fn new(known: &[&str]) -> Self {
        Self {
            known: known.iter().map(|s| (*s).to_string()).collect(),
            catalogs: BTreeMap::new(),
        }
    }

    pub fn with_catalog(mut self, connection: &str, objects: &[&str]) -> Self {
        self.catalogs.insert(
            connection.to_string(),
            objects.iter().map(|s| (*s).to_string()).collect(),
        );
        self
    }
}

impl ConnectionRegistry for StaticRegistry {
    fn resolve(&self, name: &str) -> Result<ConnectionInfo, RegistryError> {
        if !self.known.contains(name) {
            return Err(RegistryError::NotFound(name.to_string()));
        }
        Ok(ConnectionInfo {
            name: name.to_string(),
            kind: ConnectionKind::Database,
            url: format!("postgres://localhost/{name}"),
        })
    }

    fn discover(
        &self,
        connection: &str,
        pattern: &str,
        _options: &DiscoverOptions,
    ) -> anyhow::Result<Vec<String>> {
        let pattern = glob::Pattern::new(pattern)?;
        Ok(self
            .catalogs
            .get(connection)
            .map(|objects| {
                objects
                    .iter()
                    .filter(|name| pattern.matches(name))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn test(&self, name: &str) -> anyhow::Result<bool> {
        Ok(self.known.contains(name))
    }
}
