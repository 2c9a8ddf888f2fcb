//! Environment-backed connection registry and a local file transfer driver.
//!
//! Connections are declared as `NAME=scheme://...` environment variables.
//! Only `file://` connections can be introspected, tested or transferred by
//! this binary; other kinds resolve but need an external driver.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use sluice_engine::registry::{
    ConnectionInfo, ConnectionKind, ConnectionRegistry, DiscoverOptions, RegistryError,
};
use sluice_engine::transfer::{TransferCounters, TransferEngine};
use sluice_types::config::{RunConfig, SyncMode};

const FILE_SCHEME: &str = "file://";

/// Connections taken from environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvRegistry {
    connections: BTreeMap<String, String>,
}

impl EnvRegistry {
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Keep variables with an upper-case name whose value looks like a URL.
    /// The tool's own `SLUICE_*` settings are never connections.
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let connections = vars
            .into_iter()
            .filter(|(name, url)| {
                !name.starts_with("SLUICE_")
                    && !name.is_empty()
                    && name
                        .chars()
                        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
                    && url.contains("://")
            })
            .collect();
        Self { connections }
    }

    /// Every declared connection, sorted by name.
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.connections
            .iter()
            .map(|(name, url)| ConnectionInfo {
                name: name.clone(),
                kind: ConnectionKind::from_url(url),
                url: url.clone(),
            })
            .collect()
    }

    /// URL for a connection name. Inline URLs resolve to themselves.
    fn url_for(&self, name: &str) -> Option<String> {
        if name.contains("://") {
            return Some(name.to_string());
        }
        self.connections
            .get(name)
            .or_else(|| self.connections.get(&name.to_ascii_uppercase()))
            .cloned()
    }

    fn file_root(&self, name: &str) -> Result<PathBuf> {
        let url = self
            .url_for(name)
            .with_context(|| format!("connection '{name}' not found"))?;
        match url.strip_prefix(FILE_SCHEME) {
            Some(path) => Ok(PathBuf::from(path)),
            None => bail!(
                "connection '{name}' is a {} connection; only file:// connections are handled locally",
                ConnectionKind::from_url(&url)
            ),
        }
    }
}

impl ConnectionRegistry for EnvRegistry {
    fn resolve(&self, name: &str) -> Result<ConnectionInfo, RegistryError> {
        let url = self
            .url_for(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        let rest = url.split_once("://").map_or("", |(_, rest)| rest);
        if rest.trim().is_empty() {
            return Err(RegistryError::Invalid {
                name: name.to_string(),
                reason: "URL has no location after the scheme".to_string(),
            });
        }
        Ok(ConnectionInfo {
            name: name.to_string(),
            kind: ConnectionKind::from_url(&url),
            url,
        })
    }

    fn discover(
        &self,
        connection: &str,
        pattern: &str,
        options: &DiscoverOptions,
    ) -> Result<Vec<String>> {
        let root = self.file_root(connection)?;
        let pattern = pattern.strip_prefix(FILE_SCHEME).unwrap_or(pattern);
        let full = if Path::new(pattern).is_absolute() {
            PathBuf::from(pattern)
        } else if options.recursive && !pattern.contains("**") {
            root.join("**").join(pattern)
        } else {
            root.join(pattern)
        };
        let full = full.to_string_lossy().into_owned();

        let mut found = Vec::new();
        for entry in glob::glob(&full).with_context(|| format!("invalid pattern '{full}'"))? {
            let path = entry.context("could not read directory entry")?;
            if path.is_file() {
                found.push(format!("{FILE_SCHEME}{}", path.display()));
            }
        }
        found.sort();
        Ok(found)
    }

    fn test(&self, name: &str) -> Result<bool> {
        let root = self.file_root(name)?;
        Ok(root.exists())
    }
}

/// Copies line-oriented files between `file://` connections or to stdout.
///
/// The first line is treated as a header unless `header: false` is set.
/// Incremental and snapshot runs append; other modes overwrite.
pub struct LocalFileEngine {
    registry: Arc<EnvRegistry>,
}

impl LocalFileEngine {
    pub fn new(registry: Arc<EnvRegistry>) -> Self {
        Self { registry }
    }

    /// Path for `object` on connection `conn`.
    fn path_for(&self, conn: &str, object: &str) -> Result<PathBuf> {
        if let Some(path) = object.strip_prefix(FILE_SCHEME) {
            return Ok(PathBuf::from(path));
        }
        let root = self.registry.file_root(conn)?;
        if Path::new(object).is_absolute() {
            return Ok(PathBuf::from(object));
        }
        Ok(root.join(object))
    }
}

impl TransferEngine for LocalFileEngine {
    fn execute(&self, config: &mut RunConfig, counters: &TransferCounters) -> Result<()> {
        let source = self.path_for(&config.source.conn, &config.source.stream)?;
        let has_header = config
            .source
            .options
            .as_ref()
            .and_then(|o| o.header)
            .unwrap_or(true);
        let limit = config.limit();
        let append = matches!(config.mode, SyncMode::Incremental | SyncMode::Snapshot);

        let reader = BufReader::new(
            File::open(&source)
                .with_context(|| format!("could not open source file {}", source.display()))?,
        );

        let (mut writer, skip_header): (Box<dyn Write>, bool) = if config.options.stdout {
            (Box::new(std::io::stdout().lock()), false)
        } else {
            let target = self.path_for(&config.target.conn, &config.target.object)?;
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("could not create {}", parent.display()))?;
            }
            let existing = append && target.metadata().is_ok_and(|m| m.len() > 0);
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .append(append)
                .truncate(!append)
                .open(&target)
                .with_context(|| format!("could not open target file {}", target.display()))?;
            (Box::new(BufWriter::new(file)), existing)
        };

        tracing::debug!(
            source = %source.display(),
            mode = %config.mode,
            append,
            "Copying file"
        );

        let mut rows = 0u64;
        for (idx, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("could not read {}", source.display()))?;
            let bytes = line.len() as u64 + 1;
            let is_header = has_header && idx == 0;

            if !is_header && limit.is_some_and(|limit| rows >= limit) {
                break;
            }
            if is_header && skip_header {
                counters.add_bytes(bytes, 0);
                continue;
            }

            writeln!(writer, "{line}").context("could not write row")?;
            counters.add_bytes(bytes, bytes);
            if !is_header {
                rows += 1;
                counters.add_rows(1);
            }
        }
        writer.flush().context("could not flush output")?;
        Ok(())
    }
}

/// Hide the password part of a URL's user info.
pub fn redact(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((user_info, host)) = rest.split_once('@') else {
        return url.to_string();
    };
    match user_info.split_once(':') {
        Some((user, _)) => format!("{scheme}://{user}:****@{host}"),
        None => url.to_string(),
    }
}
