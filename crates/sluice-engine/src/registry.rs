//! Connection registry seam: lookup, introspection and connectivity tests.

use std::fmt;

/// Broad connection family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
    Database,
    File,
}

impl ConnectionKind {
    /// Classify a connection URL by its scheme.
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        let scheme = url.split_once("://").map_or("", |(scheme, _)| scheme);
        match scheme.to_ascii_lowercase().as_str() {
            "file" | "s3" | "gs" | "azure" | "sftp" | "ftp" | "http" | "https" => Self::File,
            _ => Self::Database,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::File => "file",
        }
    }
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub name: String,
    pub kind: ConnectionKind,
    pub url: String,
}

/// Introspection filters for [`ConnectionRegistry::discover`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoverOptions {
    /// Restrict database discovery to one schema.
    pub schema: Option<String>,
    /// Descend into sub-directories for file connections.
    pub recursive: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("connection '{0}' not found")]
    NotFound(String),

    #[error("connection '{name}' is invalid: {reason}")]
    Invalid { name: String, reason: String },
}

/// Named connection store.
///
/// Implementations are called from async code but may block; the orchestrator
/// only calls them outside the transfer hot path.
pub trait ConnectionRegistry: Send + Sync {
    /// Resolve a connection name (or inline URL).
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the name is unknown or its definition is unusable.
    fn resolve(&self, name: &str) -> Result<ConnectionInfo, RegistryError>;

    /// List object names on `connection` matching `pattern` (a glob).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection can't be introspected.
    fn discover(
        &self,
        connection: &str,
        pattern: &str,
        options: &DiscoverOptions,
    ) -> anyhow::Result<Vec<String>>;

    /// Check that `name` is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if the check itself could not run.
    fn test(&self, name: &str) -> anyhow::Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_from_scheme() {
        assert_eq!(ConnectionKind::from_url("file:///tmp/x.csv"), ConnectionKind::File);
        assert_eq!(ConnectionKind::from_url("S3://bucket/key"), ConnectionKind::File);
        assert_eq!(
            ConnectionKind::from_url("postgres://u@h/db"),
            ConnectionKind::Database
        );
        assert_eq!(ConnectionKind::from_url("PG_PROD"), ConnectionKind::Database);
    }

    #[test]
    fn registry_is_object_safe() {
        fn _assert(_: &dyn ConnectionRegistry) {}
    }

    #[test]
    fn error_messages() {
        assert_eq!(
            RegistryError::NotFound("PG".into()).to_string(),
            "connection 'PG' not found"
        );
        let err = RegistryError::Invalid {
            name: "PG".into(),
            reason: "empty url".into(),
        };
        assert_eq!(err.to_string(), "connection 'PG' is invalid: empty url");
    }
}
