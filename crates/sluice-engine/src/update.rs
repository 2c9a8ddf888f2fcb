//! Best-effort background version check.
//!
//! The check runs concurrently with the run and is only consulted at the end,
//! without waiting. Failures are logged at debug level and otherwise ignored.

use std::future::Future;

use semver::Version;
use tokio::sync::oneshot;

#[derive(Debug)]
pub struct UpdateCheck {
    current: String,
    rx: Option<oneshot::Receiver<Option<String>>>,
}

impl UpdateCheck {
    /// A check that never reports anything.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            current: String::new(),
            rx: None,
        }
    }

    /// Start resolving the latest version in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(current: impl Into<String>, latest: F) -> Self
    where
        F: Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        let current = current.into();
        let (tx, rx) = oneshot::channel();
        let running = current.clone();
        tokio::spawn(async move {
            let newer = match latest.await {
                Ok(latest) if is_newer(&latest, &running) => Some(latest),
                Ok(_) => None,
                Err(e) => {
                    tracing::debug!(error = %e, "Version check failed");
                    None
                }
            };
            // The receiver may be gone if the run already finished.
            let _ = tx.send(newer);
        });
        Self {
            current,
            rx: Some(rx),
        }
    }

    /// Advisory message if a newer version is known by now. Never blocks.
    pub fn notice(&mut self) -> Option<String> {
        let latest = self.rx.as_mut()?.try_recv().ok().flatten()?;
        self.rx = None;
        Some(format!(
            "A new version of sluice is available: {latest} (running {})",
            self.current
        ))
    }
}

/// Whether semantic version `candidate` is greater than `current`.
///
/// A leading `v` is ignored on both sides. Pre-releases sort before their
/// release. Unparseable versions never count as newer.
#[must_use]
pub fn is_newer(candidate: &str, current: &str) -> bool {
    match (parse_version(candidate), parse_version(current)) {
        (Some(candidate), Some(current)) => candidate > current,
        _ => false,
    }
}

fn parse_version(raw: &str) -> Option<Version> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    match Version::parse(trimmed) {
        Ok(version) => Some(version),
        Err(e) => {
            tracing::debug!(version = raw, error = %e, "Ignoring unparseable version");
            None
        }
    }
}
