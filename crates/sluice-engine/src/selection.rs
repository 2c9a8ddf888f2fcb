//! Narrowing a resolved stream sequence to a user-supplied subset.

use sluice_types::state::StreamName;

/// What to do with selectors that match no stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnmatchedSelectors {
    /// Drop them silently.
    #[default]
    Ignore,
    /// Drop them with a warning.
    Warn,
}

/// One selector: an exact name, or a glob when it contains pattern characters.
enum Selector {
    Exact(String),
    Glob(glob::Pattern),
}

impl Selector {
    fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.contains(['*', '?', '[']) {
            if let Ok(pattern) = glob::Pattern::new(raw) {
                return Self::Glob(pattern);
            }
        }
        Self::Exact(raw.to_string())
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            Self::Exact(exact) => exact == name,
            Self::Glob(pattern) => pattern.matches(name),
        }
    }
}

/// Filter `order` down to the streams matching at least one selector.
///
/// Resolved order is kept. Selectors that match no stream are dropped first;
/// when none remain (or none were given) every stream is selected.
#[must_use]
pub fn select_streams(
    order: &[StreamName],
    selectors: &[String],
    unmatched: UnmatchedSelectors,
) -> Vec<StreamName> {
    let parsed: Vec<(&str, Selector)> = selectors
        .iter()
        .map(|raw| raw.trim())
        .filter(|raw| !raw.is_empty())
        .map(|raw| (raw, Selector::parse(raw)))
        .collect();

    let (matching, dropped): (Vec<_>, Vec<_>) = parsed
        .into_iter()
        .partition(|(_, selector)| order.iter().any(|name| selector.matches(name.as_str())));

    if unmatched == UnmatchedSelectors::Warn {
        for (raw, _) in &dropped {
            tracing::warn!(selector = *raw, "Stream selector matched no stream");
        }
    }

    if matching.is_empty() {
        return order.to_vec();
    }
    order
        .iter()
        .filter(|name| matching.iter().any(|(_, selector)| selector.matches(name.as_str())))
        .cloned()
        .collect()
}
