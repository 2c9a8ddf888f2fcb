//! Loosely typed option payloads given on the command line.
//!
//! A payload is accepted as strict JSON first, then as YAML block or flow
//! notation. It is converted into a typed fragment at the boundary so nothing
//! downstream sees untyped maps.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::Value;
use sluice_types::config::scalar_to_string;

use crate::error::RunError;

/// Parsed payload mapping.
pub type Payload = serde_json::Map<String, Value>;

/// Parse `payload` into a mapping.
///
/// Blank input yields an empty mapping. With `validate`, keys that contain a
/// colon are rejected: they almost always come from `key:value` written
/// without a space, which YAML reads as one key.
///
/// # Errors
///
/// Returns [`RunError::Configuration`] if the payload is neither a JSON nor a
/// YAML mapping, or if validation rejects a key.
pub fn parse_payload(payload: &str, validate: bool) -> Result<Payload, RunError> {
    let payload = payload.trim();
    if payload.is_empty() {
        return Ok(Payload::new());
    }

    let parsed = match serde_json::from_str::<Payload>(payload) {
        Ok(map) => map,
        Err(_) => serde_yaml::from_str::<Payload>(payload)
            .map_err(|e| RunError::config(format!("could not parse payload: {e}")))?,
    };

    if validate {
        if let Some(key) = parsed.keys().find(|key| key.contains(':')) {
            return Err(RunError::config(format!(
                "invalid key: {key}. Try adding a space after the colon."
            )));
        }
    }

    Ok(parsed)
}

/// Parse a payload into a typed option fragment.
///
/// Returns `Ok(None)` for blank input. `fragment` names the fragment in error
/// messages, e.g. `"source options"`.
///
/// # Errors
///
/// Returns [`RunError::Configuration`] naming the fragment when the payload
/// does not parse or does not fit `T`.
pub fn parse_options<T: DeserializeOwned>(
    payload: &str,
    fragment: &str,
) -> Result<Option<T>, RunError> {
    if payload.trim().is_empty() {
        return Ok(None);
    }
    let map = parse_payload(payload, true)
        .map_err(|e| RunError::config(format!("invalid {fragment} -> {}", strip_prefix(&e))))?;
    serde_json::from_value(Value::Object(map))
        .map(Some)
        .map_err(|e| RunError::config(format!("invalid {fragment} -> {e}")))
}

/// Parse an env payload. Values may be any scalar and are stringified.
///
/// # Errors
///
/// Returns [`RunError::Configuration`] if the payload is not a mapping.
pub fn parse_env_map(payload: &str) -> Result<BTreeMap<String, String>, RunError> {
    let map = parse_payload(payload, false).map_err(|e| {
        RunError::config(format!("invalid env variable map -> {}", strip_prefix(&e)))
    })?;
    Ok(map
        .into_iter()
        .map(|(key, value)| (key, scalar_to_string(&value)))
        .collect())
}

fn strip_prefix(err: &RunError) -> String {
    match err {
        RunError::Configuration(message) => message.clone(),
        other => other.to_string(),
    }
}
