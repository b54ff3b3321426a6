//! Environment lookups used to source dispatch configuration.

use std::env;
use std::fs;
#[cfg(not(target_arch = "wasm32"))]
use std::path::Path;

use serde_json::Value;

/// Reads `name` from the process environment, ignoring unset and blank values.
pub fn env_value(name: &str) -> Option<String> {
    let raw = env::var(name).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Reads a JSON object from the environment variable `name`. The variable either holds the JSON
/// document inline or a path to a file containing it.
pub fn json_object_from_env(name: &str) -> Option<Value> {
    env_value(name).and_then(|raw| parse_config_source(&raw))
}

pub(crate) fn parse_config_source(raw: &str) -> Option<Value> {
    if let Some(json) = parse_json_object(raw) {
        return Some(json);
    }

    let path = treat_as_path(raw)?;
    let contents = fs::read_to_string(path).ok()?;
    parse_json_object(&contents)
}

fn parse_json_object(raw: &str) -> Option<Value> {
    serde_json::from_str::<Value>(raw)
        .ok()
        .filter(Value::is_object)
}

#[cfg(not(target_arch = "wasm32"))]
fn treat_as_path(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if Path::new(trimmed).is_file() {
        Some(trimmed.to_string())
    } else {
        None
    }
}

#[cfg(target_arch = "wasm32")]
fn treat_as_path(_raw: &str) -> Option<String> {
    None
}
