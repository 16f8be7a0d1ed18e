//! Reading definition files and parameter flags.

use std::path::Path;

use anyhow::{Context, bail};
use serde_json::{Map, Value};

use crate::cli::root_commands::ParamInput;

/// Read a JSON document from disk.
pub fn read_json(path: &Path) -> anyhow::Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

/// Merge `--params` and `--param` into one bag. `--param` entries win.
pub fn parameters(input: &ParamInput) -> anyhow::Result<Map<String, Value>> {
    let mut bag = match &input.params {
        Some(text) => match serde_json::from_str::<Value>(text).context("--params is not valid JSON")? {
            Value::Object(map) => map,
            other => bail!("--params must be a JSON object, got {other}"),
        },
        None => Map::new(),
    };

    for pair in &input.param {
        let (key, raw) = pair
            .split_once('=')
            .with_context(|| format!("--param '{pair}' must look like key=value"))?;
        let key = key.trim();
        if key.is_empty() {
            bail!("--param '{pair}' has an empty key");
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        bag.insert(key.to_string(), value);
    }
    Ok(bag)
}
