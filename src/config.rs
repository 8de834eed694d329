use crate::matter::endpoint::EndpointId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Load `KEY=value` pairs from a `.env` file in the working directory.
///
/// Variables already present in the environment win. Values may contain
/// spaces without quoting; surrounding quotes are stripped.
pub fn load_dotenv() {
    load_dotenv_from(Path::new(".env"));
}

fn load_dotenv_from(path: &Path) {
    let Ok(content) = fs::read_to_string(path) else {
        return;
    };

    for (key, value) in content.lines().filter_map(parse_env_line) {
        if std::env::var(key).is_err() {
            // SAFETY: called first thing in main, before any other thread exists
            unsafe { std::env::set_var(key, value) };
        }
    }
}

fn parse_env_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (key, value) = line.split_once('=')?;
    let mut value = value.trim();
    if value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')))
    {
        value = &value[1..value.len() - 1];
    }
    Some((key.trim(), value))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub bridge: BridgeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Capacity of the bridged-device table.
    pub max_bridged_device_count: usize,
    /// Default parent for bridged endpoints.
    pub aggregator_endpoint_id: EndpointId,
    pub first_dynamic_endpoint_id: EndpointId,
    pub max_dynamic_endpoint_count: usize,
    /// JSON file holding persisted bridge state.
    pub state_file: PathBuf,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_bridged_device_count: 16,
            aggregator_endpoint_id: 1,
            first_dynamic_endpoint_id: 2,
            max_dynamic_endpoint_count: 16,
            state_file: default_state_file(),
        }
    }
}

/// `~/.config/matter-device-bridge/bridge.json`, or the working directory if
/// no config directory is known.
pub fn default_state_file() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("matter-device-bridge"))
        .unwrap_or_default()
        .join("bridge.json")
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let bridge = &mut config.bridge;

        if let Some(max) = lookup("BRIDGE_MAX_DEVICES")
            && let Ok(m) = max.parse()
        {
            bridge.max_bridged_device_count = m;
        }
        if let Some(endpoint) = lookup("BRIDGE_AGGREGATOR_ENDPOINT")
            && let Ok(e) = endpoint.parse()
        {
            bridge.aggregator_endpoint_id = e;
        }
        if let Some(endpoint) = lookup("BRIDGE_FIRST_DYNAMIC_ENDPOINT")
            && let Ok(e) = endpoint.parse()
        {
            bridge.first_dynamic_endpoint_id = e;
        }
        if let Some(max) = lookup("BRIDGE_MAX_DYNAMIC_ENDPOINTS")
            && let Ok(m) = max.parse()
        {
            bridge.max_dynamic_endpoint_count = m;
        }
        if let Some(path) = lookup("BRIDGE_STATE_FILE")
            && !path.is_empty()
        {
            bridge.state_file = PathBuf::from(path);
        }

        config
    }
}
