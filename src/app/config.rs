use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::domain::discovery::AutoConnect;
use crate::domain::edge::EdgeDefaults;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Quiet period after the latest registration change before a rescan
    pub debounce_ms: u64,
    /// Fixed period of the background scan
    pub scan_interval_ms: u64,
    pub auto_connect: AutoConnect,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 150,
            scan_interval_ms: 2000,
            auto_connect: AutoConnect::Automatic,
        }
    }
}

impl DiscoveryConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn scan_interval(&self) -> Duration {
        // a zero period would make tokio's interval panic
        Duration::from_millis(self.scan_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub discovery: DiscoveryConfig,
    pub defaults: EdgeDefaults,
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}
