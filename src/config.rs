use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::hal::BackendKind;

/// Settings for one source adapter instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Backend name, matched case-insensitively ("Rhythm FPGA", "eCube", ...)
    pub source: String,
    pub poll_interval_ms: u64,
    /// Largest block, in samples, a single processing call may return
    pub event_code_capacity: usize,
    pub stop_timeout_ms: u64,
    /// Id stamped on every timestamp event this adapter emits
    pub source_id: u32,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            source: String::new(),
            poll_interval_ms: 2000,
            event_code_capacity: 10000,
            stop_timeout_ms: 500,
            source_id: 0,
        }
    }
}

impl AdapterConfig {
    pub fn for_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    /// Build from a node's JSON config; missing keys keep their defaults
    pub fn from_json(config: Value) -> Result<Self> {
        serde_json::from_value(config).context("Invalid source adapter config")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .context(format!("Failed to read adapter config from {:?}", path))?;
        let value: Value = serde_json::from_str(&json)
            .context(format!("Adapter config {:?} is not valid JSON", path))?;
        Self::from_json(value)
    }

    /// Backend selected by `source`, if the name is recognized
    pub fn backend(&self) -> Option<BackendKind> {
        BackendKind::from_name(&self.source)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}
