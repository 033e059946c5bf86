use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::hal::{ChannelInfo, ChannelType};

/// Persisted form of one channel's metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationRecord {
    pub name: String,
    pub stream: i32,
    pub number: i32,
    #[serde(rename = "type")]
    pub channel_type: i32,
    pub gain: f32,
}

impl From<&ChannelInfo> for ConfigurationRecord {
    fn from(info: &ChannelInfo) -> Self {
        Self {
            name: info.name.clone(),
            stream: info.stream,
            number: info.number,
            channel_type: info.channel_type.code(),
            gain: info.gain,
        }
    }
}

impl ConfigurationRecord {
    pub fn channel_type(&self) -> Option<ChannelType> {
        ChannelType::from_code(self.channel_type)
    }
}

/// Ordered channel records under the `CHANNEL_INFO` grouping key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfoGroup {
    #[serde(rename = "CHANNEL", default)]
    pub channels: Vec<ConfigurationRecord>,
}

/// Everything the adapter saves between sessions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceSettings {
    #[serde(rename = "CHANNEL_INFO", default, skip_serializing_if = "Option::is_none")]
    pub channel_info: Option<ChannelInfoGroup>,
}

impl SourceSettings {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize source settings")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize source settings")
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create settings directory {:?}", parent))?;
            }
        }
        fs::write(path, self.to_json()?)
            .context(format!("Failed to write settings to {:?}", path))
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .context(format!("Failed to read settings from {:?}", path))?;
        Self::from_json(&json)
    }
}
