use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SourceError;

/// Acquisition backend families the adapter knows how to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    CustomFpga,
    RhythmFpga,
    Ecube,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [
        BackendKind::CustomFpga,
        BackendKind::RhythmFpga,
        BackendKind::Ecube,
    ];

    /// Display name used in configuration files and the processor list
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::CustomFpga => "Custom FPGA",
            BackendKind::RhythmFpga => "Rhythm FPGA",
            BackendKind::Ecube => "eCube",
        }
    }

    /// Resolve a configured source name, ignoring ASCII case
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| SourceError::NoDriverResolved {
            name: s.to_string(),
        })
    }
}

/// Channel classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelType {
    Continuous,
    Event,
}

impl ChannelType {
    /// Integer code used in persisted configuration
    pub fn code(&self) -> i32 {
        match self {
            ChannelType::Continuous => 0,
            ChannelType::Event => 1,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ChannelType::Continuous),
            1 => Some(ChannelType::Event),
            _ => None,
        }
    }
}

/// Per-channel metadata as reported by a driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub name: String,
    pub channel_type: ChannelType,
    pub stream: i32,
    pub number: i32,
    pub gain: f32,
}

/// Conventions a driver can use to auto-generate channel names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NamingScheme {
    /// CH1, CH2, ...
    Ordinal,
    /// A-CH1, B-CH1, ... (stream letter, per-stream number)
    StreamPrefixed,
    /// Bare per-stream numbers: 1, 2, ...
    Numeric,
}

impl NamingScheme {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(NamingScheme::Ordinal),
            1 => Some(NamingScheme::StreamPrefixed),
            2 => Some(NamingScheme::Numeric),
            _ => None,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            NamingScheme::Ordinal => 0,
            NamingScheme::StreamPrefixed => 1,
            NamingScheme::Numeric => 2,
        }
    }

    /// Name for a channel at flat position `index`, stream `stream`,
    /// per-stream number `number` (zero based)
    pub fn channel_name(&self, index: usize, stream: i32, number: i32) -> String {
        match self {
            NamingScheme::Ordinal => format!("CH{}", index + 1),
            NamingScheme::StreamPrefixed => {
                let letter = (b'A' + (stream.clamp(0, 25) as u8)) as char;
                format!("{}-CH{}", letter, number + 1)
            }
            NamingScheme::Numeric => format!("{}", number + 1),
        }
    }
}
