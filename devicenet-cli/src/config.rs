//! Configuration loading and parsing

use anyhow::{bail, Context, Result};
use devicenet_decoder::{DecoderConfig, DeviceNetIdentifier, MessageGroup};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
///
/// Every section is optional; command line flags override the file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub bus: DecoderConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InputConfig {
    /// Capture files (JSON) to decode
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Frames to simulate; none when 0
    #[serde(default)]
    pub frames: usize,
    /// Message group of the simulated identifier (1-4)
    #[serde(default = "default_group")]
    pub group: u8,
    #[serde(default = "default_message_id")]
    pub message_id: u8,
    #[serde(default = "default_mac_id")]
    pub mac_id: u8,
    /// Replace every Nth frame with an error frame; never when 0
    #[serde(default)]
    pub error_every: u64,
    /// Write the simulated capture here
    pub save_capture: Option<PathBuf>,
}

fn default_sample_rate() -> u32 {
    4_000_000
}

fn default_group() -> u8 {
    1
}

fn default_message_id() -> u8 {
    0xC
}

fn default_mac_id() -> u8 {
    0x2F
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            frames: 0,
            group: default_group(),
            message_id: default_message_id(),
            mac_id: default_mac_id(),
            error_every: 0,
            save_capture: None,
        }
    }
}

impl SimulationConfig {
    /// Identifier every simulated frame carries
    pub fn identifier(&self) -> Result<DeviceNetIdentifier> {
        let group = match self.group {
            1 => MessageGroup::Group1,
            2 => MessageGroup::Group2,
            3 => MessageGroup::Group3,
            4 => MessageGroup::Group4,
            other => bail!("Message group must be 1-4, got {}", other),
        };
        DeviceNetIdentifier::compose(group, self.message_id, self.mac_id)
            .context("Invalid simulated identifier")
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    /// Report destination (default: stdout)
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Txt,
    Json,
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config
        .simulation
        .identifier()
        .with_context(|| format!("Invalid [simulation] section in {:?}", path))?;

    Ok(config)
}
