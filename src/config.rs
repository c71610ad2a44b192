use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::analysis::AnalysisConfig;
use crate::parameter::Parameter;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PlaybackConfig {
    /// Position sampling cadence.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Output rate of the software graph.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Frames rendered per block when bouncing.
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    #[serde(default = "Parameter::speed")]
    pub speed: Parameter,
    #[serde(default = "Parameter::volume")]
    pub volume: Parameter,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            sample_rate: default_sample_rate(),
            block_size: default_block_size(),
            speed: Parameter::speed(),
            volume: Parameter::volume(),
        }
    }
}

impl PlaybackConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

fn default_tick_interval_ms() -> u64 { 16 }
fn default_sample_rate() -> u32 { 44100 }
fn default_block_size() -> usize { 512 }

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse config: {}", path.display()))
}
