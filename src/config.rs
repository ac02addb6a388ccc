//! Engine configuration loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file) yields the stock
//! 48 kHz stereo 16-bit engine with a 1 kHz tone.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::audio::tone::ToneParams;
use crate::core::format::{AudioFormat, FormatError, SampleKind};

/// Error type for loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub format: FormatConfig,
    pub tone: ToneConfig,
    pub stream: StreamConfig,
}

/// Target format delivered to the device
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    pub channels: u16,
    pub bits_per_sample: u16,
    pub sample_rate: u32,
    pub kind: SampleKind,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ToneConfig {
    pub frequency_hz: u32,
    pub amplitude: f64,
    pub dc_offset: f64,
    pub initial_phase: f64,
}

/// Optional WAVE source and the ingestion loop around it
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub source: Option<PathBuf>,
    pub ring_frames: usize,
    pub chunk_frames: usize,
    pub pace_ms: u64,
    pub disable_synthesis: bool,
    pub start_muted: bool,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            bits_per_sample: 16,
            sample_rate: 48_000,
            kind: SampleKind::Integer,
        }
    }
}

impl Default for ToneConfig {
    fn default() -> Self {
        let params = ToneParams::default();
        Self {
            frequency_hz: params.frequency_hz,
            amplitude: params.amplitude,
            dc_offset: params.dc_offset,
            initial_phase: params.initial_phase,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            source: None,
            ring_frames: 4 * crate::playback::ingestor::DEFAULT_CHUNK_FRAMES,
            chunk_frames: crate::playback::ingestor::DEFAULT_CHUNK_FRAMES,
            pace_ms: crate::playback::ingestor::DEFAULT_PACE.as_millis() as u64,
            disable_synthesis: false,
            start_muted: false,
        }
    }
}

impl FormatConfig {
    pub fn audio_format(&self) -> Result<AudioFormat, FormatError> {
        AudioFormat::with_kind(self.kind, self.channels, self.bits_per_sample, self.sample_rate)
    }
}

impl ToneConfig {
    pub fn params(&self) -> ToneParams {
        ToneParams {
            frequency_hz: self.frequency_hz,
            amplitude: self.amplitude,
            dc_offset: self.dc_offset,
            initial_phase: self.initial_phase,
        }
    }
}

impl StreamConfig {
    pub fn pace(&self) -> Duration {
        Duration::from_millis(self.pace_ms)
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }
}
