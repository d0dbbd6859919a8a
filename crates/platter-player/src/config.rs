//! Player configuration for platter-player
//!
//! Configuration is stored as YAML in the user's config directory.
//! Default location: ~/.config/platter-player/config.yaml
//!
//! Command-line flags override anything set here.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use platter_core::engine::DEFAULT_QUANTUM_FRAMES;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Output device and buffer preferences
    pub audio: AudioSection,
    /// Feeder behavior
    pub playback: PlaybackSection,
}

/// Audio configuration section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSection {
    /// Output device name (None = system default)
    pub device: Option<String>,
    /// Requested device buffer size in frames (None = built-in default)
    pub buffer_frames: Option<u32>,
    /// Stream sample rate override (None = follow the source file)
    pub sample_rate: Option<u32>,
}

/// Playback configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSection {
    /// Per-callback chunk cap in frames
    pub quantum_frames: u32,
}

impl Default for PlaybackSection {
    fn default() -> Self {
        Self {
            quantum_frames: DEFAULT_QUANTUM_FRAMES,
        }
    }
}

/// Get the default config file path
///
/// Returns: ~/.config/platter-player/config.yaml
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("platter-player")
        .join("config.yaml")
}

/// Load configuration from a YAML file
///
/// If the file doesn't exist, returns default config.
/// If the file exists but is invalid, logs a warning and returns default config.
pub fn load_config(path: &Path) -> PlayerConfig {
    if !path.exists() {
        log::debug!("load_config: {:?} doesn't exist, using defaults", path);
        return PlayerConfig::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<PlayerConfig>(&contents) {
            Ok(config) => {
                log::info!("load_config: Loaded {:?}", path);
                config
            }
            Err(e) => {
                log::warn!("load_config: Failed to parse config: {}, using defaults", e);
                PlayerConfig::default()
            }
        },
        Err(e) => {
            log::warn!(
                "load_config: Failed to read config file: {}, using defaults",
                e
            );
            PlayerConfig::default()
        }
    }
}
