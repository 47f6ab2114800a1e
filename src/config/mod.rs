// Configuration management for pomotune
// Handles loading/saving settings, with sensible defaults when config is missing

use anyhow::Result;
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub music_directory: PathBuf,
    pub recursive_scan: bool,
    pub autoplay: bool,
    pub playback: PlaybackConfig,
    pub log_directory: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub initial_volume: f32,
    pub chunk_frames: usize,
    pub pause_poll_ms: u64,
    pub idle_poll_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            initial_volume: 0.8,
            chunk_frames: 4096,
            pause_poll_ms: 50,
            idle_poll_ms: 500,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            music_directory: dirs::audio_dir().unwrap_or_else(|| PathBuf::from("music")),
            recursive_scan: false,
            autoplay: false,
            playback: PlaybackConfig::default(),
            log_directory: Self::app_dir().join("logs"),
        }
    }
}

impl PlaybackConfig {
    pub fn volume(&self) -> f32 {
        if self.initial_volume.is_nan() {
            0.0
        } else {
            self.initial_volume.clamp(0.0, 1.0)
        }
    }

    pub fn chunk_frames(&self) -> usize {
        self.chunk_frames.max(1)
    }

    pub fn pause_poll(&self) -> Duration {
        Duration::from_millis(self.pause_poll_ms.max(1))
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms.max(1))
    }
}

impl Config {
    /// Load from the default location, writing defaults there on first run
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;

        Ok(())
    }

    pub fn config_path() -> PathBuf {
        Self::app_dir().join("config.toml")
    }

    fn app_dir() -> PathBuf {
        config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pomotune")
    }
}
