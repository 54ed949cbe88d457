//! Configuration for runewatch
//!
//! Loads configuration from TOML file at `~/.config/runewatch/config.toml`
//! Auto-generates default config file on first run if missing.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// X display name; `None` uses `$DISPLAY`
    pub display: Option<String>,
    pub game: GameConfig,
    pub events: EventsConfig,
    pub shm: ShmConfig,
    pub property: PropertyConfig,
}

impl Config {
    /// Load configuration from file, or use defaults if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            info!("Config file not found at {:?}, using defaults", config_path);
            if let Err(e) = Self::save_default(&config_path) {
                warn!("Failed to create default config file: {}", e);
            }
            return Ok(Self::default());
        }

        let config = Self::load_from(&config_path)?;
        info!("Configuration loaded from {:?}", config_path);
        debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Parse a config file at an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        toml::from_str(&content).context("Failed to parse config file")
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("runewatch");

        Ok(config_dir.join("config.toml"))
    }

    fn save_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(&Self::default())
            .context("Failed to serialize default config")?;

        fs::write(path, toml_string).context("Failed to write default config file")?;

        info!("Created default config file at {:?}", path);
        Ok(())
    }
}

/// Which application to track
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Application-name half of WM_CLASS that marks a game window
    pub window_class: String,
    /// How often the binary re-runs discovery
    pub rescan_interval_ms: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            window_class: "RuneScape".into(),
            rescan_interval_ms: 2000,
        }
    }
}

impl GameConfig {
    pub fn rescan_interval(&self) -> Duration {
        Duration::from_millis(self.rescan_interval_ms)
    }
}

/// Event worker tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Sleep between polls when the event queue is empty
    pub poll_interval_ms: u64,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
        }
    }
}

impl EventsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Shared memory pool sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShmConfig {
    /// Idle segments kept around for reuse before the oldest is evicted
    pub max_idle_segments: usize,
}

impl Default for ShmConfig {
    fn default() -> Self {
        Self {
            max_idle_segments: crate::shm::MAX_IDLE_SEGMENTS,
        }
    }
}

/// Property read defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyConfig {
    /// Maximum length, in 32-bit units, requested by `GetProperty`
    pub max_length: u32,
}

impl Default for PropertyConfig {
    fn default() -> Self {
        Self { max_length: 1000 }
    }
}
