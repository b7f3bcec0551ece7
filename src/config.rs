use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::export::ClampMode;

const APP_DIR: &str = "ledmapper";

/// Settings read from `config.json` in the user config directory. Every
/// field is optional in the file.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Map database; defaults to `maps.db` next to the config file.
    pub db_path: Option<PathBuf>,
    /// Pixel width fixtures are rendered at when sampling LEDs.
    pub surface_width: f64,
    pub export: ExportConfig,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ExportConfig {
    pub clamp: ClampMode,
    pub pretty: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: None,
            surface_width: 1200.0,
            export: ExportConfig::default(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self { clamp: ClampMode::PassThrough, pretty: false }
    }
}

impl Config {
    /// Load from `path`; a missing file gives the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("[CONFIG] No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {:?}", path))?;
        let config: Config = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config at {:?}", path))?;

        if !(config.surface_width > 0.0) {
            warn!("[CONFIG] surface_width {} is not positive, using default", config.surface_width);
            return Ok(Self { surface_width: Self::default().surface_width, ..config });
        }
        Ok(config)
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(|| config_dir().join("maps.db"))
    }
}

pub fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub fn user_config_path() -> PathBuf {
    config_dir().join("config.json")
}

fn config_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        if let Some(home) = home::home_dir() {
            return home.join("Library").join("Application Support").join(APP_DIR);
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Some(base) = std::env::var_os("APPDATA") {
            return PathBuf::from(base).join(APP_DIR);
        }
    }

    // Linux / fallback: XDG or ~/.config
    if let Ok(base) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(base).join(APP_DIR)
    } else if let Some(home) = home::home_dir() {
        home.join(".config").join(APP_DIR)
    } else {
        // Last resort: current directory
        PathBuf::from(".")
    }
}
