//! Persisted application settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::geo::Coordinate;
use crate::map::resource::AcquireSettings;
use crate::map::tiles::{TileLayerKind, TileOverrides};
use crate::paths;

/// Settings read from `config.json`. Every field has a default so partial
/// files keep working.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Who is using the map; venues they add are theirs to delete
    pub viewer_id: Option<String>,
    pub initial_center: Coordinate,
    pub initial_zoom: f64,
    /// Base layer shown on start, updated when the user switches
    pub tile_layer: TileLayerKind,
    pub tiles: TileOverrides,
    /// Map surface readiness polling
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
    pub geodata_dir: Option<PathBuf>,
    pub venues_file: Option<PathBuf>,
    /// Reported as the current location
    pub home: Option<Coordinate>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            viewer_id: None,
            initial_center: Coordinate::new(30.2672, -97.7431),
            initial_zoom: 12.0,
            tile_layer: TileLayerKind::Street,
            tiles: TileOverrides::default(),
            poll_interval_ms: 100,
            max_attempts: 50,
            geodata_dir: None,
            venues_file: None,
            home: None,
        }
    }
}

impl AppConfig {
    pub fn acquire_settings(&self) -> AcquireSettings {
        AcquireSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            max_attempts: self.max_attempts.max(AcquireSettings::MIN_ATTEMPTS),
        }
    }

    pub fn geodata_dir(&self) -> PathBuf {
        self.geodata_dir.clone().unwrap_or_else(paths::default_geodata_dir)
    }

    pub fn venues_file(&self) -> PathBuf {
        self.venues_file.clone().unwrap_or_else(paths::default_venues_file)
    }

    /// Configured viewer, else the login name
    pub fn viewer(&self) -> Option<String> {
        self.viewer_id
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .or_else(|| std::env::var("USERNAME").ok())
            .filter(|v| !v.trim().is_empty())
    }

    /// Replace values the map cannot start with. Returns what was fixed.
    fn sanitize(&mut self) -> Vec<String> {
        let defaults = AppConfig::default();
        let mut fixed = Vec::new();
        if !self.initial_center.is_valid() {
            fixed.push(format!(
                "initial_center ({}, {}) is not a valid coordinate",
                self.initial_center.lat, self.initial_center.lng
            ));
            self.initial_center = defaults.initial_center;
        }
        if !self.initial_zoom.is_finite() || self.initial_zoom < 1.0 {
            fixed.push(format!("initial_zoom {} is out of range", self.initial_zoom));
            self.initial_zoom = defaults.initial_zoom;
        }
        if self.home.is_some_and(|h| !h.is_valid()) {
            fixed.push("home is not a valid coordinate".to_string());
            self.home = None;
        }
        fixed
    }
}

/// Outcome of reading the config file
pub struct LoadedConfig {
    pub config: AppConfig,
    pub path: PathBuf,
    /// Set when the file existed but could not be used as-is
    pub reset_reason: Option<String>,
}

pub fn load() -> LoadedConfig {
    load_from(&paths::config_file())
}

pub fn load_from(path: &Path) -> LoadedConfig {
    let (mut config, mut reset_reason) = if path.exists() {
        match std::fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str::<AppConfig>(&json) {
                Ok(config) => {
                    info!("Loaded config from {:?}", path);
                    (config, None)
                }
                Err(e) => {
                    warn!("Failed to parse config file: {}", e);
                    (
                        AppConfig::default(),
                        Some(format!("Configuration file was corrupted: {}", e)),
                    )
                }
            },
            Err(e) => {
                warn!("Failed to read config file: {}", e);
                (
                    AppConfig::default(),
                    Some(format!("Could not read configuration file: {}", e)),
                )
            }
        }
    } else {
        info!("No config file found, using defaults");
        (AppConfig::default(), None)
    };

    let fixed = config.sanitize();
    if !fixed.is_empty() {
        warn!("Config values replaced with defaults: {}", fixed.join("; "));
        if reset_reason.is_none() {
            reset_reason = Some(format!("Some settings were reset: {}", fixed.join("; ")));
        }
    }

    LoadedConfig {
        config,
        path: path.to_path_buf(),
        reset_reason,
    }
}

pub fn save_to(config: &AppConfig, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(config).context("serialize config")?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    std::fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    info!("Config saved to {:?}", path);
    Ok(())
}
