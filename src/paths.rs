//! Where courtmap keeps its files.
//!
//! In development mode (cargo run or a debug build) everything resolves
//! relative to the current directory. Installed builds use the platform
//! locations from `dirs`:
//! - Linux: `~/.config/courtmap/` (config), `~/.local/share/courtmap/` (data)
//! - macOS: `~/Library/Application Support/courtmap/`
//! - Windows: `%APPDATA%\courtmap\`

use std::path::PathBuf;

const APP_DIR: &str = "courtmap";

/// True under `cargo run` or in a debug build
pub fn is_dev_mode() -> bool {
    std::env::var("CARGO").is_ok() || cfg!(debug_assertions)
}

pub fn config_dir() -> Option<PathBuf> {
    if is_dev_mode() {
        return Some(PathBuf::from("."));
    }

    #[cfg(target_os = "linux")]
    {
        dirs::config_dir().map(|p| p.join(APP_DIR))
    }

    #[cfg(not(target_os = "linux"))]
    {
        data_dir()
    }
}

pub fn data_dir() -> Option<PathBuf> {
    if is_dev_mode() {
        return Some(PathBuf::from("."));
    }

    dirs::data_dir().map(|p| p.join(APP_DIR))
}

pub fn config_file() -> PathBuf {
    config_dir()
        .map(|p| p.join("config.json"))
        .unwrap_or_else(|| PathBuf::from("config.json"))
}

/// GeoJSON basemap and gazetteer files
pub fn default_geodata_dir() -> PathBuf {
    data_dir()
        .map(|p| p.join("data"))
        .unwrap_or_else(|| PathBuf::from("data"))
}

pub fn default_venues_file() -> PathBuf {
    data_dir()
        .map(|p| p.join("venues.json"))
        .unwrap_or_else(|| PathBuf::from("venues.json"))
}

pub fn logs_dir() -> PathBuf {
    data_dir()
        .map(|p| p.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

/// Create config, data and log directories for installed builds
pub fn ensure_directories() -> std::io::Result<()> {
    if is_dev_mode() {
        return Ok(());
    }

    if let Some(config) = config_dir() {
        std::fs::create_dir_all(config)?;
    }
    if let Some(data) = data_dir() {
        std::fs::create_dir_all(data.join("logs"))?;
    }
    Ok(())
}
