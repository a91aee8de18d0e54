//! Configuration management for torrentplay
//!
//! Handles config file loading/saving and the on-disk directory layout.
//! Config is stored at ~/.config/torrentplay/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::models::Quality;
use crate::stream::bandwidth::SettingsProvider;
use crate::stream::monitor::DEFAULT_BUFFERING_THRESHOLD;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Upload cap in KB/s (0 or absent = unlimited)
    pub upload_limit_kbps: Option<u32>,
    /// Download cap in KB/s (0 or absent = unlimited)
    pub download_limit_kbps: Option<u32>,
    /// Where media data is saved
    pub download_dir: Option<PathBuf>,
    /// Percent downloaded before playback may start
    pub buffering_threshold: Option<f64>,
    /// Preferred quality (2160p, 1080p, 720p, 480p)
    pub preferred_quality: Option<String>,
    /// Path to the webtorrent binary
    pub webtorrent_path: Option<String>,
}

impl Config {
    /// Get config file path (~/.config/torrentplay/config.toml)
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("torrentplay").join("config.toml"))
    }

    /// Load config from file, or return default if not found
    pub fn load() -> Self {
        Self::path()
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|s| toml::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Load config from an explicit path; unlike `load`, errors are reported
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        let path = Self::path().ok_or_else(|| anyhow::anyhow!("Could not determine config path"))?;
        self.save_to(&path)
    }

    /// Save config to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml = toml::to_string_pretty(self)?;
        std::fs::write(path, toml)?;
        Ok(())
    }

    /// Root for cached data (~/.cache/torrentplay)
    pub fn cache_root() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("torrentplay")
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .unwrap_or_else(|| Self::cache_root().join("downloads"))
    }

    pub fn torrents_dir(&self) -> PathBuf {
        Self::cache_root().join("torrents")
    }

    pub fn subtitles_dir(&self) -> PathBuf {
        Self::cache_root().join("subtitles")
    }

    pub fn buffering_threshold(&self) -> f64 {
        self.buffering_threshold
            .filter(|t| t.is_finite())
            .unwrap_or(DEFAULT_BUFFERING_THRESHOLD)
    }

    pub fn quality(&self) -> Option<Quality> {
        self.preferred_quality
            .as_deref()
            .and_then(Quality::from_str_loose)
    }

    pub fn webtorrent_path(&self) -> &str {
        self.webtorrent_path.as_deref().unwrap_or("webtorrent")
    }
}

impl SettingsProvider for Config {
    fn upload_limit_kbps(&self) -> Option<u32> {
        self.upload_limit_kbps
    }

    fn download_limit_kbps(&self) -> Option<u32> {
        self.download_limit_kbps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.upload_limit_kbps.is_none());
        assert!(config.download_limit_kbps.is_none());
        assert_eq!(config.buffering_threshold(), DEFAULT_BUFFERING_THRESHOLD);
        assert_eq!(config.webtorrent_path(), "webtorrent");
    }

    #[test]
    fn test_save_and_load_from() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");
        let config = Config {
            upload_limit_kbps: Some(100),
            download_limit_kbps: Some(0),
            buffering_threshold: Some(3.5),
            preferred_quality: Some("1080p".to_string()),
            ..Default::default()
        };

        config.save_to(&path).expect("save");
        let loaded = Config::load_from(&path).expect("load");
        assert_eq!(loaded, config);
        assert_eq!(loaded.quality(), Some(Quality::FHD1080p));
        assert_eq!(loaded.buffering_threshold(), 3.5);
    }

    #[test]
    fn test_load_from_reports_bad_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "upload_limit_kbps = \"lots\"").expect("write");
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_settings_provider() {
        let config = Config {
            upload_limit_kbps: Some(10),
            download_limit_kbps: None,
            ..Default::default()
        };
        assert_eq!(SettingsProvider::upload_limit_kbps(&config), Some(10));
        assert_eq!(SettingsProvider::download_limit_kbps(&config), None);
    }

    #[test]
    fn test_download_dir_override() {
        let config = Config {
            download_dir: Some(PathBuf::from("/srv/media")),
            ..Default::default()
        };
        assert_eq!(config.downloads_dir(), PathBuf::from("/srv/media"));
        assert!(Config::default().downloads_dir().ends_with("downloads"));
    }
}
