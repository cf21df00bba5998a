use anyhow::{anyhow, Result};
use configparser::ini::Ini;
use log::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::ad_data_manager::AdDataManager;
use crate::insight_engine::InsightThresholds;
use crate::platform::Platform;

pub const DEFAULT_CONFIG_FILE: &str = "dashboard.ini";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    pub data: DataConfig,
    pub insights: InsightThresholds,
    pub cache: CacheConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DataConfig {
    pub data_dir: String,
    pub facebook_pattern: String,
    pub google_pattern: String,
    pub tiktok_pattern: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ExportConfig {
    /// Empty means no export unless requested on the command line.
    pub export_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            data: DataConfig {
                data_dir: String::from("data"),
                facebook_pattern: String::from("*facebook*.csv"),
                google_pattern: String::from("*google*.csv"),
                tiktok_pattern: String::from("*tiktok*.csv"),
            },
            insights: InsightThresholds::default(),
            cache: CacheConfig { ttl_seconds: 600 },
            export: ExportConfig {
                export_dir: String::new(),
            },
        }
    }
}

impl AppConfig {
    pub fn thresholds(&self) -> InsightThresholds {
        self.insights
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_seconds)
    }

    pub fn export_dir(&self) -> Option<PathBuf> {
        let dir = self.export.export_dir.trim();
        if dir.is_empty() {
            None
        } else {
            Some(PathBuf::from(dir))
        }
    }

    /// Flat-file source for the configured directory and patterns.
    /// A relative `data_dir` resolves against `base_dir`.
    pub fn data_source(&self, base_dir: &Path) -> AdDataManager {
        let dir = PathBuf::from(self.data.data_dir.trim());
        let dir = if dir.is_absolute() { dir } else { base_dir.join(dir) };
        AdDataManager::new(dir)
            .with_pattern(Platform::Facebook, self.data.facebook_pattern.trim())
            .with_pattern(Platform::Google, self.data.google_pattern.trim())
            .with_pattern(Platform::TikTok, self.data.tiktok_pattern.trim())
    }
}

fn parse_or_keep<T: FromStr + std::fmt::Display>(ini: &Ini, section: &str, key: &str, target: &mut T) {
    if let Some(raw) = ini.get(section, key) {
        match raw.trim().parse::<T>() {
            Ok(value) => *target = value,
            Err(_) => warn!("[{}] {} = '{}' is not valid, keeping {}", section, key, raw, target),
        }
    }
}

pub struct ConfigManager {
    config_path: PathBuf,
    pub config: AppConfig,
}

impl ConfigManager {
    /// Loads `config_path`, writing a default file first if it does not exist.
    pub fn new(config_path: impl Into<PathBuf>) -> Result<Self> {
        let config_path = config_path.into();
        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .map_err(|e| anyhow!("Failed to create config directory: {}", e))?;
            }
        }

        let mut manager = ConfigManager {
            config_path,
            config: AppConfig::default(),
        };

        if manager.config_path.exists() {
            manager.load()?;
        } else {
            manager.create_default()?;
            manager.save()?;
        }

        Ok(manager)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn base_dir(&self) -> PathBuf {
        self.config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn load(&mut self) -> Result<()> {
        let config_str = fs::read_to_string(&self.config_path)
            .map_err(|e| anyhow!("Failed to read {}: {}", self.config_path.display(), e))?;
        let mut config_ini = Ini::new();
        config_ini
            .read(config_str)
            .map_err(|e| anyhow!("Failed to parse config: {}", e))?;

        let mut app_config = AppConfig::default();

        if let Some(data_dir) = config_ini.get("data", "data_dir") {
            app_config.data.data_dir = data_dir;
        }
        if let Some(pattern) = config_ini.get("data", "facebook_pattern") {
            app_config.data.facebook_pattern = pattern;
        }
        if let Some(pattern) = config_ini.get("data", "google_pattern") {
            app_config.data.google_pattern = pattern;
        }
        if let Some(pattern) = config_ini.get("data", "tiktok_pattern") {
            app_config.data.tiktok_pattern = pattern;
        }

        parse_or_keep(&config_ini, "insights", "share_underdelivery_ratio", &mut app_config.insights.share_underdelivery_ratio);
        parse_or_keep(&config_ini, "insights", "share_overdelivery_ratio", &mut app_config.insights.share_overdelivery_ratio);
        parse_or_keep(&config_ini, "insights", "wow_swing_threshold", &mut app_config.insights.wow_swing_threshold);
        parse_or_keep(&config_ini, "cache", "ttl_seconds", &mut app_config.cache.ttl_seconds);

        if let Some(export_dir) = config_ini.get("export", "export_dir") {
            app_config.export.export_dir = export_dir;
        }

        self.config = app_config;
        self.validate()?;
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let mut config_ini = Ini::new();
        let c = &self.config;

        config_ini.set("data", "data_dir", Some(c.data.data_dir.clone()));
        config_ini.set("data", "facebook_pattern", Some(c.data.facebook_pattern.clone()));
        config_ini.set("data", "google_pattern", Some(c.data.google_pattern.clone()));
        config_ini.set("data", "tiktok_pattern", Some(c.data.tiktok_pattern.clone()));

        config_ini.set("insights", "share_underdelivery_ratio", Some(c.insights.share_underdelivery_ratio.to_string()));
        config_ini.set("insights", "share_overdelivery_ratio", Some(c.insights.share_overdelivery_ratio.to_string()));
        config_ini.set("insights", "wow_swing_threshold", Some(c.insights.wow_swing_threshold.to_string()));

        config_ini.set("cache", "ttl_seconds", Some(c.cache.ttl_seconds.to_string()));

        config_ini.set("export", "export_dir", Some(c.export.export_dir.clone()));

        config_ini
            .write(&self.config_path)
            .map_err(|e| anyhow!("Failed to write config to file: {}", e))?;
        Ok(())
    }

    pub fn create_default(&mut self) -> Result<()> {
        self.config = AppConfig::default();
        info!(
            "Created {} with defaults; set data_dir to the folder holding the platform exports.",
            self.config_path.display()
        );
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.config.insights;
        if !(t.share_underdelivery_ratio >= 0.0 && t.share_underdelivery_ratio < t.share_overdelivery_ratio) {
            return Err(anyhow!(
                "share_underdelivery_ratio ({}) must be non-negative and below share_overdelivery_ratio ({})",
                t.share_underdelivery_ratio,
                t.share_overdelivery_ratio
            ));
        }
        if !(t.wow_swing_threshold >= 0.0) {
            return Err(anyhow!("wow_swing_threshold must be non-negative, got {}", t.wow_swing_threshold));
        }
        if self.config.cache.ttl_seconds == 0 {
            return Err(anyhow!("cache ttl_seconds must be greater than zero"));
        }
        if self.config.data.data_dir.trim().is_empty() {
            warn!("{}: data_dir is empty, reading from the config directory", self.config_path.display());
        }
        Ok(())
    }
}
