//! Application configuration management

pub mod settings;

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::api::models::DEFAULT_BASE_URL;
use crate::api::ApiConfig;
use crate::application::AudioFormat;
use crate::domain::AppError;

pub use settings::{JsonSettingsStore, MemorySettingsStore, SettingsStore};

/// Overrides the location of `config.json`.
pub const CONFIG_PATH_ENV: &str = "MIXCLOUD_DL_CONFIG";

const SETTINGS_FILE: &str = "settings.json";

/// Main application configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiSettings,
    pub download: DownloadSettings,
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_pages: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    pub directory: Option<PathBuf>,
    pub audio_format: AudioFormat,
    pub ytdlp_path: PathBuf,
    pub ffmpeg_location: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiSettings::default(),
            download: DownloadSettings::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
            max_pages: 500,
        }
    }
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            directory: None,
            audio_format: AudioFormat::default(),
            ytdlp_path: PathBuf::from("yt-dlp"),
            ffmpeg_location: None,
        }
    }
}

impl ApiSettings {
    pub fn to_api_config(&self) -> ApiConfig {
        ApiConfig {
            base_url: self.base_url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            max_pages: self.max_pages,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self, AppError> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            tracing::info!("Created default configuration at: {:?}", path);
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read {:?}: {}", path, e)))?;
        let config: AppConfig = serde_json::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse {:?}: {}", path, e)))?;
        config.validate()?;

        tracing::info!("Loaded configuration from: {:?}", path);
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), AppError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Config(format!("Failed to create config directory {:?}: {}", parent, e))
            })?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)
            .map_err(|e| AppError::Config(format!("Failed to write {:?}: {}", path, e)))
    }

    /// `$MIXCLOUD_DL_CONFIG`, else `config.json` in the platform config directory.
    pub fn config_path() -> Result<PathBuf, AppError> {
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
            return Ok(PathBuf::from(path));
        }

        let dirs = ProjectDirs::from("nl", "mixcloud-bulk-downloader", "mixcloud-bulk-downloader")
            .ok_or_else(|| AppError::Config("Failed to get project directories".to_string()))?;
        Ok(dirs.config_dir().join("config.json"))
    }

    /// The key-value store sits next to the config file.
    pub fn settings_path(config_path: &Path) -> PathBuf {
        config_path.with_file_name(SETTINGS_FILE)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.api.base_url.trim().is_empty() {
            return Err(AppError::Config("api.base_url must not be empty".to_string()));
        }
        if self.api.timeout_secs == 0 {
            return Err(AppError::Config("api.timeout_secs must be positive".to_string()));
        }
        if self.api.max_pages == 0 {
            return Err(AppError::Config("api.max_pages must be positive".to_string()));
        }
        if self.download.ytdlp_path.as_os_str().is_empty() {
            return Err(AppError::Config("download.ytdlp_path must not be empty".to_string()));
        }
        Ok(())
    }
}
