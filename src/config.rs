use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::error::{ConfigError, Result};
use crate::monitoring::MonitorConfig;
use crate::remote::RestClientConfig;
use crate::service::NewsServiceConfig;
use crate::storage::{CacheConfig, QueueConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub backend: BackendConfig,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub queue: QueueSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub connectivity: ConnectivityConfig,
    #[serde(default)]
    pub monitoring: MonitoringSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,

    #[serde(default = "default_max_articles")]
    pub max_articles: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Defaults to the platform data directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    /// Defaults to the backend URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_url: Option<String>,

    #[serde(default = "default_probe_timeout")]
    pub timeout: u64,

    #[serde(default)]
    pub force_offline: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringSettings {
    #[serde(default = "default_max_events")]
    pub max_events: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub log_to_file: bool,

    #[serde(default = "default_log_file")]
    pub log_file: String,

    #[serde(default)]
    pub json_format: bool,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .map_err(|_| ConfigError::NotFound(path.as_ref().display().to_string()))?;

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file, then apply `.env` and process environment overrides
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .map_err(|_| ConfigError::NotFound(path.as_ref().display().to_string()))?;

        let mut config: Config = toml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a file
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.backend.url)
            .map_err(|_| ConfigError::InvalidUrl(self.backend.url.clone()))?;

        if let Some(probe_url) = &self.connectivity.probe_url {
            url::Url::parse(probe_url)
                .map_err(|_| ConfigError::InvalidUrl(probe_url.clone()))?;
        }

        if self.backend.timeout == 0 {
            return Err(ConfigError::Invalid("Backend timeout must be greater than 0".to_string()));
        }

        if self.cache.max_age_hours == 0 {
            return Err(ConfigError::Invalid("Cache max age must be greater than 0".to_string()));
        }

        if self.cache.max_articles == 0 {
            return Err(ConfigError::Invalid("Max cached articles must be greater than 0".to_string()));
        }

        if self.queue.max_attempts == 0 {
            return Err(ConfigError::Invalid("Queue max attempts must be greater than 0".to_string()));
        }

        if self.monitoring.batch_size == 0 {
            return Err(ConfigError::Invalid("Monitoring batch size must be greater than 0".to_string()));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        dotenvy::dotenv().ok();

        if let Ok(url) = std::env::var("EDUSHORTS_BACKEND_URL") {
            self.backend.url = url;
        }

        if let Ok(key) = std::env::var("EDUSHORTS_API_KEY") {
            self.backend.api_key = key;
        }

        if let Ok(level) = std::env::var("EDUSHORTS_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(offline) = std::env::var("EDUSHORTS_OFFLINE") {
            self.connectivity.force_offline = matches!(
                offline.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes"
            );
        }
    }

    pub fn rest_client_config(&self) -> RestClientConfig {
        RestClientConfig {
            base_url: self.backend.url.clone(),
            api_key: self.backend.api_key.clone(),
            timeout: Duration::from_secs(self.backend.timeout),
            user_agent: self.backend.user_agent.clone(),
        }
    }

    pub fn service_config(&self) -> NewsServiceConfig {
        NewsServiceConfig {
            cache: CacheConfig {
                max_age: Duration::from_secs(self.cache.max_age_hours * 60 * 60),
                max_articles: self.cache.max_articles,
            },
            queue: QueueConfig {
                max_attempts: self.queue.max_attempts,
            },
            monitor: MonitorConfig {
                max_events: self.monitoring.max_events,
                batch_size: self.monitoring.batch_size,
            },
        }
    }

    pub fn probe_url(&self) -> String {
        self.connectivity
            .probe_url
            .clone()
            .unwrap_or_else(|| self.backend.url.clone())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.connectivity.timeout)
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.storage.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Self::default_data_dir(),
        }
    }

    pub fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            cache: CacheSettings::default(),
            queue: QueueSettings::default(),
            storage: StorageSettings::default(),
            connectivity: ConnectivityConfig::default(),
            monitoring: MonitoringSettings::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("edushorts-news"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    pub fn default_data_dir() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|dir| dir.join("edushorts-news"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine data directory".to_string()))
    }

    pub fn default_config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            api_key: String::new(),
            timeout: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_age_hours: default_max_age_hours(),
            max_articles: default_max_articles(),
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_url: None,
            timeout: default_probe_timeout(),
            force_offline: false,
        }
    }
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            max_events: default_max_events(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_to_file: false,
            log_file: default_log_file(),
            json_format: false,
        }
    }
}

fn default_backend_url() -> String { "http://localhost:54321".to_string() }
fn default_timeout() -> u64 { 30 }
fn default_user_agent() -> String {
    format!("edushorts-news/{}", env!("CARGO_PKG_VERSION"))
}
fn default_max_age_hours() -> u64 { 24 }
fn default_max_articles() -> usize { 100 }
fn default_max_attempts() -> u32 { 5 }
fn default_probe_timeout() -> u64 { 5 }
fn default_max_events() -> usize { 100 }
fn default_batch_size() -> usize { 20 }
fn default_log_level() -> String { "warn".to_string() }
fn default_log_file() -> String { "logs/edushorts-news.log".to_string() }
