//! Configuration management for Picshare

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub collections: CollectionNames,
    pub feed: FeedConfig,
    pub posts: PostsConfig,
}

/// Where the local backend keeps its database and uploaded blobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub database_path: String,
    pub blob_dir: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            database_path: data_dir.join("picshare.db").to_string_lossy().to_string(),
            blob_dir: data_dir.join("blobs").to_string_lossy().to_string(),
        }
    }
}

/// `picshare` under the platform data directory, or `~/.local/share/picshare`
/// when the platform reports none
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| expand_path("~/.local/share"))
        .join("picshare")
}

/// Names of the document collections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionNames {
    pub users: String,
    pub posts: String,
    pub comments: String,
}

impl Default for CollectionNames {
    fn default() -> Self {
        Self {
            users: "users".to_string(),
            posts: "posts".to_string(),
            comments: "comments".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Trailing window of the fallback feed, in days
    pub window_days: i64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self { window_days: 7 }
    }
}

const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;

impl FeedConfig {
    /// Longest window accepted from a config file, about a hundred years
    pub const MAX_WINDOW_DAYS: i64 = 36_500;

    /// Window length in milliseconds, saturating at `i64::MAX`
    pub fn window_millis(&self) -> i64 {
        self.window_days.saturating_mul(DAY_MILLIS)
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.window_days <= 0 || self.window_days > Self::MAX_WINDOW_DAYS {
            return Err(ConfigError::InvalidValue {
                field: "feed.window_days".to_string(),
                reason: format!(
                    "must be between 1 and {}, got {}",
                    Self::MAX_WINDOW_DAYS,
                    self.window_days
                ),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PostsConfig {
    /// Words dropped from search terms (compared lowercase)
    pub filler_words: Vec<String>,
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing config file is not an error; defaults are used instead.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        if !config_path.exists() {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.feed.validate()?;
        Ok(config)
    }

    /// Configuration rooted in a single directory, used by tests and `--data-dir`
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            backend: BackendConfig {
                database_path: dir.join("picshare.db").to_string_lossy().to_string(),
                blob_dir: dir.join("blobs").to_string_lossy().to_string(),
            },
            ..Default::default()
        }
    }
}

/// Resolve the configuration file path, honouring `PICSHARE_CONFIG` before the XDG config dir
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("PICSHARE_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("picshare").join("config.toml"))
}

/// Expand `~` in a configured path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}
