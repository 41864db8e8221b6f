use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::connection_session::{ConnectionCredentials, DEFAULT_DATABASE_PORT};

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config directory is unavailable for this platform")]
    ConfigDirUnavailable,
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConnectionDefaults {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub database: String,
}

impl Default for ConnectionDefaults {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_DATABASE_PORT,
            user: String::new(),
            database: String::new(),
        }
    }
}

impl ConnectionDefaults {
    #[must_use]
    pub fn credentials(&self) -> ConnectionCredentials {
        let mut credentials =
            ConnectionCredentials::new(&self.host, &self.user, String::new(), &self.database);
        credentials.port = self.port;
        credentials
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    pub api_url: String,
    pub download_dir: PathBuf,
    pub log_file: PathBuf,
    pub log_level: String,
    pub chart_name: Option<String>,
    pub connection: ConnectionDefaults,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            download_dir: PathBuf::from("."),
            log_file: PathBuf::from("nlq.log"),
            log_level: "info".to_string(),
            chart_name: None,
            connection: ConnectionDefaults::default(),
        }
    }
}

impl ClientConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from_path(default_config_path()?)?;
        config.apply_env_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    pub fn load_from_path(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        toml::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })
    }

    /// Environment wins over the file. `NLQ_API_URL` is checked before the
    /// shorter `API_URL`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(api_url) = lookup("NLQ_API_URL").or_else(|| lookup("API_URL")) {
            self.api_url = api_url;
        }
        if let Some(download_dir) = lookup("NLQ_DOWNLOAD_DIR") {
            self.download_dir = PathBuf::from(download_dir);
        }
        if let Some(log_file) = lookup("NLQ_LOG_FILE") {
            self.log_file = PathBuf::from(log_file);
        }
        if let Some(log_level) = lookup("RUST_LOG") {
            self.log_level = log_level;
        }
    }

    #[must_use]
    pub fn api_base(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }

    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.log_file
    }
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let base_dir = if let Some(custom) = env::var_os("NLQ_CONFIG_DIR") {
        PathBuf::from(custom)
    } else if cfg!(target_os = "windows") {
        env::var_os("APPDATA")
            .map(PathBuf::from)
            .ok_or(ConfigError::ConfigDirUnavailable)?
    } else if let Some(xdg_config_home) = env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config_home)
    } else {
        let home = env::var_os("HOME").ok_or(ConfigError::ConfigDirUnavailable)?;
        PathBuf::from(home).join(".config")
    };

    Ok(base_dir.join("nlq").join("config.toml"))
}
