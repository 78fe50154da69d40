//! Configuration loading: defaults, optional `opsgate.toml` patch,
//! `OPSGATE_*` environment overrides, then validation.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub url: String,
    pub database: String,
    pub username: String,
    pub password: SecretString,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub max_in_flight: u32,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub backend_url: Option<String>,
    pub backend_database: Option<String>,
    pub backend_username: Option<String>,
    pub backend_password: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig {
                url: "http://localhost:8069".to_string(),
                database: "erp".to_string(),
                username: String::new(),
                password: String::new().into(),
                timeout_secs: 30,
                max_retries: 2,
                max_in_flight: 4,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    backend: Option<BackendPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct BackendPatch {
    url: Option<String>,
    database: Option<String>,
    username: Option<String>,
    password: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    max_in_flight: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("opsgate.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(backend) = patch.backend {
            if let Some(url) = backend.url {
                self.backend.url = url;
            }
            if let Some(database) = backend.database {
                self.backend.database = database;
            }
            if let Some(username) = backend.username {
                self.backend.username = username;
            }
            if let Some(password_value) = backend.password {
                self.backend.password = password_value.into();
            }
            if let Some(timeout_secs) = backend.timeout_secs {
                self.backend.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = backend.max_retries {
                self.backend.max_retries = max_retries;
            }
            if let Some(max_in_flight) = backend.max_in_flight {
                self.backend.max_in_flight = max_in_flight;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(url) = env::var("OPSGATE_BACKEND_URL") {
            self.backend.url = url;
        }
        if let Ok(database) = env::var("OPSGATE_BACKEND_DATABASE") {
            self.backend.database = database;
        }
        if let Ok(username) = env::var("OPSGATE_BACKEND_USERNAME") {
            self.backend.username = username;
        }
        if let Ok(password_value) = env::var("OPSGATE_BACKEND_PASSWORD") {
            self.backend.password = password_value.into();
        }
        if let Ok(raw) = env::var("OPSGATE_BACKEND_TIMEOUT_SECS") {
            self.backend.timeout_secs = raw.parse().map_err(|_| {
                ConfigError::InvalidEnvOverride {
                    key: "OPSGATE_BACKEND_TIMEOUT_SECS".to_string(),
                    value: raw.clone(),
                }
            })?;
        }
        if let Ok(raw) = env::var("OPSGATE_BACKEND_MAX_RETRIES") {
            self.backend.max_retries = raw.parse().map_err(|_| {
                ConfigError::InvalidEnvOverride {
                    key: "OPSGATE_BACKEND_MAX_RETRIES".to_string(),
                    value: raw.clone(),
                }
            })?;
        }
        if let Ok(level) = env::var("OPSGATE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(raw) = env::var("OPSGATE_LOG_FORMAT") {
            self.logging.format = raw.parse()?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(url) = overrides.backend_url {
            self.backend.url = url;
        }
        if let Some(database) = overrides.backend_database {
            self.backend.database = database;
        }
        if let Some(username) = overrides.backend_username {
            self.backend.username = username;
        }
        if let Some(password_value) = overrides.backend_password {
            self.backend.password = password_value.into();
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.url.trim().is_empty() {
            return Err(ConfigError::Validation("backend.url must not be empty".to_string()));
        }
        if !self.backend.url.starts_with("http://") && !self.backend.url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "backend.url must be an http(s) URL, got `{}`",
                self.backend.url
            )));
        }
        if self.backend.database.trim().is_empty() {
            return Err(ConfigError::Validation(
                "backend.database must not be empty".to_string(),
            ));
        }
        if self.backend.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "backend.timeout_secs must be positive; unbounded calls are not permitted"
                    .to_string(),
            ));
        }
        if self.backend.max_in_flight == 0 {
            return Err(ConfigError::Validation(
                "backend.max_in_flight must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }
    let default = PathBuf::from("opsgate.toml");
    default.exists().then_some(default)
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}
