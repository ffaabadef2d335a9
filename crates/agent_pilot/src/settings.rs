//! Process-level pilot settings.
//!
//! These cover the boundary endpoints and loop cadence, resolved from a
//! `config.toml` next to the process when present, with environment-variable
//! fallback per key. Per-agent goal state is NOT here: that lives in the
//! external config store and is re-read every tick.

use agent_pilot_proto::Position;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::backoff::BackoffPolicy;

pub const ENV_WORLD_BASE_URL: &str = "AGENT_PILOT_WORLD_URL";
pub const ENV_STORE_BASE_URL: &str = "AGENT_PILOT_STORE_URL";
pub const ENV_SIGNER_BASE_URL: &str = "AGENT_PILOT_SIGNER_URL";
pub const ENV_TICK_INTERVAL_MS: &str = "AGENT_PILOT_TICK_INTERVAL_MS";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "AGENT_PILOT_REQUEST_TIMEOUT_MS";

pub const DEFAULT_CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Fixed rally coordinate every flee response moves toward.
pub const SAFE_RALLY_POINT: Position = Position { x: 0.0, y: 0.0 };

#[derive(Debug, Clone, PartialEq)]
pub struct PilotSettings {
    pub world_base_url: String,
    pub store_base_url: String,
    pub signer_base_url: String,
    pub tick_interval: Duration,
    pub request_timeout: Duration,
    pub backoff: BackoffPolicy,
    pub rally_point: Position,
}

impl PilotSettings {
    /// Resolve settings from `config.toml` when present, else environment.
    pub fn from_default_sources() -> Result<Self, SettingsError> {
        let config_path = Path::new(DEFAULT_CONFIG_FILE_NAME);
        if config_path.exists() {
            return Self::from_config_file(config_path);
        }
        Self::from_env()
    }

    pub fn from_config_file(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|err| SettingsError::ReadConfigFile {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        let value: toml::Value =
            toml::from_str(&content).map_err(|err| SettingsError::ParseConfigFile {
                path: path.display().to_string(),
                message: err.to_string(),
            })?;
        let table = value.as_table().ok_or_else(|| SettingsError::ParseConfigFile {
            path: path.display().to_string(),
            message: "root is not a TOML table".to_string(),
        })?;

        Self::from_env_with(|key| {
            table
                .get(key)
                .and_then(toml_value_to_string)
                .or_else(|| std::env::var(key).ok())
        })
    }

    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    fn from_env_with<F>(mut getter: F) -> Result<Self, SettingsError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let world_base_url = required(&mut getter, ENV_WORLD_BASE_URL)?;
        let store_base_url = required(&mut getter, ENV_STORE_BASE_URL)?;
        // The signer often shares the store service; default to it.
        let signer_base_url = getter(ENV_SIGNER_BASE_URL)
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| store_base_url.clone());
        let tick_interval_ms =
            optional_u64(&mut getter, ENV_TICK_INTERVAL_MS, DEFAULT_TICK_INTERVAL_MS)?;
        let request_timeout_ms = optional_u64(
            &mut getter,
            ENV_REQUEST_TIMEOUT_MS,
            DEFAULT_REQUEST_TIMEOUT_MS,
        )?;

        Ok(Self {
            world_base_url,
            store_base_url,
            signer_base_url,
            tick_interval: Duration::from_millis(tick_interval_ms.max(1)),
            request_timeout: Duration::from_millis(request_timeout_ms.max(1)),
            backoff: BackoffPolicy::default(),
            rally_point: SAFE_RALLY_POINT,
        })
    }
}

fn required<F>(getter: &mut F, key: &'static str) -> Result<String, SettingsError>
where
    F: FnMut(&str) -> Option<String>,
{
    let value = getter(key).ok_or(SettingsError::MissingKey { key })?;
    if value.trim().is_empty() {
        return Err(SettingsError::EmptyKey { key });
    }
    Ok(value)
}

fn optional_u64<F>(getter: &mut F, key: &'static str, default: u64) -> Result<u64, SettingsError>
where
    F: FnMut(&str) -> Option<String>,
{
    match getter(key) {
        Some(value) => value
            .parse::<u64>()
            .map_err(|_| SettingsError::InvalidNumber { key, value }),
        None => Ok(default),
    }
}

fn toml_value_to_string(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(value) => Some(value.clone()),
        toml::Value::Integer(value) => Some(value.to_string()),
        toml::Value::Float(value) => Some(value.to_string()),
        toml::Value::Boolean(value) => Some(value.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    MissingKey { key: &'static str },
    EmptyKey { key: &'static str },
    InvalidNumber { key: &'static str, value: String },
    ReadConfigFile { path: String, message: String },
    ParseConfigFile { path: String, message: String },
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::MissingKey { key } => write!(f, "missing settings key: {key}"),
            SettingsError::EmptyKey { key } => write!(f, "empty settings key: {key}"),
            SettingsError::InvalidNumber { key, value } => {
                write!(f, "invalid number for {key}: {value}")
            }
            SettingsError::ReadConfigFile { path, message } => {
                write!(f, "read config file failed ({path}): {message}")
            }
            SettingsError::ParseConfigFile { path, message } => {
                write!(f, "parse config file failed ({path}): {message}")
            }
        }
    }
}

impl Error for SettingsError {}
