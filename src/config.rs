use crate::calc::policy::FivePointSettings;
use crate::db;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use tracing::warn;

pub const DEFAULT_LOG_FILTER: &str = "info";
pub const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 3000;

pub const SETTINGS_REMOTE_AVERAGES: &str = "remote.averages";
pub const SETTINGS_FIVE_POINT: &str = "calc.fivePoint";

/// Process-level configuration, read once at startup.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub log_filter: String,
    pub remote_averages: Option<RemoteAveragesConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAveragesConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_REMOTE_TIMEOUT_MS
}

/// Workspace override for the averaging endpoint. `enabled: false` turns the
/// remote path off even when the environment configures one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAveragesSetting {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let log_filter = lookup("GRADEBOOK_LOG")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        let timeout_ms = match lookup("GRADEBOOK_AVERAGES_TIMEOUT_MS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|v| *v > 0)
                .ok_or_else(|| ConfigError::InvalidTimeout(raw.clone()))?,
            None => DEFAULT_REMOTE_TIMEOUT_MS,
        };

        let remote_averages = match lookup("GRADEBOOK_AVERAGES_URL") {
            Some(raw) if !raw.trim().is_empty() => {
                let base_url = raw.trim().to_string();
                if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
                    return Err(ConfigError::InvalidUrl(base_url));
                }
                Some(RemoteAveragesConfig { base_url, timeout_ms })
            }
            _ => None,
        };

        Ok(Self {
            log_filter,
            remote_averages,
        })
    }
}

/// Averaging endpoint in effect for a workspace: the workspace setting when
/// present, the environment otherwise.
pub fn effective_remote(app: &AppConfig, conn: Option<&Connection>) -> Option<RemoteAveragesConfig> {
    let setting = conn.and_then(|c| match db::settings_get_json(c, SETTINGS_REMOTE_AVERAGES) {
        Ok(Some(v)) => match serde_json::from_value::<RemoteAveragesSetting>(v) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(error = %e, "ignoring malformed {} setting", SETTINGS_REMOTE_AVERAGES);
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            warn!(error = %e, "failed to read {} setting", SETTINGS_REMOTE_AVERAGES);
            None
        }
    });

    let Some(setting) = setting else {
        return app.remote_averages.clone();
    };
    if !setting.enabled {
        return None;
    }
    let base_url = setting
        .base_url
        .filter(|u| !u.trim().is_empty())
        .or_else(|| app.remote_averages.as_ref().map(|r| r.base_url.clone()))?;
    let timeout_ms = setting
        .timeout_ms
        .or_else(|| app.remote_averages.as_ref().map(|r| r.timeout_ms))
        .unwrap_or(DEFAULT_REMOTE_TIMEOUT_MS);
    Some(RemoteAveragesConfig { base_url, timeout_ms })
}

pub fn five_point_settings(conn: &Connection) -> anyhow::Result<FivePointSettings> {
    match db::settings_get_json(conn, SETTINGS_FIVE_POINT)? {
        Some(v) => Ok(serde_json::from_value(v)?),
        None => Ok(FivePointSettings::default()),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidTimeout(String),
    InvalidUrl(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidTimeout(v) => write!(
                f,
                "GRADEBOOK_AVERAGES_TIMEOUT_MS must be a positive integer, got '{}'",
                v
            ),
            ConfigError::InvalidUrl(v) => write!(
                f,
                "GRADEBOOK_AVERAGES_URL must start with http:// or https://, got '{}'",
                v
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
