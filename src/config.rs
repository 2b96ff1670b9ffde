// ⚙️ Configuration - allowance and host settings from the environment

use crate::error::ensure_positive_amount;
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_ALLOWANCE_TOTAL: f64 = 50.0;
pub const DEFAULT_DB_PATH: &str = "mica_minca.db";
pub const DEFAULT_SESSION: &str = "default";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5002;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Allowance per period; changing it never rescales stored history
    pub allowance_total: f64,
    pub db_path: PathBuf,
    pub session: String,
    pub host: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            allowance_total: DEFAULT_ALLOWANCE_TOTAL,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            session: DEFAULT_SESSION.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Config {
    /// Read `MICA_*` variables; every one is optional
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` but with an injectable variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let allowance_total = match lookup("MICA_ALLOWANCE_TOTAL") {
            Some(raw) => parse_allowance_total(&raw)?,
            None => defaults.allowance_total,
        };

        let db_path = lookup("MICA_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let session = lookup("MICA_SESSION")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.session);

        let host = lookup("MICA_HOST").unwrap_or(defaults.host);

        let port = match lookup("MICA_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| ConfigError::InvalidValue("MICA_PORT".to_string(), format!("{}", e)))?,
            None => defaults.port,
        };

        Ok(Config {
            allowance_total,
            db_path,
            session,
            host,
            port,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_allowance_total(raw: &str) -> Result<f64, ConfigError> {
    let total = raw.trim().parse::<f64>().map_err(|e| {
        ConfigError::InvalidValue("MICA_ALLOWANCE_TOTAL".to_string(), format!("{}", e))
    })?;

    ensure_positive_amount(total).map_err(|_| {
        ConfigError::InvalidValue(
            "MICA_ALLOWANCE_TOTAL".to_string(),
            format!("must be a positive whole-cent amount, got {}", raw.trim()),
        )
    })
}
