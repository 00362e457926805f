//! Process configuration loaded from environment variables.
//!
//! | variable | default | meaning |
//! |----------|---------|---------|
//! | `BIND_ADDR` | `0.0.0.0:8080` | HTTP listen address |
//! | `JWT_SECRET` | `dev-secret` (with a warning) | HS256 signing secret |
//! | `STORAGE_BACKEND` | `memory` | `memory` or `postgres` |
//! | `DATABASE_URL` | | required when the backend is `postgres` |
//! | `DB_MAX_CONNECTIONS` | `10` | pool size |
//! | `LEDGER_WRITE_RETRIES` | `3` | retries after a serialization failure |
//! | `LOG_FORMAT` | `json` | `json` or `pretty` |

use std::net::SocketAddr;
use std::str::FromStr;

use thiserror::Error;

use backoffice_observability::LogFormat;

const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(StorageBackend::Memory),
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            other => Err(ConfigError::Invalid {
                var: "STORAGE_BACKEND",
                message: format!("unknown backend '{other}' (expected 'memory' or 'postgres')"),
            }),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is invalid: {message}")]
    Invalid { var: &'static str, message: String },

    #[error("{0} must be set")]
    Missing(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub storage: StorageBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub ledger_write_retries: u32,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            storage: StorageBackend::Memory,
            database_url: None,
            db_max_connections: 10,
            ledger_write_retries: 3,
            log_format: LogFormat::Json,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = parse_or(get("BIND_ADDR"), "BIND_ADDR", defaults.bind_addr)?;

        let jwt_secret = get("JWT_SECRET").unwrap_or(defaults.jwt_secret);

        let storage = match get("STORAGE_BACKEND") {
            Some(raw) => raw.parse()?,
            None => defaults.storage,
        };

        let database_url = get("DATABASE_URL");
        if storage == StorageBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let db_max_connections = parse_or(
            get("DB_MAX_CONNECTIONS"),
            "DB_MAX_CONNECTIONS",
            defaults.db_max_connections,
        )?;
        if db_max_connections == 0 {
            return Err(ConfigError::Invalid {
                var: "DB_MAX_CONNECTIONS",
                message: "must be at least 1".to_string(),
            });
        }

        let ledger_write_retries = parse_or(
            get("LEDGER_WRITE_RETRIES"),
            "LEDGER_WRITE_RETRIES",
            defaults.ledger_write_retries,
        )?;

        let log_format = match get("LOG_FORMAT") {
            Some(raw) => raw.parse().map_err(|e: backoffice_observability::UnknownLogFormat| {
                ConfigError::Invalid {
                    var: "LOG_FORMAT",
                    message: e.to_string(),
                }
            })?,
            None => defaults.log_format,
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            storage,
            database_url,
            db_max_connections,
            ledger_write_retries,
            log_format,
        })
    }

    /// Problems worth reporting once logging is up. Loading runs before the
    /// subscriber exists, so it cannot log them itself.
    pub fn warnings(&self) -> Vec<&'static str> {
        let mut warnings = Vec::new();
        if self.jwt_secret == DEV_JWT_SECRET {
            warnings.push("JWT_SECRET not set; using insecure dev default");
        }
        warnings
    }
}

fn parse_or<T>(raw: Option<String>, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}
