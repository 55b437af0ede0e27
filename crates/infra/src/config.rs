//! Process configuration, read once from the environment at startup.

use std::net::SocketAddr;

use chrono::Duration;
use thiserror::Error;

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEFAULT_SESSION_TTL_HOURS: i64 = 24 * 14;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Runtime configuration.
///
/// | variable                   | default        |
/// |----------------------------|----------------|
/// | `COURSEDESK_BIND`          | `0.0.0.0:8080` |
/// | `DATABASE_URL`             | unset (in-memory store) |
/// | `DATABASE_MAX_CONNECTIONS` | `5`            |
/// | `SESSION_TTL_HOURS`        | `336`          |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub session_ttl: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            session_ttl: Duration::hours(DEFAULT_SESSION_TTL_HOURS),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind = lookup("COURSEDESK_BIND")
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| invalid("COURSEDESK_BIND", e))?;

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(v) => v
                .parse::<u32>()
                .map_err(|e| invalid("DATABASE_MAX_CONNECTIONS", e))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let ttl_hours = match lookup("SESSION_TTL_HOURS") {
            Some(v) => v.parse::<i64>().map_err(|e| invalid("SESSION_TTL_HOURS", e))?,
            None => DEFAULT_SESSION_TTL_HOURS,
        };
        if ttl_hours <= 0 {
            return Err(invalid("SESSION_TTL_HOURS", "must be positive"));
        }

        Ok(Self {
            bind,
            database_url,
            max_connections,
            session_ttl: Duration::hours(ttl_hours),
        })
    }
}

fn invalid(key: &'static str, message: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        key,
        message: message.to_string(),
    }
}
