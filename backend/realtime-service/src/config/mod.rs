use crate::error::AppError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub auth: AuthConfig,
    pub database: DatabaseConfig,
    pub presence: PresenceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Seconds between liveness sweeps
    pub sweep_interval_secs: u64,
    /// Idle seconds before an entry becomes an eviction candidate
    pub stale_after_secs: u64,
    /// Seconds between server-side WebSocket pings
    pub heartbeat_interval_secs: u64,
    /// Seconds of heartbeat silence before the transport drops a session
    pub client_timeout_secs: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
            stale_after_secs: 120,
            heartbeat_interval_secs: 5,
            client_timeout_secs: 30,
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::Config(format!("invalid value for {}", key))),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        Ok(Config {
            app: AppConfig {
                env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                port: env_parsed("APP_PORT", 8000)?,
            },
            auth: AuthConfig {
                jwt_secret: std::env::var("JWT_SECRET")
                    .map_err(|_| AppError::Config("JWT_SECRET is required".to_string()))?,
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .map_err(|_| AppError::Config("DATABASE_URL is required".to_string()))?,
                max_connections: env_parsed("DATABASE_MAX_CONNECTIONS", 10)?,
            },
            presence: PresenceConfig {
                sweep_interval_secs: env_parsed("SWEEP_INTERVAL_SECS", 60)?,
                stale_after_secs: env_parsed("STALE_AFTER_SECS", 120)?,
                heartbeat_interval_secs: env_parsed("HEARTBEAT_INTERVAL_SECS", 5)?,
                client_timeout_secs: env_parsed("CLIENT_TIMEOUT_SECS", 30)?,
            },
        })
    }
}
