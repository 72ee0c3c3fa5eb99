//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::game::MatchSettings;
use crate::util::rate_limit::INPUT_RATE_LIMIT;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS, `None` allows any
    pub client_origin: Option<String>,

    /// Rows of every match board
    pub board_height: usize,
    /// Columns of every match board
    pub board_width: usize,

    /// Inbound websocket messages allowed per connection per second
    pub input_rate_limit: u32,
    /// Interval between websocket latency probes
    pub ping_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let config = Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").ok().filter(|s| !s.trim().is_empty()),

            board_height: parse_or("BOARD_HEIGHT", 5)?,
            board_width: parse_or("BOARD_WIDTH", 5)?,

            input_rate_limit: parse_or("INPUT_RATE_LIMIT", INPUT_RATE_LIMIT)?,
            ping_interval: Duration::from_secs(parse_or("PING_INTERVAL_SECS", 5)?),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.board_height < 2 {
            return Err(ConfigError::Invalid("BOARD_HEIGHT"));
        }
        if self.board_width < 2 {
            return Err(ConfigError::Invalid("BOARD_WIDTH"));
        }
        if self.input_rate_limit == 0 {
            return Err(ConfigError::Invalid("INPUT_RATE_LIMIT"));
        }
        if self.ping_interval.is_zero() {
            return Err(ConfigError::Invalid("PING_INTERVAL_SECS"));
        }
        Ok(())
    }

    /// Settings handed to every new match
    pub fn match_settings(&self) -> MatchSettings {
        MatchSettings {
            board_height: self.board_height,
            board_width: self.board_width,
        }
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
