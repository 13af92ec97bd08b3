use std::net::{AddrParseError, SocketAddr};
use thiserror::Error;

pub const ADDR_VAR: &str = "SKIRMISH_ADDR";
pub const CHANNEL_CAPACITY_VAR: &str = "SKIRMISH_CHANNEL_CAPACITY";
pub const MAX_MATCHES_VAR: &str = "SKIRMISH_MAX_MATCHES";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("SKIRMISH_ADDR={value:?} is not a socket address: {source}")]
    InvalidAddr {
        value: String,
        #[source]
        source: AddrParseError,
    },
    #[error("SKIRMISH_CHANNEL_CAPACITY={0:?} must be a positive integer")]
    InvalidCapacity(String),
    #[error("SKIRMISH_MAX_MATCHES={0:?} must be a positive integer")]
    InvalidMaxMatches(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// States a slow connection may fall behind before it resyncs
    pub channel_capacity: usize,
    /// Matches hosted at once; stale ones are retired to make room
    pub max_matches: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            channel_capacity: 32,
            max_matches: 1024,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` finds
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ServerConfig::default();

        if let Some(value) = lookup(ADDR_VAR) {
            config.bind_addr = value
                .parse()
                .map_err(|source| ConfigError::InvalidAddr { value, source })?;
        }

        if let Some(value) = lookup(CHANNEL_CAPACITY_VAR) {
            config.channel_capacity = match value.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Err(ConfigError::InvalidCapacity(value)),
            };
        }

        if let Some(value) = lookup(MAX_MATCHES_VAR) {
            config.max_matches = match value.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Err(ConfigError::InvalidMaxMatches(value)),
            };
        }

        Ok(config)
    }
}
