//! Server configuration from the environment.

use inkshare_core::{FileStrokeLog, MemoryStrokeLog, StorageResult, StrokeLog};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Default listen address.
pub const DEFAULT_ADDR: &str = "0.0.0.0:3030";
/// Default capacity of each room's broadcast channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Server configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Address to listen on (`INKSHARE_ADDR`).
    pub addr: SocketAddr,
    /// Directory for room files (`INKSHARE_DATA_DIR`). Strokes are kept in
    /// memory when unset.
    pub data_dir: Option<PathBuf>,
    /// Capacity of each room's broadcast channels (`INKSHARE_CHANNEL_CAPACITY`).
    pub channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 3030)),
            data_dir: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through `lookup`, which maps variable names to values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(addr) = lookup("INKSHARE_ADDR") {
            config.addr = addr.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                name: "INKSHARE_ADDR",
                value: addr.clone(),
                reason: e.to_string(),
            })?;
        }

        config.data_dir = lookup("INKSHARE_DATA_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from);

        if let Some(capacity) = lookup("INKSHARE_CHANNEL_CAPACITY") {
            config.channel_capacity = match capacity.parse::<usize>() {
                Ok(0) => {
                    return Err(ConfigError::Invalid {
                        name: "INKSHARE_CHANNEL_CAPACITY",
                        value: capacity,
                        reason: "must be at least 1".to_string(),
                    });
                }
                Ok(n) => n,
                Err(e) => {
                    return Err(ConfigError::Invalid {
                        name: "INKSHARE_CHANNEL_CAPACITY",
                        value: capacity,
                        reason: e.to_string(),
                    });
                }
            };
        }

        Ok(config)
    }

    /// Open the configured stroke log.
    pub fn open_log(&self) -> StorageResult<Arc<dyn StrokeLog>> {
        match &self.data_dir {
            Some(dir) => Ok(Arc::new(FileStrokeLog::new(dir.clone())?)),
            None => Ok(Arc::new(MemoryStrokeLog::new())),
        }
    }
}
