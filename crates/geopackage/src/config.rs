//! Configuration for opening a container.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a [`crate::GeoPackage`] connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Reader connections kept open in the pool.
    pub read_connections: u32,

    /// Number of (table, zoom) tile matrix rows cached in memory.
    pub tile_matrix_cache_size: usize,

    /// How long a connection waits on a locked database, in seconds.
    pub busy_timeout_secs: u64,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            read_connections: 4,
            tile_matrix_cache_size: 64,
            busy_timeout_secs: 5,
        }
    }
}

impl ContainerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("CACHE_READ_CONNECTIONS") {
            if let Ok(count) = val.parse() {
                config.read_connections = count;
            }
        }

        if let Ok(val) = std::env::var("CACHE_TILE_MATRIX_CACHE_SIZE") {
            if let Ok(size) = val.parse() {
                config.tile_matrix_cache_size = size;
            }
        }

        if let Ok(val) = std::env::var("CACHE_BUSY_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                config.busy_timeout_secs = secs;
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.read_connections == 0 {
            return Err("read_connections must be > 0".to_string());
        }

        if self.tile_matrix_cache_size == 0 {
            return Err("tile_matrix_cache_size must be > 0".to_string());
        }

        Ok(())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_secs(self.busy_timeout_secs)
    }
}
