//! Configuration for the content manager.

use geopackage::ContainerConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the cache lives and how it is accessed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Container file path.
    pub path: PathBuf,

    /// Open the container without a writer. Fetched tiles are served but not stored.
    pub read_only: bool,

    /// Tile size for pyramids negotiated from WMS and WCS services.
    pub tile_size: u32,

    /// Tiles fetched at once while seeding.
    pub seed_concurrency: usize,

    pub container: ContainerConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("cache.gpkg"),
            read_only: false,
            tile_size: 256,
            seed_concurrency: 8,
            container: ContainerConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self {
            container: ContainerConfig::from_env(),
            ..Self::default()
        };

        if let Ok(val) = std::env::var("CACHE_PATH") {
            if !val.is_empty() {
                config.path = PathBuf::from(val);
            }
        }

        if let Ok(val) = std::env::var("CACHE_READ_ONLY") {
            config.read_only = matches!(val.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        if let Ok(val) = std::env::var("CACHE_TILE_SIZE") {
            if let Ok(size) = val.parse() {
                config.tile_size = size;
            }
        }

        if let Ok(val) = std::env::var("CACHE_SEED_CONCURRENCY") {
            if let Ok(count) = val.parse() {
                config.seed_concurrency = count;
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.path.as_os_str().is_empty() {
            return Err("path must not be empty".to_string());
        }

        if !(16..=4096).contains(&self.tile_size) {
            return Err(format!(
                "tile_size must be between 16 and 4096, got {}",
                self.tile_size
            ));
        }

        if self.seed_concurrency == 0 {
            return Err("seed_concurrency must be > 0".to_string());
        }

        self.container.validate()
    }
}
