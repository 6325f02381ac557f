//! Cache-aware access to imagery layers and elevation coverages.
//!
//! [`ContentManager`] lists what a tile container holds and attaches
//! remote OGC sources to it. The [`ImageLayer`] and [`ElevationCoverage`]
//! handles it returns serve tiles from the container and fill misses from
//! the remote service, writing fetched tiles back.
//!
//! ```ignore
//! let manager = ContentManager::open(&CacheConfig::from_env(), client).await?;
//! for layer in manager.list_image_layers(None).await? {
//!     if let TileResult::Tile(png) = layer.get_tile(TileCoord::new(3, 2, 5)).await {
//!         // ...
//!     }
//! }
//! ```

pub mod config;
pub mod descriptor;
pub mod elevation;
pub mod imagery;
pub mod manager;
pub mod stats;
pub mod seed;

pub use config::CacheConfig;
pub use descriptor::{CoverageDescriptor, LayerDescriptor};
pub use elevation::{ElevationCoverage, ElevationResult};
pub use imagery::{ImageLayer, TileResult};
pub use manager::ContentManager;
pub use stats::{CacheStats, CacheStatsSnapshot, ContentKind};
pub use seed::SeedReport;
