//! Common types shared across the tile cache crates.
//!
//! Tile pyramids ([`LevelSet`]), tile addresses, geographic sectors, CRS
//! codes and the shared [`CacheError`].

pub mod bbox;
pub mod crs;
pub mod error;
pub mod format;
pub mod level;
pub mod service;
pub mod tile;

pub use bbox::{BboxParseError, BoundingBox};
pub use crs::{AxisOrder, CrsCode, CrsParseError};
pub use error::{CacheError, CacheResult};
pub use format::ImageFormat;
pub use level::{num_levels_for_resolution, Level, LevelSet, TileDelta};
pub use service::{ServiceType, WebServiceBinding};
pub use tile::{container_row, TileCoord};

/// Absolute tolerance, in degrees, for comparing stored and requested pyramids.
pub const COMPAT_TOLERANCE: f64 = 1e-6;

/// Meters per degree of latitude on the WGS84 equatorial radius.
pub const METERS_PER_DEGREE: f64 = 111_319.490_793_273_57;

/// Standardized rendering pixel size in meters used by OGC scale denominators.
pub const STANDARD_PIXEL_SIZE: f64 = 0.00028;
