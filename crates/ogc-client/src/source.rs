//! Remote layers and coverages ready to be fetched tile by tile.

use std::fmt::Debug;
use std::sync::Arc;
use tile_common::{
    BoundingBox, CacheError, CacheResult, ImageFormat, Level, LevelSet, TileCoord,
    WebServiceBinding,
};

/// Builds the request URL for one imagery tile.
pub trait TileUrlSource: Send + Sync + Debug {
    /// URL of the tile at `coord`, which lies on `level`.
    fn tile_url(&self, level: &Level, coord: TileCoord) -> CacheResult<String>;
}

/// Builds a GetCoverage URL for a sector sampled at a pixel size.
pub trait CoverageUrlSource: Send + Sync + Debug {
    fn coverage_url(&self, sector: &BoundingBox, width: u32, height: u32) -> CacheResult<String>;
}

/// A negotiated imagery layer from a WMS or WMTS service.
#[derive(Debug, Clone)]
pub struct RemoteImageLayer {
    /// Layer name, comma separated for multi-layer WMS requests
    pub name: String,
    pub title: Option<String>,
    pub level_set: LevelSet,
    /// Negotiated output format in the server's spelling
    pub format_mime: String,
    pub format: ImageFormat,
    pub source: Arc<dyn TileUrlSource>,
    /// Service binding to persist alongside the cached content
    pub binding: WebServiceBinding,
}

impl RemoteImageLayer {
    /// Request URL for a tile addressed in `level_set`.
    ///
    /// The level set may be the one stored in a container rather than the
    /// one derived from capabilities.
    pub fn tile_url(&self, level_set: &LevelSet, coord: TileCoord) -> CacheResult<String> {
        let level = level_set
            .level(coord.level)
            .filter(|level| level.contains(coord.row, coord.col))
            .ok_or_else(|| {
                CacheError::invalid_parameter(
                    "tile",
                    format!("{} is outside the pyramid of '{}'", coord, self.name),
                )
            })?;
        self.source.tile_url(level, coord)
    }
}

/// A negotiated elevation coverage from a WCS service.
#[derive(Debug, Clone)]
pub struct RemoteCoverage {
    pub name: String,
    pub title: Option<String>,
    pub level_set: LevelSet,
    pub format_mime: String,
    pub source: Arc<dyn CoverageUrlSource>,
    pub binding: WebServiceBinding,
}

impl RemoteCoverage {
    /// GetCoverage URL returning one tile of `level_set` at full tile size.
    pub fn tile_url(&self, level_set: &LevelSet, coord: TileCoord) -> CacheResult<String> {
        let sector = level_set.tile_sector(coord).ok_or_else(|| {
            CacheError::invalid_parameter(
                "tile",
                format!("{} is outside the pyramid of '{}'", coord, self.name),
            )
        })?;
        self.source
            .coverage_url(&sector, level_set.tile_width, level_set.tile_height)
    }
}
