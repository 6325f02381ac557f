//! Multi-resolution tile pyramids.
//!
//! A [`LevelSet`] is anchored at the north-west corner of its tile origin.
//! Level 0 tiles span `first_level_delta` degrees and each following level
//! halves the span on both axes.

use crate::{BoundingBox, CacheError, CacheResult, TileCoord};
use serde::{Deserialize, Serialize};

/// Slack used when deriving integral matrix dimensions from floating spans.
const SPAN_EPSILON: f64 = 1e-9;

/// Angular size of a tile in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileDelta {
    pub lat: f64,
    pub lon: f64,
}

impl TileDelta {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    fn halved(&self, times: u32) -> Self {
        let factor = 2f64.powi(times as i32);
        Self::new(self.lat / factor, self.lon / factor)
    }
}

/// One resolution level of a [`LevelSet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub level_number: u32,
    pub tile_delta: TileDelta,
    pub tile_width: u32,
    pub tile_height: u32,
    pub matrix_width: u32,
    pub matrix_height: u32,
    /// Sector the tile grid is anchored in
    pub origin: BoundingBox,
}

impl Level {
    /// Geographic sector of the tile at `row`/`col`, rows counted from north.
    pub fn tile_sector(&self, row: u32, col: u32) -> BoundingBox {
        let min_x = self.origin.min_x + col as f64 * self.tile_delta.lon;
        let max_y = self.origin.max_y - row as f64 * self.tile_delta.lat;
        BoundingBox::new(
            min_x,
            max_y - self.tile_delta.lat,
            min_x + self.tile_delta.lon,
            max_y,
        )
    }

    /// Degrees of longitude per pixel.
    pub fn pixel_x_size(&self) -> f64 {
        self.tile_delta.lon / self.tile_width as f64
    }

    /// Degrees of latitude per pixel.
    pub fn pixel_y_size(&self) -> f64 {
        self.tile_delta.lat / self.tile_height as f64
    }

    /// Whether `row`/`col` addresses a tile inside this level's matrix.
    pub fn contains(&self, row: u32, col: u32) -> bool {
        row < self.matrix_height && col < self.matrix_width
    }

    /// Inclusive row/column range of the tiles touching `sector`.
    ///
    /// Returns `(first_row, last_row, first_col, last_col)`, or `None` when
    /// the sector misses the tile grid.
    pub fn tile_range(&self, sector: &BoundingBox) -> Option<(u32, u32, u32, u32)> {
        let clipped = sector.intersection(&self.grid_extent())?;

        let first_col = ((clipped.min_x - self.origin.min_x) / self.tile_delta.lon).floor();
        let last_col = ((clipped.max_x - self.origin.min_x) / self.tile_delta.lon).ceil() - 1.0;
        let first_row = ((self.origin.max_y - clipped.max_y) / self.tile_delta.lat).floor();
        let last_row = ((self.origin.max_y - clipped.min_y) / self.tile_delta.lat).ceil() - 1.0;

        let clamp_col = |v: f64| v.max(0.0).min((self.matrix_width - 1) as f64) as u32;
        let clamp_row = |v: f64| v.max(0.0).min((self.matrix_height - 1) as f64) as u32;

        Some((
            clamp_row(first_row),
            clamp_row(last_row),
            clamp_col(first_col),
            clamp_col(last_col),
        ))
    }

    /// Extent actually covered by the matrix, which may overhang the origin.
    fn grid_extent(&self) -> BoundingBox {
        BoundingBox::new(
            self.origin.min_x,
            self.origin.max_y - self.matrix_height as f64 * self.tile_delta.lat,
            self.origin.min_x + self.matrix_width as f64 * self.tile_delta.lon,
            self.origin.max_y,
        )
    }
}

/// A tile pyramid over a geographic sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelSet {
    /// Sector with data
    pub sector: BoundingBox,
    /// Sector the tile grid is anchored in
    pub tile_origin: BoundingBox,
    /// Tile span at level 0
    pub first_level_delta: TileDelta,
    pub tile_width: u32,
    pub tile_height: u32,
    levels: Vec<Level>,
}

impl LevelSet {
    /// Build a level set and derive all of its levels.
    ///
    /// # Arguments
    /// * `sector` - Region with data, must be valid
    /// * `tile_origin` - Region the level 0 grid is anchored in
    /// * `first_level_delta` - Tile span at level 0 in degrees
    /// * `num_levels` - Number of levels, at least 1
    /// * `tile_width`, `tile_height` - Tile size in pixels
    pub fn new(
        sector: BoundingBox,
        tile_origin: BoundingBox,
        first_level_delta: TileDelta,
        num_levels: u32,
        tile_width: u32,
        tile_height: u32,
    ) -> CacheResult<Self> {
        if !sector.is_valid() {
            return Err(CacheError::validation(format!("invalid sector {}", sector)));
        }
        if !tile_origin.is_valid() {
            return Err(CacheError::validation(format!(
                "invalid tile origin {}",
                tile_origin
            )));
        }
        let delta_ok = |d: f64| d.is_finite() && d > 0.0;
        if !delta_ok(first_level_delta.lat) || !delta_ok(first_level_delta.lon) {
            return Err(CacheError::validation(format!(
                "invalid first level delta {:?}",
                first_level_delta
            )));
        }
        if num_levels == 0 {
            return Err(CacheError::validation("level set needs at least one level"));
        }
        if tile_width == 0 || tile_height == 0 {
            return Err(CacheError::validation(format!(
                "invalid tile size {}x{}",
                tile_width, tile_height
            )));
        }

        let levels = (0..num_levels)
            .map(|n| {
                let tile_delta = first_level_delta.halved(n);
                Level {
                    level_number: n,
                    tile_delta,
                    tile_width,
                    tile_height,
                    matrix_width: tile_count(tile_origin.width(), tile_delta.lon),
                    matrix_height: tile_count(tile_origin.height(), tile_delta.lat),
                    origin: tile_origin,
                }
            })
            .collect();

        Ok(Self {
            sector,
            tile_origin,
            first_level_delta,
            tile_width,
            tile_height,
            levels,
        })
    }

    /// Uniform pyramid starting from `matrix_width` x `matrix_height` tiles
    /// covering `tile_origin`, doubling on each level.
    pub fn from_tile_pyramid(
        tile_origin: BoundingBox,
        matrix_width: u32,
        matrix_height: u32,
        num_levels: u32,
        tile_width: u32,
        tile_height: u32,
    ) -> CacheResult<Self> {
        if matrix_width == 0 || matrix_height == 0 {
            return Err(CacheError::validation(format!(
                "invalid top level matrix {}x{}",
                matrix_width, matrix_height
            )));
        }
        let delta = TileDelta::new(
            tile_origin.height() / matrix_height as f64,
            tile_origin.width() / matrix_width as f64,
        );
        Self::new(
            tile_origin,
            tile_origin,
            delta,
            num_levels,
            tile_width,
            tile_height,
        )
    }

    /// Pyramid fitted to a coverage's declared grid.
    ///
    /// Level 0 uses square tiles one sector-height tall anchored at the
    /// sector, and enough levels are added to reach the finer of the grid's
    /// two cell sizes.
    pub fn from_coverage_description(
        sector: BoundingBox,
        grid_width: u32,
        grid_height: u32,
        tile_width: u32,
        tile_height: u32,
    ) -> CacheResult<Self> {
        if !sector.is_valid() {
            return Err(CacheError::validation(format!(
                "invalid coverage sector {}",
                sector
            )));
        }
        if grid_width == 0 || grid_height == 0 || tile_width == 0 || tile_height == 0 {
            return Err(CacheError::validation(format!(
                "invalid coverage grid {}x{} or tile size {}x{}",
                grid_width, grid_height, tile_width, tile_height
            )));
        }

        let span = sector.height();
        let delta = TileDelta::new(span, span);
        let resolution =
            (sector.height() / grid_height as f64).min(sector.width() / grid_width as f64);
        let num_levels = num_levels_for_resolution(span / tile_height as f64, resolution);

        Self::new(sector, sector, delta, num_levels, tile_width, tile_height)
    }

    pub fn num_levels(&self) -> u32 {
        self.levels.len() as u32
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn level(&self, level_number: u32) -> Option<&Level> {
        self.levels.get(level_number as usize)
    }

    pub fn first_level(&self) -> &Level {
        &self.levels[0]
    }

    pub fn last_level(&self) -> &Level {
        &self.levels[self.levels.len() - 1]
    }

    /// Coarsest level whose pixels are at least as fine as `resolution`
    /// degrees, or the last level when none is.
    pub fn level_for_resolution(&self, resolution: f64) -> &Level {
        self.levels
            .iter()
            .find(|level| level.pixel_y_size() <= resolution)
            .unwrap_or_else(|| self.last_level())
    }

    /// Sector of a tile, or `None` for an address outside the pyramid.
    pub fn tile_sector(&self, coord: TileCoord) -> Option<BoundingBox> {
        let level = self.level(coord.level)?;
        level
            .contains(coord.row, coord.col)
            .then(|| level.tile_sector(coord.row, coord.col))
    }

    /// Tiles of one level that intersect both `sector` and the data sector.
    pub fn tiles_in_sector(&self, sector: &BoundingBox, level_number: u32) -> Vec<TileCoord> {
        let Some((first_row, last_row, first_col, last_col)) = self.tile_span(sector, level_number)
        else {
            return Vec::new();
        };

        let count = tile_span_count(first_row, last_row, first_col, last_col);
        let mut tiles = Vec::with_capacity(count.min(MAX_PREALLOCATED_TILES) as usize);
        for row in first_row..=last_row {
            for col in first_col..=last_col {
                tiles.push(TileCoord::new(level_number, row, col));
            }
        }
        tiles
    }

    /// Number of tiles [`tiles_in_sector`](Self::tiles_in_sector) would return.
    pub fn tile_count_in_sector(&self, sector: &BoundingBox, level_number: u32) -> u64 {
        self.tile_span(sector, level_number)
            .map(|(first_row, last_row, first_col, last_col)| {
                tile_span_count(first_row, last_row, first_col, last_col)
            })
            .unwrap_or(0)
    }

    fn tile_span(&self, sector: &BoundingBox, level_number: u32) -> Option<(u32, u32, u32, u32)> {
        let level = self.level(level_number)?;
        let clipped = sector.intersection(&self.sector)?;
        level.tile_range(&clipped)
    }

    /// Same pyramid restricted to fewer levels.
    pub fn truncated(&self, num_levels: u32) -> CacheResult<Self> {
        Self::new(
            self.sector,
            self.tile_origin,
            self.first_level_delta,
            num_levels.min(self.num_levels()),
            self.tile_width,
            self.tile_height,
        )
    }
}

/// Number of levels needed for the last level's pixel size to reach
/// `resolution`, starting from `first_level_resolution` at level 0 and
/// halving per level. Partial levels round up.
pub fn num_levels_for_resolution(first_level_resolution: f64, resolution: f64) -> u32 {
    if !(resolution > 0.0) || !(first_level_resolution > 0.0) {
        return 1;
    }
    let ratio = first_level_resolution / resolution;
    if ratio <= 1.0 {
        return 1;
    }
    (ratio.log2() - SPAN_EPSILON).ceil().max(0.0) as u32 + 1
}

fn tile_count(span: f64, delta: f64) -> u32 {
    ((span / delta) - SPAN_EPSILON).ceil().max(1.0) as u32
}

/// Upper bound on the up-front allocation for a sector enumeration.
const MAX_PREALLOCATED_TILES: u64 = 1 << 16;

fn tile_span_count(first_row: u32, last_row: u32, first_col: u32, last_col: u32) -> u64 {
    u64::from(last_row - first_row + 1) * u64::from(last_col - first_col + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global_pyramid(levels: u32) -> LevelSet {
        LevelSet::from_tile_pyramid(BoundingBox::global(), 2, 1, levels, 256, 256).unwrap()
    }

    #[test]
    fn test_deep_global_sector_count() {
        let set = global_pyramid(21);
        assert_eq!(
            set.tile_count_in_sector(&BoundingBox::global(), 16),
            131_072 * 65_536
        );
        assert_eq!(
            set.tile_count_in_sector(&BoundingBox::global(), 20),
            2_097_152 * 1_048_576
        );
        assert_eq!(set.tile_count_in_sector(&BoundingBox::global(), 21), 0);
    }

    #[test]
    fn test_deep_level_small_sector() {
        let set = global_pyramid(21);
        let sector = BoundingBox::new(10.0, 10.0, 10.0001, 10.0001);
        let tiles = set.tiles_in_sector(&sector, 20);
        assert!(!tiles.is_empty() && tiles.len() <= 4);
        assert_eq!(tiles.len() as u64, set.tile_count_in_sector(&sector, 20));
        for coord in tiles {
            assert_eq!(coord.level, 20);
            assert!(set.tile_sector(coord).unwrap().intersects(&sector));
        }
    }

    #[test]
    fn test_level_matrix_doubles() {
        let set = global_pyramid(4);
        assert_eq!(set.num_levels(), 4);
        for (n, level) in set.levels().iter().enumerate() {
            assert_eq!(level.matrix_width, 2 << n);
            assert_eq!(level.matrix_height, 1 << n);
        }
    }

    #[test]
    fn test_tile_sector_level_zero() {
        let set = global_pyramid(1);
        let west = set.tile_sector(TileCoord::new(0, 0, 0)).unwrap();
        assert_eq!(west, BoundingBox::new(-180.0, -90.0, 0.0, 90.0));
        let east = set.tile_sector(TileCoord::new(0, 0, 1)).unwrap();
        assert_eq!(east, BoundingBox::new(0.0, -90.0, 180.0, 90.0));
        assert!(set.tile_sector(TileCoord::new(0, 1, 0)).is_none());
        assert!(set.tile_sector(TileCoord::new(1, 0, 0)).is_none());
    }

    #[test]
    fn test_tile_sector_rows_count_from_north() {
        let set = global_pyramid(6);
        let sector = set.tile_sector(TileCoord::new(3, 2, 5)).unwrap();
        // Level 3 tiles span 22.5 degrees on both axes.
        assert!((sector.min_x - (-67.5)).abs() < 1e-9);
        assert!((sector.max_x - (-45.0)).abs() < 1e-9);
        assert!((sector.max_y - 45.0).abs() < 1e-9);
        assert!((sector.min_y - 22.5).abs() < 1e-9);
    }

    #[test]
    fn test_levels_for_resolution_rounds_up() {
        // 0.703125 degrees per pixel at level 0 for 256px tiles over 180 degrees.
        let first = 180.0 / 256.0;
        assert_eq!(num_levels_for_resolution(first, first), 1);
        assert_eq!(num_levels_for_resolution(first, first / 2.0), 2);
        assert_eq!(num_levels_for_resolution(first, first / 2.5), 3);
        assert_eq!(num_levels_for_resolution(first, first * 10.0), 1);
    }

    #[test]
    fn test_levels_for_resolution_monotonic() {
        let first = 1.0;
        let mut previous = 0;
        for step in 1..200 {
            let resolution = 1.0 / step as f64;
            let levels = num_levels_for_resolution(first, resolution);
            assert!(levels >= previous);
            previous = levels;
        }
    }

    #[test]
    fn test_from_coverage_description() {
        // A 1 arc-second-ish grid over a 1x2 degree sector.
        let sector = BoundingBox::new(10.0, 45.0, 12.0, 46.0);
        let set = LevelSet::from_coverage_description(sector, 7200, 3600, 256, 256).unwrap();
        assert_eq!(set.first_level().matrix_width, 2);
        assert_eq!(set.first_level().matrix_height, 1);
        let target = 1.0 / 3600.0;
        assert!(set.last_level().pixel_y_size() <= target + 1e-12);
        let previous = &set.levels()[set.levels().len() - 2];
        assert!(previous.pixel_y_size() > target);
    }

    #[test]
    fn test_tiles_in_sector() {
        let set = global_pyramid(3);
        let tiles = set.tiles_in_sector(&BoundingBox::new(-10.0, -10.0, 10.0, 10.0), 1);
        // Level 1 tiles are 90 degrees: the box touches the four central tiles.
        assert_eq!(tiles.len(), 4);
        assert!(tiles.contains(&TileCoord::new(1, 0, 1)));
        assert!(tiles.contains(&TileCoord::new(1, 1, 2)));

        let edge = set.tiles_in_sector(&BoundingBox::new(0.0, 0.0, 90.0, 90.0), 1);
        assert_eq!(edge, vec![TileCoord::new(1, 0, 2)]);
    }

    #[test]
    fn test_level_for_resolution() {
        let set = global_pyramid(5);
        let level = set.level_for_resolution(set.levels()[2].pixel_y_size());
        assert_eq!(level.level_number, 2);
        assert_eq!(set.level_for_resolution(1e-12).level_number, 4);
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        assert!(LevelSet::from_tile_pyramid(BoundingBox::global(), 2, 1, 0, 256, 256).is_err());
        assert!(LevelSet::from_tile_pyramid(BoundingBox::global(), 0, 1, 3, 256, 256).is_err());
        assert!(LevelSet::from_tile_pyramid(BoundingBox::global(), 2, 1, 3, 0, 256).is_err());
    }
}
