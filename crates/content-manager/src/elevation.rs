//! Cache-aware elevation coverages.
//!
//! Remote coverages are fetched as GeoTIFF, taken as heights in metres and
//! re-encoded in the container's encoding before they are stored, so a tile
//! reads back the same whether it came from the cache or the network.

use crate::descriptor::{CoverageDescriptor, LayerDescriptor};
use crate::stats::{CacheStats, ContentKind};
use crate::seed::{seed_coords, seed_tiles, LoadOutcome, SeedReport};
use elevation_codec::{CoverageEncoding, ElevationRaster, SampleBuffer, TileScale};
use geopackage::{Content, DataType, GeoPackage, GriddedTileValues};
use ogc_client::{OgcClient, RemoteCoverage};
use std::sync::Arc;
use tile_common::{BoundingBox, CacheError, CacheResult, LevelSet, TileCoord};
use tracing::{debug, instrument, trace, warn};

/// Result of an elevation request.
#[derive(Debug, Clone, PartialEq)]
pub enum ElevationResult {
    Raster(ElevationRaster),
    /// Not cached and could not be fetched. Asking again may succeed.
    Unavailable,
}

impl ElevationResult {
    pub fn into_raster(self) -> Option<ElevationRaster> {
        match self {
            ElevationResult::Raster(raster) => Some(raster),
            ElevationResult::Unavailable => None,
        }
    }
}

/// A gridded coverage stored in the container, optionally backed by a
/// remote WCS coverage that fills misses.
#[derive(Debug, Clone)]
pub struct ElevationCoverage {
    content: Content,
    level_set: LevelSet,
    encoding: CoverageEncoding,
    remote: Option<RemoteCoverage>,
    container: Arc<GeoPackage>,
    client: OgcClient,
    stats: Arc<CacheStats>,
}

impl ElevationCoverage {
    pub(crate) fn new(
        content: Content,
        level_set: LevelSet,
        encoding: CoverageEncoding,
        remote: Option<RemoteCoverage>,
        container: Arc<GeoPackage>,
        client: OgcClient,
        stats: Arc<CacheStats>,
    ) -> Self {
        Self {
            content,
            level_set,
            encoding,
            remote,
            container,
            client,
            stats,
        }
    }

    pub fn name(&self) -> &str {
        self.content.display_name()
    }

    pub fn table_name(&self) -> &str {
        &self.content.table_name
    }

    pub fn level_set(&self) -> &LevelSet {
        &self.level_set
    }

    pub fn encoding(&self) -> &CoverageEncoding {
        &self.encoding
    }

    pub fn remote(&self) -> Option<&RemoteCoverage> {
        self.remote.as_ref()
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn descriptor(&self) -> CoverageDescriptor {
        CoverageDescriptor {
            layer: LayerDescriptor::new(
                &self.content,
                DataType::GriddedCoverage,
                &self.level_set,
                self.remote.as_ref().map(|r| r.binding.service_type),
            ),
            encoding: self.encoding,
        }
    }

    /// Elevation tile from the cache, fetching and storing it on a miss.
    ///
    /// Failures are logged and reported as [`ElevationResult::Unavailable`].
    pub async fn get_elevation(&self, coord: TileCoord) -> ElevationResult {
        match self.load_raster(coord).await {
            Ok(outcome) => outcome
                .into_value()
                .map(ElevationResult::Raster)
                .unwrap_or(ElevationResult::Unavailable),
            Err(e) => {
                warn!(
                    coverage = %self.name(),
                    tile = %coord,
                    error = %e,
                    kind = e.kind(),
                    "Elevation tile unavailable"
                );
                ElevationResult::Unavailable
            }
        }
    }

    /// Height at a geographic position from the finest level covering it.
    ///
    /// `None` when the position is outside the coverage, the tile cannot be
    /// loaded, or the sample there is null.
    pub async fn height_at(&self, lon: f64, lat: f64) -> Option<f32> {
        if !self.level_set.sector.contains_point(lon, lat) {
            return None;
        }
        let level = self.level_set.last_level();
        let col = ((lon - level.origin.min_x) / level.tile_delta.lon).floor();
        let row = ((level.origin.max_y - lat) / level.tile_delta.lat).floor();
        // A point on the south or east edge belongs to the last tile.
        let col = col.max(0.0).min((level.matrix_width - 1) as f64) as u32;
        let row = row.max(0.0).min((level.matrix_height - 1) as f64) as u32;

        let coord = TileCoord::new(level.level_number, row, col);
        let sector = self.level_set.tile_sector(coord)?;
        let raster = self.get_elevation(coord).await.into_raster()?;

        let fx = (lon - sector.min_x) / sector.width() * raster.width as f64;
        let fy = (sector.max_y - lat) / sector.height() * raster.height as f64;
        let x = (fx.floor().max(0.0) as u32).min(raster.width.saturating_sub(1));
        let y = (fy.floor().max(0.0) as u32).min(raster.height.saturating_sub(1));
        raster.height(x, y)
    }

    /// Fetch and store every missing tile intersecting `sector` up to
    /// `max_level`.
    #[instrument(skip(self), fields(coverage = %self.name()))]
    pub async fn seed(
        &self,
        sector: &BoundingBox,
        max_level: u32,
        concurrency: usize,
    ) -> CacheResult<SeedReport> {
        if self.container.is_read_only() {
            return Err(CacheError::ReadOnly(format!("seed '{}'", self.name())));
        }
        if self.remote.is_none() {
            return Err(CacheError::validation(format!(
                "coverage '{}' has no remote source to seed from",
                self.name()
            )));
        }

        let coords = seed_coords(&self.level_set, sector, max_level);
        Ok(seed_tiles(coords, concurrency, |coord| self.load_raster(coord)).await)
    }

    pub(crate) async fn load_raster(
        &self,
        coord: TileCoord,
    ) -> CacheResult<LoadOutcome<ElevationRaster>> {
        if self.level_set.tile_sector(coord).is_none() {
            return Err(CacheError::invalid_parameter(
                "tile",
                format!("{} is outside the pyramid", coord),
            ));
        }

        if let Some(raster) = self.read_cached(coord).await? {
            self.stats.record_hit(ContentKind::Elevation);
            return Ok(LoadOutcome::Cached(raster));
        }
        self.stats.record_miss(ContentKind::Elevation);

        let Some(remote) = &self.remote else {
            debug!(coverage = %self.name(), tile = %coord, "Miss on local-only coverage");
            return Ok(LoadOutcome::Missing);
        };

        let raster = match self.fetch_raster(remote, coord).await {
            Ok(raster) => raster,
            Err(e) => {
                self.stats.record_fetch_failure(ContentKind::Elevation);
                return Err(e);
            }
        };
        let stored = self.store_raster(coord, &raster).await;
        Ok(LoadOutcome::Fetched {
            value: raster,
            stored,
        })
    }

    async fn read_cached(&self, coord: TileCoord) -> CacheResult<Option<ElevationRaster>> {
        let table = self.table_name();
        let Some(row) = self.container.read_tile_row(table, coord).await? else {
            return Ok(None);
        };
        let tile_scale = self
            .container
            .gridded_tile(table, row.id)
            .await?
            .map(|t| t.tile_scale())
            .unwrap_or_default();
        let raster = elevation_codec::decode(&row.tile_data, tile_scale, &self.encoding)?;
        Ok(Some(raster))
    }

    /// Fetch a tile and convert it into the container's encoding.
    #[instrument(skip(self, remote), fields(coverage = %remote.name, tile = %coord))]
    async fn fetch_raster(&self, remote: &RemoteCoverage, coord: TileCoord) -> CacheResult<ElevationRaster> {
        let url = remote.tile_url(&self.level_set, coord)?;
        let body = self.client.fetch(&url).await?;

        let (width, height, samples) = elevation_codec::decode_samples(&body)?;
        let source_encoding = CoverageEncoding::for_datatype(samples.datatype());
        let fetched = ElevationRaster::new(
            width,
            height,
            samples,
            TileScale::default(),
            source_encoding,
        )?;
        trace!(width, height, "Decoded remote coverage tile");

        let heights = fetched.heights();
        let samples = SampleBuffer::from_heights(&heights, TileScale::default(), &self.encoding);
        Ok(ElevationRaster::new(
            width,
            height,
            samples,
            TileScale::default(),
            self.encoding,
        )?)
    }

    /// Encode and write a raster with its statistics, returning whether it
    /// was stored.
    async fn store_raster(&self, coord: TileCoord, raster: &ElevationRaster) -> bool {
        if self.container.is_read_only() {
            debug!(tile = %coord, "Read-only container, serving fetched tile without storing");
            return false;
        }

        let blob = match raster.encode() {
            Ok(blob) => blob,
            Err(e) => {
                warn!(coverage = %self.name(), tile = %coord, error = %e, "Failed to encode tile");
                return false;
            }
        };
        let values = GriddedTileValues {
            tile_scale: raster.tile_scale,
            stats: raster.stats(),
        };

        match self
            .container
            .write_elevation_tile(self.table_name(), coord, &blob, &values)
            .await
        {
            Ok(_) => {
                self.stats.record_write(ContentKind::Elevation);
                true
            }
            Err(e) => {
                warn!(coverage = %self.name(), tile = %coord, error = %e, "Failed to store tile");
                false
            }
        }
    }
}
