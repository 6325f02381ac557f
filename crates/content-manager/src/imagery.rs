//! Cache-aware imagery layers.

use crate::descriptor::LayerDescriptor;
use crate::stats::{CacheStats, ContentKind};
use crate::seed::{seed_coords, seed_tiles, LoadOutcome, SeedReport};
use geopackage::{Content, DataType, GeoPackage};
use ogc_client::{OgcClient, RemoteImageLayer};
use std::sync::Arc;
use tile_common::{BoundingBox, CacheError, CacheResult, ImageFormat, LevelSet, TileCoord};
use tracing::{debug, instrument, warn};

/// Result of a tile request.
#[derive(Debug, Clone, PartialEq)]
pub enum TileResult {
    /// Encoded image bytes.
    Tile(Vec<u8>),
    /// Not cached and could not be fetched. Asking again may succeed.
    Unavailable,
}

impl TileResult {
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            TileResult::Tile(bytes) => Some(bytes),
            TileResult::Unavailable => None,
        }
    }
}

/// An imagery pyramid stored in the container, optionally backed by a
/// remote WMS or WMTS layer that fills misses.
#[derive(Debug, Clone)]
pub struct ImageLayer {
    content: Content,
    level_set: LevelSet,
    remote: Option<RemoteImageLayer>,
    container: Arc<GeoPackage>,
    client: OgcClient,
    stats: Arc<CacheStats>,
}

impl ImageLayer {
    pub(crate) fn new(
        content: Content,
        level_set: LevelSet,
        remote: Option<RemoteImageLayer>,
        container: Arc<GeoPackage>,
        client: OgcClient,
        stats: Arc<CacheStats>,
    ) -> Self {
        Self {
            content,
            level_set,
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

    pub fn remote(&self) -> Option<&RemoteImageLayer> {
        self.remote.as_ref()
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Summary as of when this handle was opened.
    pub fn descriptor(&self) -> LayerDescriptor {
        LayerDescriptor::new(
            &self.content,
            DataType::Tiles,
            &self.level_set,
            self.remote.as_ref().map(|r| r.binding.service_type),
        )
    }

    /// Tile bytes from the cache, fetching and storing them on a miss.
    ///
    /// Failures are logged and reported as [`TileResult::Unavailable`].
    pub async fn get_tile(&self, coord: TileCoord) -> TileResult {
        match self.load_tile(coord).await {
            Ok(outcome) => outcome
                .into_value()
                .map(TileResult::Tile)
                .unwrap_or(TileResult::Unavailable),
            Err(e) => {
                warn!(
                    layer = %self.name(),
                    tile = %coord,
                    error = %e,
                    kind = e.kind(),
                    "Tile unavailable"
                );
                TileResult::Unavailable
            }
        }
    }

    /// Fetch and store every missing tile intersecting `sector` up to
    /// `max_level`.
    #[instrument(skip(self), fields(layer = %self.name()))]
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
                "layer '{}' has no remote source to seed from",
                self.name()
            )));
        }

        let coords = seed_coords(&self.level_set, sector, max_level);
        Ok(seed_tiles(coords, concurrency, |coord| self.load_tile(coord)).await)
    }

    pub(crate) async fn load_tile(&self, coord: TileCoord) -> CacheResult<LoadOutcome<Vec<u8>>> {
        if self.level_set.tile_sector(coord).is_none() {
            return Err(CacheError::invalid_parameter(
                "tile",
                format!("{} is outside the pyramid", coord),
            ));
        }

        let table = self.table_name();
        if let Some(data) = self.container.read_tile(table, coord).await? {
            self.stats.record_hit(ContentKind::Imagery);
            return Ok(LoadOutcome::Cached(data));
        }
        self.stats.record_miss(ContentKind::Imagery);

        let Some(remote) = &self.remote else {
            debug!(layer = %self.name(), tile = %coord, "Miss on local-only layer");
            return Ok(LoadOutcome::Missing);
        };

        let data = match self.fetch_tile(remote, coord).await {
            Ok(data) => data,
            Err(e) => {
                self.stats.record_fetch_failure(ContentKind::Imagery);
                return Err(e);
            }
        };
        let stored = self.store_tile(coord, &data).await;
        Ok(LoadOutcome::Fetched {
            value: data,
            stored,
        })
    }

    #[instrument(skip(self, remote), fields(layer = %remote.name, tile = %coord))]
    async fn fetch_tile(&self, remote: &RemoteImageLayer, coord: TileCoord) -> CacheResult<Vec<u8>> {
        let url = remote.tile_url(&self.level_set, coord)?;
        let body = self.client.fetch(&url).await?;

        match ImageFormat::from_magic(&body) {
            Some(format) => {
                if format != remote.format {
                    debug!(
                        expected = %remote.format_mime,
                        got = format.mime_type(),
                        "Server returned another image format"
                    );
                }
                Ok(body.to_vec())
            }
            None => Err(CacheError::Codec(format!(
                "response from {} is not an image",
                url
            ))),
        }
    }

    /// Write a fetched tile, returning whether it was stored.
    async fn store_tile(&self, coord: TileCoord, data: &[u8]) -> bool {
        if self.container.is_read_only() {
            debug!(tile = %coord, "Read-only container, serving fetched tile without storing");
            return false;
        }
        match self.container.write_tile(self.table_name(), coord, data).await {
            Ok(_) => {
                self.stats.record_write(ContentKind::Imagery);
                true
            }
            Err(e) => {
                warn!(layer = %self.name(), tile = %coord, error = %e, "Failed to store tile");
                false
            }
        }
    }
}
