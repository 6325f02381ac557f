//! Outcome of a tile load and concurrent prefetching over a sector.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::future::Future;
use tile_common::{BoundingBox, CacheResult, LevelSet, TileCoord};
use tracing::{debug, info, warn};

/// How a tile request was satisfied.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LoadOutcome<T> {
    /// Already in the container.
    Cached(T),
    /// Fetched from the remote service; `stored` is false when the write
    /// was skipped or failed.
    Fetched { value: T, stored: bool },
    /// Not cached and no remote service can supply it.
    Missing,
}

impl<T> LoadOutcome<T> {
    pub(crate) fn into_value(self) -> Option<T> {
        match self {
            LoadOutcome::Cached(value) | LoadOutcome::Fetched { value, .. } => Some(value),
            LoadOutcome::Missing => None,
        }
    }
}

/// Tally of a seeding run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SeedReport {
    /// Tiles intersecting the sector up to the requested level.
    pub requested: u64,
    /// Tiles that were already cached.
    pub cached: u64,
    /// Tiles fetched and written to the container.
    pub written: u64,
    /// Tiles that could not be fetched or stored.
    pub failed: u64,
}

/// Tiles of every level up to `max_level` that intersect `sector`.
pub(crate) fn seed_coords(level_set: &LevelSet, sector: &BoundingBox, max_level: u32) -> Vec<TileCoord> {
    let last = max_level.min(level_set.num_levels().saturating_sub(1));
    (0..=last)
        .flat_map(|level| level_set.tiles_in_sector(sector, level))
        .collect()
}

/// Load every tile in `coords` with at most `concurrency` loads in flight.
pub(crate) async fn seed_tiles<T, F, Fut>(
    coords: Vec<TileCoord>,
    concurrency: usize,
    load: F,
) -> SeedReport
where
    F: Fn(TileCoord) -> Fut,
    Fut: Future<Output = CacheResult<LoadOutcome<T>>>,
{
    let mut report = SeedReport {
        requested: coords.len() as u64,
        ..SeedReport::default()
    };
    debug!(tiles = report.requested, concurrency, "Seeding tiles");

    let mut results = stream::iter(coords)
        .map(|coord| {
            let fut = load(coord);
            async move { (coord, fut.await) }
        })
        .buffer_unordered(concurrency.max(1));

    while let Some((coord, result)) = results.next().await {
        match result {
            Ok(LoadOutcome::Cached(_)) => report.cached += 1,
            Ok(LoadOutcome::Fetched { stored: true, .. }) => report.written += 1,
            Ok(LoadOutcome::Fetched { stored: false, .. }) | Ok(LoadOutcome::Missing) => {
                report.failed += 1
            }
            Err(e) => {
                warn!(tile = %coord, error = %e, "Seed fetch failed");
                report.failed += 1;
            }
        }
    }

    info!(
        requested = report.requested,
        cached = report.cached,
        written = report.written,
        failed = report.failed,
        "Seeding complete"
    );
    report
}
