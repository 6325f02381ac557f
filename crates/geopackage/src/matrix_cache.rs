//! In-memory LRU of tile matrix rows.
//!
//! Every tile read and write needs the matrix height of its level to flip
//! rows, so `(table, zoom)` lookups are kept in memory. Rows are only ever
//! added by setup, never modified, so the only invalidation is dropping a
//! whole table on delete.

use crate::model::TileMatrix;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

/// Cache key for one zoom level of one content table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileMatrixKey {
    pub table_name: String,
    pub zoom_level: i64,
}

impl TileMatrixKey {
    pub fn new(table_name: impl Into<String>, zoom_level: i64) -> Self {
        Self {
            table_name: table_name.into(),
            zoom_level,
        }
    }
}

/// Called with each entry pushed out to make room for a new one.
pub type EvictionCallback = Box<dyn Fn(&TileMatrixKey, &TileMatrix) + Send + Sync>;

/// Statistics for the tile matrix cache.
#[derive(Debug, Default)]
pub struct TileMatrixCacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
}

pub struct TileMatrixCache {
    entries: Mutex<LruCache<TileMatrixKey, TileMatrix>>,
    on_evict: Option<EvictionCallback>,
    stats: TileMatrixCacheStats,
}

impl TileMatrixCache {
    /// Create a cache holding up to `capacity` rows (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            on_evict: None,
            stats: TileMatrixCacheStats::default(),
        }
    }

    /// Register a callback invoked on every capacity eviction.
    pub fn with_eviction_callback(mut self, callback: EvictionCallback) -> Self {
        self.on_evict = Some(callback);
        self
    }

    pub async fn get(&self, key: &TileMatrixKey) -> Option<TileMatrix> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(matrix) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(matrix.clone())
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn insert(&self, key: TileMatrixKey, matrix: TileMatrix) {
        let mut entries = self.entries.lock().await;
        if let Some((old_key, old_matrix)) = entries.push(key.clone(), matrix) {
            // `push` also hands back the previous value when replacing a key.
            if old_key != key {
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(
                    table = %old_key.table_name,
                    zoom = old_key.zoom_level,
                    "Evicted tile matrix from cache"
                );
                if let Some(callback) = &self.on_evict {
                    callback(&old_key, &old_matrix);
                }
            }
        }
    }

    /// Forget every zoom level of `table_name`.
    pub async fn invalidate_table(&self, table_name: &str) {
        let mut entries = self.entries.lock().await;
        let stale: Vec<TileMatrixKey> = entries
            .iter()
            .filter(|(k, _)| k.table_name == table_name)
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale {
            entries.pop(&key);
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub fn stats(&self) -> &TileMatrixCacheStats {
        &self.stats
    }
}

impl std::fmt::Debug for TileMatrixCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileMatrixCache")
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
