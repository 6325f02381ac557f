//! Cache hit, miss and fetch accounting.
//!
//! Each event bumps a local atomic, readable through [`CacheStats`], and the
//! matching `metrics` counter labelled with the content kind. No exporter is
//! installed here; a binary that wants Prometheus output installs one.

use metrics::counter;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Kind of cached content, used as the `kind` metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ContentKind {
    Imagery,
    Elevation,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Imagery => "imagery",
            ContentKind::Elevation => "elevation",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters shared by every layer a manager hands out.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub fetch_failures: AtomicU64,
    pub writes: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub fetch_failures: u64,
    pub writes: u64,
}

impl CacheStats {
    pub fn record_hit(&self, kind: ContentKind) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        counter!("tile_cache_hits_total", "kind" => kind.as_str()).increment(1);
    }

    pub fn record_miss(&self, kind: ContentKind) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!("tile_cache_misses_total", "kind" => kind.as_str()).increment(1);
    }

    pub fn record_fetch_failure(&self, kind: ContentKind) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
        counter!("tile_cache_fetch_failures_total", "kind" => kind.as_str()).increment(1);
    }

    pub fn record_write(&self, kind: ContentKind) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        counter!("tile_cache_writes_total", "kind" => kind.as_str()).increment(1);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }

    /// Hit rate as a percentage (0-100).
    pub fn hit_rate(&self) -> f64 {
        let snapshot = self.snapshot();
        let total = snapshot.hits + snapshot.misses;
        if total == 0 {
            0.0
        } else {
            (snapshot.hits as f64 / total as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = CacheStats::default();
        stats.record_hit(ContentKind::Imagery);
        stats.record_hit(ContentKind::Elevation);
        stats.record_miss(ContentKind::Imagery);
        stats.record_write(ContentKind::Imagery);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.hits, 2);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.writes, 1);
        assert_eq!(snapshot.fetch_failures, 0);
        assert!((stats.hit_rate() - 66.666).abs() < 0.01);
    }

    #[test]
    fn test_empty_hit_rate() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
