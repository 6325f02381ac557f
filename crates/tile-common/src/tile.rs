//! Tile addresses.
//!
//! Rows in a [`TileCoord`] always count from the top (north) edge of the
//! tile origin. The container stores rows counted from the south edge; the
//! two conventions meet only in [`container_row`].

use serde::{Deserialize, Serialize};

/// A tile address within a level set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    /// Level number, 0 is the coarsest
    pub level: u32,
    /// Row, counted from the north edge
    pub row: u32,
    /// Column, counted from the west edge
    pub col: u32,
}

impl TileCoord {
    pub fn new(level: u32, row: u32, col: u32) -> Self {
        Self { level, row, col }
    }

    /// Generate a cache key string.
    pub fn cache_key(&self) -> String {
        format!("{}/{}/{}", self.level, self.row, self.col)
    }

    /// Get the parent tile (level - 1).
    pub fn parent(&self) -> Option<TileCoord> {
        if self.level == 0 {
            return None;
        }
        Some(TileCoord {
            level: self.level - 1,
            row: self.row / 2,
            col: self.col / 2,
        })
    }

    /// Get the four children tiles (level + 1).
    pub fn children(&self) -> [TileCoord; 4] {
        let row = self.row * 2;
        let col = self.col * 2;
        let level = self.level + 1;
        [
            TileCoord { level, row, col },
            TileCoord { level, row, col: col + 1 },
            TileCoord { level, row: row + 1, col },
            TileCoord {
                level,
                row: row + 1,
                col: col + 1,
            },
        ]
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.level, self.row, self.col)
    }
}

/// Convert between north-up pyramid rows and south-up container rows.
///
/// The mapping is its own inverse. `row` must be below `matrix_height`.
pub fn container_row(matrix_height: u32, row: u32) -> u32 {
    matrix_height - row - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_children() {
        let tile = TileCoord::new(3, 2, 5);
        let parent = tile.parent().unwrap();
        assert_eq!(parent, TileCoord::new(2, 1, 2));
        assert!(parent.children().contains(&tile));
        assert!(TileCoord::new(0, 0, 1).parent().is_none());
    }

    #[test]
    fn test_container_row_is_involution() {
        for height in [1u32, 2, 4, 16, 1024] {
            for row in 0..height.min(64) {
                let flipped = container_row(height, row);
                assert!(flipped < height);
                assert_eq!(container_row(height, flipped), row);
            }
        }
    }

    #[test]
    fn test_container_row_edges() {
        assert_eq!(container_row(8, 0), 7);
        assert_eq!(container_row(8, 7), 0);
        assert_eq!(container_row(1, 0), 0);
    }
}
