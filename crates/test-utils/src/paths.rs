//! Temporary container locations and file checksums.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A scratch directory holding one container file.
///
/// The directory and everything in it is removed when this value drops.
pub struct TempContainer {
    dir: TempDir,
    path: PathBuf,
}

impl TempContainer {
    /// Create a fresh directory with a container path inside it.
    ///
    /// The container file itself is not created.
    pub fn new(file_name: &str) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join(file_name);
        Self { dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

impl Default for TempContainer {
    fn default() -> Self {
        Self::new("cache.gpkg")
    }
}

/// CRC32 of a file's bytes, used to show a file was left untouched.
///
/// # Panics
///
/// Panics if the file cannot be read.
pub fn file_checksum(path: &Path) -> u32 {
    let bytes = std::fs::read(path)
        .unwrap_or_else(|e| panic!("failed to read {}: {}", path.display(), e));
    crc32fast::hash(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_container_cleanup() {
        let dir_path = {
            let container = TempContainer::default();
            assert!(container.path().ends_with("cache.gpkg"));
            assert!(!container.path().exists());
            container.dir().to_path_buf()
        };
        assert!(!dir_path.exists());
    }

    #[test]
    fn test_file_checksum_changes_with_content() {
        let container = TempContainer::new("a.bin");
        std::fs::write(container.path(), b"one").unwrap();
        let first = file_checksum(container.path());
        std::fs::write(container.path(), b"two").unwrap();
        assert_ne!(first, file_checksum(container.path()));
    }
}
