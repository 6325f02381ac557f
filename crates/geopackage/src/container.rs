//! Container connection management and metadata reads.
//!
//! Reads go through a pool of read-only connections. Writes go through a
//! single-connection pool, which serializes every mutating operation; each
//! composite write runs in one transaction on that connection. A container
//! opened read-only has no writer at all.

use crate::config::ContainerConfig;
use crate::matrix_cache::{TileMatrixCache, TileMatrixKey};
use crate::model::{
    Content, DataType, Extension, GriddedCoverage, GriddedTile, SpatialReferenceSystem,
    TileMatrix, TileMatrixSet, WebService,
};
use crate::schema;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::SqliteConnection;
use std::path::{Path, PathBuf};
use tile_common::{CacheError, CacheResult, LevelSet, TileDelta};
use tracing::{debug, info};

/// A GeoPackage-style tile container backed by one SQLite file.
#[derive(Debug)]
pub struct GeoPackage {
    path: PathBuf,
    readers: SqlitePool,
    writer: Option<SqlitePool>,
    pub(crate) matrices: TileMatrixCache,
}

impl GeoPackage {
    /// Open or create a writable container and bring its schema up to date.
    pub async fn open(path: impl AsRef<Path>, config: &ContainerConfig) -> CacheResult<Self> {
        let path = path.as_ref().to_path_buf();
        config.validate().map_err(CacheError::Validation)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let writer_options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout());

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(writer_options)
            .await
            .map_err(|e| CacheError::Database(format!("Failed to open container: {}", e)))?;

        let mut tx = writer
            .begin()
            .await
            .map_err(|e| CacheError::Database(format!("Failed to begin transaction: {}", e)))?;
        schema::migrate(&mut tx).await?;
        tx.commit()
            .await
            .map_err(|e| CacheError::Database(format!("Commit failed: {}", e)))?;

        let readers = Self::connect_readers(&path, config).await?;

        info!(path = %path.display(), "Opened container");

        Ok(Self {
            path,
            readers,
            writer: Some(writer),
            matrices: TileMatrixCache::new(config.tile_matrix_cache_size),
        })
    }

    /// Open an existing container without write access.
    ///
    /// Nothing is created or migrated; every write operation fails with
    /// [`CacheError::ReadOnly`] before touching the file.
    pub async fn open_read_only(
        path: impl AsRef<Path>,
        config: &ContainerConfig,
    ) -> CacheResult<Self> {
        let path = path.as_ref().to_path_buf();
        config.validate().map_err(CacheError::Validation)?;

        if !path.exists() {
            return Err(CacheError::NotFound(format!(
                "container {}",
                path.display()
            )));
        }

        let readers = Self::connect_readers(&path, config).await?;

        info!(path = %path.display(), "Opened container read-only");

        Ok(Self {
            path,
            readers,
            writer: None,
            matrices: TileMatrixCache::new(config.tile_matrix_cache_size),
        })
    }

    async fn connect_readers(path: &Path, config: &ContainerConfig) -> CacheResult<SqlitePool> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout());

        SqlitePoolOptions::new()
            .max_connections(config.read_connections)
            .connect_with(options)
            .await
            .map_err(|e| CacheError::Database(format!("Failed to open container: {}", e)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.writer.is_none()
    }

    /// Close every connection. Pending operations finish first.
    pub async fn close(&self) {
        self.readers.close().await;
        if let Some(writer) = &self.writer {
            writer.close().await;
        }
        debug!(path = %self.path.display(), "Closed container");
    }

    /// The writer pool, or `ReadOnly` naming the refused `action`.
    pub(crate) fn writer(&self, action: &str) -> CacheResult<&SqlitePool> {
        self.writer
            .as_ref()
            .ok_or_else(|| CacheError::ReadOnly(action.to_string()))
    }

    pub(crate) fn readers(&self) -> &SqlitePool {
        &self.readers
    }

    // ========================================================================
    // Metadata reads
    // ========================================================================

    pub async fn spatial_reference_system(
        &self,
        srs_id: i64,
    ) -> CacheResult<Option<SpatialReferenceSystem>> {
        let result = sqlx::query_as::<_, SpatialReferenceSystem>(
            "SELECT srs_name, srs_id, organization, organization_coordsys_id, definition, description \
             FROM gpkg_spatial_ref_sys WHERE srs_id = ?",
        )
        .bind(srs_id)
        .fetch_optional(&self.readers)
        .await;
        read_result(result, "spatial reference system")
    }

    /// Find a spatial reference system by organization and code.
    pub async fn spatial_reference_system_by_code(
        &self,
        organization: &str,
        code: i64,
    ) -> CacheResult<Option<SpatialReferenceSystem>> {
        let result = sqlx::query_as::<_, SpatialReferenceSystem>(
            "SELECT srs_name, srs_id, organization, organization_coordsys_id, definition, description \
             FROM gpkg_spatial_ref_sys WHERE upper(organization) = upper(?) AND organization_coordsys_id = ?",
        )
        .bind(organization)
        .bind(code)
        .fetch_optional(&self.readers)
        .await;
        read_result(result, "spatial reference system")
    }

    pub async fn contents(&self) -> CacheResult<Vec<Content>> {
        let result = sqlx::query_as::<_, Content>(&format!(
            "SELECT {} FROM gpkg_contents ORDER BY table_name",
            CONTENT_COLUMNS
        ))
        .fetch_all(&self.readers)
        .await;
        read_result(result, "contents")
    }

    pub async fn contents_by_type(&self, data_type: DataType) -> CacheResult<Vec<Content>> {
        let result = sqlx::query_as::<_, Content>(&format!(
            "SELECT {} FROM gpkg_contents WHERE data_type = ? ORDER BY table_name",
            CONTENT_COLUMNS
        ))
        .bind(data_type.as_str())
        .fetch_all(&self.readers)
        .await;
        read_result(result, "contents")
    }

    pub async fn content(&self, table_name: &str) -> CacheResult<Option<Content>> {
        let mut conn = self.read_connection().await?;
        fetch_content(&mut conn, table_name).await
    }

    pub async fn content_by_identifier(&self, identifier: &str) -> CacheResult<Option<Content>> {
        let result = sqlx::query_as::<_, Content>(&format!(
            "SELECT {} FROM gpkg_contents WHERE identifier = ?",
            CONTENT_COLUMNS
        ))
        .bind(identifier)
        .fetch_optional(&self.readers)
        .await;
        read_result(result, "content")
    }

    pub async fn tile_matrix_set(&self, table_name: &str) -> CacheResult<Option<TileMatrixSet>> {
        let mut conn = self.read_connection().await?;
        fetch_tile_matrix_set(&mut conn, table_name).await
    }

    /// All zoom levels of a table, ordered by zoom.
    pub async fn tile_matrices(&self, table_name: &str) -> CacheResult<Vec<TileMatrix>> {
        let result = sqlx::query_as::<_, TileMatrix>(&format!(
            "SELECT {} FROM gpkg_tile_matrix WHERE table_name = ? ORDER BY zoom_level",
            TILE_MATRIX_COLUMNS
        ))
        .bind(table_name)
        .fetch_all(&self.readers)
        .await;
        read_result(result, "tile matrices")
    }

    /// One zoom level of a table, served from the in-memory cache when
    /// possible.
    pub async fn tile_matrix(
        &self,
        table_name: &str,
        zoom_level: i64,
    ) -> CacheResult<Option<TileMatrix>> {
        let key = TileMatrixKey::new(table_name, zoom_level);
        if let Some(matrix) = self.matrices.get(&key).await {
            return Ok(Some(matrix));
        }

        let result = sqlx::query_as::<_, TileMatrix>(&format!(
            "SELECT {} FROM gpkg_tile_matrix WHERE table_name = ? AND zoom_level = ?",
            TILE_MATRIX_COLUMNS
        ))
        .bind(table_name)
        .bind(zoom_level)
        .fetch_optional(&self.readers)
        .await;
        let matrix = read_result(result, "tile matrix")?;

        if let Some(matrix) = &matrix {
            self.matrices.insert(key, matrix.clone()).await;
        }
        Ok(matrix)
    }

    pub async fn extensions(&self, table_name: &str) -> CacheResult<Vec<Extension>> {
        let mut conn = self.read_connection().await?;
        fetch_extensions(&mut conn, table_name).await
    }

    pub async fn gridded_coverage(&self, table_name: &str) -> CacheResult<Option<GriddedCoverage>> {
        let mut conn = self.read_connection().await?;
        fetch_gridded_coverage(&mut conn, table_name).await
    }

    /// Ancillary row of one tile, keyed by the tile's row id.
    pub async fn gridded_tile(
        &self,
        table_name: &str,
        tile_id: i64,
    ) -> CacheResult<Option<GriddedTile>> {
        let result = sqlx::query_as::<_, GriddedTile>(
            r#"SELECT id, tpudt_name, tpudt_id, scale, "offset", min, max, mean, std_dev
               FROM gpkg_2d_gridded_tile_ancillary WHERE tpudt_name = ? AND tpudt_id = ?"#,
        )
        .bind(table_name)
        .bind(tile_id)
        .fetch_optional(&self.readers)
        .await;
        read_result(result, "gridded tile")
    }

    pub async fn web_service(&self, table_name: &str) -> CacheResult<Option<WebService>> {
        let result = sqlx::query_as::<_, WebService>(
            "SELECT table_name, service_type, service_address, service_metadata, layer_name, \
             output_format, is_transparent FROM gpkg_web_service WHERE table_name = ?",
        )
        .bind(table_name)
        .fetch_optional(&self.readers)
        .await;
        read_result(result, "web service")
    }

    /// Rebuild the level set a table was created with.
    ///
    /// Levels are taken from zoom 0 upwards until the first gap. Returns
    /// `None` when the table has no tile matrix set or no zoom 0 row.
    pub async fn level_set(&self, table_name: &str) -> CacheResult<Option<LevelSet>> {
        let Some(tms) = self.tile_matrix_set(table_name).await? else {
            return Ok(None);
        };
        let matrices = self.tile_matrices(table_name).await?;
        let num_levels = matrices
            .iter()
            .enumerate()
            .take_while(|(i, m)| m.zoom_level == *i as i64)
            .count();
        let Some(first) = matrices.first().filter(|_| num_levels > 0) else {
            return Ok(None);
        };

        let tile_origin = tms.bounding_box();
        let sector = self
            .content(table_name)
            .await?
            .and_then(|c| c.bounding_box())
            .unwrap_or(tile_origin);
        let delta = TileDelta::new(
            first.pixel_y_size * first.tile_height as f64,
            first.pixel_x_size * first.tile_width as f64,
        );

        LevelSet::new(
            sector,
            tile_origin,
            delta,
            num_levels as u32,
            first.tile_width as u32,
            first.tile_height as u32,
        )
        .map(Some)
    }

    pub(crate) async fn read_connection(
        &self,
    ) -> CacheResult<sqlx::pool::PoolConnection<sqlx::Sqlite>> {
        self.readers
            .acquire()
            .await
            .map_err(|e| CacheError::Database(format!("Failed to acquire connection: {}", e)))
    }
}

// ============================================================================
// Shared queries, usable on a reader connection or inside a write transaction
// ============================================================================

pub(crate) const CONTENT_COLUMNS: &str =
    "table_name, data_type, identifier, description, last_change, min_x, min_y, max_x, max_y, srs_id";

pub(crate) const TILE_MATRIX_COLUMNS: &str = "table_name, zoom_level, matrix_width, matrix_height, \
     tile_width, tile_height, pixel_x_size, pixel_y_size";

pub(crate) async fn fetch_content(
    conn: &mut SqliteConnection,
    table_name: &str,
) -> CacheResult<Option<Content>> {
    let result = sqlx::query_as::<_, Content>(&format!(
        "SELECT {} FROM gpkg_contents WHERE table_name = ?",
        CONTENT_COLUMNS
    ))
    .bind(table_name)
    .fetch_optional(&mut *conn)
    .await;
    read_result(result, "content")
}

pub(crate) async fn fetch_tile_matrix_set(
    conn: &mut SqliteConnection,
    table_name: &str,
) -> CacheResult<Option<TileMatrixSet>> {
    let result = sqlx::query_as::<_, TileMatrixSet>(
        "SELECT table_name, srs_id, min_x, min_y, max_x, max_y \
         FROM gpkg_tile_matrix_set WHERE table_name = ?",
    )
    .bind(table_name)
    .fetch_optional(&mut *conn)
    .await;
    read_result(result, "tile matrix set")
}

pub(crate) async fn fetch_first_tile_matrix(
    conn: &mut SqliteConnection,
    table_name: &str,
) -> CacheResult<Option<TileMatrix>> {
    let result = sqlx::query_as::<_, TileMatrix>(&format!(
        "SELECT {} FROM gpkg_tile_matrix WHERE table_name = ? AND zoom_level = 0",
        TILE_MATRIX_COLUMNS
    ))
    .bind(table_name)
    .fetch_optional(&mut *conn)
    .await;
    read_result(result, "tile matrix")
}

pub(crate) async fn fetch_srs(
    conn: &mut SqliteConnection,
    srs_id: i64,
) -> CacheResult<Option<SpatialReferenceSystem>> {
    let result = sqlx::query_as::<_, SpatialReferenceSystem>(
        "SELECT srs_name, srs_id, organization, organization_coordsys_id, definition, description \
         FROM gpkg_spatial_ref_sys WHERE srs_id = ?",
    )
    .bind(srs_id)
    .fetch_optional(&mut *conn)
    .await;
    read_result(result, "spatial reference system")
}

pub(crate) async fn fetch_extensions(
    conn: &mut SqliteConnection,
    table_name: &str,
) -> CacheResult<Vec<Extension>> {
    let result = sqlx::query_as::<_, Extension>(
        "SELECT table_name, column_name, extension_name, definition, scope \
         FROM gpkg_extensions WHERE table_name = ? ORDER BY extension_name",
    )
    .bind(table_name)
    .fetch_all(&mut *conn)
    .await;
    read_result(result, "extensions")
}

pub(crate) async fn fetch_gridded_coverage(
    conn: &mut SqliteConnection,
    table_name: &str,
) -> CacheResult<Option<GriddedCoverage>> {
    let result = sqlx::query_as::<_, GriddedCoverage>(
        r#"SELECT id, tile_matrix_set_name, datatype, scale, "offset", precision, data_null
           FROM gpkg_2d_gridded_coverage_ancillary WHERE tile_matrix_set_name = ?"#,
    )
    .bind(table_name)
    .fetch_optional(&mut *conn)
    .await;
    read_result(result, "gridded coverage")
}

/// Whether an error comes from querying a table that does not exist.
pub(crate) fn is_missing_table(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.message().contains("no such table"),
        _ => false,
    }
}

/// Map a read result, treating a missing table as an empty result.
pub(crate) fn read_result<T: Default>(
    result: Result<T, sqlx::Error>,
    what: &str,
) -> CacheResult<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if is_missing_table(&e) => {
            debug!(what, "Table missing, treating read as empty");
            Ok(T::default())
        }
        Err(e) => Err(CacheError::Database(format!(
            "Query for {} failed: {}",
            what, e
        ))),
    }
}

/// Map a write error.
pub(crate) fn write_error(action: &str) -> impl Fn(sqlx::Error) -> CacheError + '_ {
    move |e| CacheError::Database(format!("Failed to {}: {}", action, e))
}
