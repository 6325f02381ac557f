//! Tile reads and writes.
//!
//! Callers address tiles with rows counted from the north edge. Tile
//! tables store rows counted from the south, so rows are flipped here
//! using the stored matrix height of the level.

use crate::container::{read_result, write_error, GeoPackage};
use crate::model::{GriddedTileValues, TileUserData};
use crate::schema::quote_identifier;
use crate::setup::touch_content;
use sqlx::SqliteConnection;
use tile_common::{container_row, CacheError, CacheResult, TileCoord};
use tracing::{instrument, trace};

/// Row and column of a tile as stored in its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StoredAddress {
    zoom_level: i64,
    tile_row: i64,
    tile_column: i64,
}

impl GeoPackage {
    /// Read a tile blob, `None` when it has not been cached.
    pub async fn read_tile(&self, table_name: &str, coord: TileCoord) -> CacheResult<Option<Vec<u8>>> {
        Ok(self
            .read_tile_row(table_name, coord)
            .await?
            .map(|row| row.tile_data))
    }

    /// Read a tile together with its row id.
    pub async fn read_tile_row(
        &self,
        table_name: &str,
        coord: TileCoord,
    ) -> CacheResult<Option<TileUserData>> {
        let Some(address) = self.stored_address(table_name, coord).await? else {
            return Ok(None);
        };

        let result = sqlx::query_as::<_, TileUserData>(&format!(
            "SELECT id, zoom_level, tile_column, tile_row, tile_data FROM {} \
             WHERE zoom_level = ? AND tile_column = ? AND tile_row = ?",
            quote_identifier(table_name)
        ))
        .bind(address.zoom_level)
        .bind(address.tile_column)
        .bind(address.tile_row)
        .fetch_optional(self.readers())
        .await;

        let row = read_result(result, "tile")?;
        trace!(table = %table_name, tile = %coord, hit = row.is_some(), "Read tile");
        Ok(row)
    }

    /// Store a tile, replacing any previous blob at the same address.
    ///
    /// Returns the tile's row id. The content's `last_change` is updated in
    /// the same transaction.
    #[instrument(skip(self, data), fields(table = %table_name, tile = %coord))]
    pub async fn write_tile(&self, table_name: &str, coord: TileCoord, data: &[u8]) -> CacheResult<i64> {
        let writer = self.writer("write tile")?;
        let address = self.require_address(table_name, coord).await?;

        let mut tx = writer
            .begin()
            .await
            .map_err(write_error("begin transaction"))?;
        let id = upsert_tile(&mut tx, table_name, address, data).await?;
        touch_content(&mut tx, table_name).await?;
        tx.commit().await.map_err(write_error("commit tile"))?;

        trace!(bytes = data.len(), "Wrote tile");
        Ok(id)
    }

    /// Store an elevation tile and its ancillary row atomically.
    #[instrument(skip(self, data, values), fields(table = %table_name, tile = %coord))]
    pub async fn write_elevation_tile(
        &self,
        table_name: &str,
        coord: TileCoord,
        data: &[u8],
        values: &GriddedTileValues,
    ) -> CacheResult<i64> {
        let writer = self.writer("write elevation tile")?;
        let address = self.require_address(table_name, coord).await?;

        let mut tx = writer
            .begin()
            .await
            .map_err(write_error("begin transaction"))?;
        let id = upsert_tile(&mut tx, table_name, address, data).await?;
        upsert_gridded_tile(&mut tx, table_name, id, values).await?;
        touch_content(&mut tx, table_name).await?;
        tx.commit().await.map_err(write_error("commit elevation tile"))?;

        trace!(bytes = data.len(), "Wrote elevation tile");
        Ok(id)
    }

    /// Write or replace the ancillary row of an already stored tile.
    pub async fn write_gridded_tile(
        &self,
        table_name: &str,
        tile_id: i64,
        values: &GriddedTileValues,
    ) -> CacheResult<()> {
        let writer = self.writer("write gridded tile")?;
        let mut conn = writer
            .acquire()
            .await
            .map_err(write_error("acquire connection"))?;
        upsert_gridded_tile(&mut conn, table_name, tile_id, values).await
    }

    /// Number of tiles stored in a table, zero when the table is missing.
    pub async fn tile_count(&self, table_name: &str) -> CacheResult<i64> {
        let result: Result<(i64,), sqlx::Error> = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM {}",
            quote_identifier(table_name)
        ))
        .fetch_one(self.readers())
        .await;

        match result {
            Ok((count,)) => Ok(count),
            Err(e) if crate::container::is_missing_table(&e) => Ok(0),
            Err(e) => Err(CacheError::Database(format!("Query failed: {}", e))),
        }
    }

    /// Stored address of `coord`, `None` when its level is unknown or the
    /// tile lies outside the level's matrix.
    async fn stored_address(
        &self,
        table_name: &str,
        coord: TileCoord,
    ) -> CacheResult<Option<StoredAddress>> {
        let Some(matrix) = self.tile_matrix(table_name, coord.level as i64).await? else {
            return Ok(None);
        };
        if coord.row as i64 >= matrix.matrix_height || coord.col as i64 >= matrix.matrix_width {
            return Ok(None);
        }
        Ok(Some(StoredAddress {
            zoom_level: coord.level as i64,
            tile_row: container_row(matrix.matrix_height as u32, coord.row) as i64,
            tile_column: coord.col as i64,
        }))
    }

    async fn require_address(&self, table_name: &str, coord: TileCoord) -> CacheResult<StoredAddress> {
        self.stored_address(table_name, coord).await?.ok_or_else(|| {
            CacheError::invalid_parameter(
                "tile",
                format!("{} is outside the tile matrix of '{}'", coord, table_name),
            )
        })
    }
}

async fn upsert_tile(
    conn: &mut SqliteConnection,
    table_name: &str,
    address: StoredAddress,
    data: &[u8],
) -> CacheResult<i64> {
    let (id,): (i64,) = sqlx::query_as(&format!(
        r#"
        INSERT INTO {} (zoom_level, tile_column, tile_row, tile_data)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(zoom_level, tile_column, tile_row) DO UPDATE SET tile_data = excluded.tile_data
        RETURNING id
        "#,
        quote_identifier(table_name)
    ))
    .bind(address.zoom_level)
    .bind(address.tile_column)
    .bind(address.tile_row)
    .bind(data)
    .fetch_one(&mut *conn)
    .await
    .map_err(write_error("write tile"))?;
    Ok(id)
}

async fn upsert_gridded_tile(
    conn: &mut SqliteConnection,
    table_name: &str,
    tile_id: i64,
    values: &GriddedTileValues,
) -> CacheResult<()> {
    let stats = values.stats;
    sqlx::query(
        r#"
        INSERT INTO gpkg_2d_gridded_tile_ancillary
            (tpudt_name, tpudt_id, scale, "offset", min, max, mean, std_dev)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(tpudt_name, tpudt_id) DO UPDATE SET
            scale = excluded.scale,
            "offset" = excluded."offset",
            min = excluded.min,
            max = excluded.max,
            mean = excluded.mean,
            std_dev = excluded.std_dev
        "#,
    )
    .bind(table_name)
    .bind(tile_id)
    .bind(values.tile_scale.scale)
    .bind(values.tile_scale.offset)
    .bind(stats.map(|s| s.min))
    .bind(stats.map(|s| s.max))
    .bind(stats.map(|s| s.mean))
    .bind(stats.map(|s| s.std_dev))
    .execute(&mut *conn)
    .await
    .map_err(write_error("write gridded tile"))?;
    Ok(())
}
