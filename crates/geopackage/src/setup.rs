//! Creating, updating and removing cached content.
//!
//! Every operation here runs as one transaction on the writer connection,
//! so concurrent callers observe either none or all of its rows.

use crate::container::{write_error, GeoPackage};
use crate::model::{timestamp_now, Content, DataType};
use crate::schema::{self, quote_identifier, WGS84_SRS_ID};
use crate::validation::{check_compatibility, load_stored_pyramid, ContentRequirement};
use elevation_codec::CoverageEncoding;
use sqlx::SqliteConnection;
use tile_common::{
    BoundingBox, CacheError, CacheResult, ImageFormat, LevelSet, WebServiceBinding,
    COMPAT_TOLERANCE,
};
use tracing::{debug, info, instrument};

/// Column holding tile blobs in every tile table.
const TILE_DATA_COLUMN: &str = "tile_data";

impl GeoPackage {
    /// Create tiles content for `name`, or reuse it when it already exists.
    ///
    /// Existing content must be compatible with `level_set` and `format`,
    /// otherwise nothing is written and `Incompatible` is returned. Levels
    /// missing from existing content are added. Safe to call repeatedly.
    ///
    /// # Arguments
    /// * `name` - Content identifier; the table name is derived from it
    /// * `level_set` - Pyramid the tiles are addressed in
    /// * `format` - Image format the tiles will be stored in
    /// * `web_service` - Remote source to record, if any
    pub async fn setup_tiles_content(
        &self,
        name: &str,
        level_set: &LevelSet,
        format: ImageFormat,
        web_service: Option<&WebServiceBinding>,
    ) -> CacheResult<Content> {
        self.setup_pyramid(
            name,
            level_set,
            ContentRequirement::Tiles(format),
            web_service,
        )
        .await
    }

    /// Create or reuse gridded coverage content for `name`.
    pub async fn setup_gridded_coverage_content(
        &self,
        name: &str,
        level_set: &LevelSet,
        encoding: &CoverageEncoding,
        web_service: Option<&WebServiceBinding>,
    ) -> CacheResult<Content> {
        self.setup_pyramid(
            name,
            level_set,
            ContentRequirement::GriddedCoverage(encoding),
            web_service,
        )
        .await
    }

    #[instrument(skip(self, level_set, requirement, web_service))]
    async fn setup_pyramid(
        &self,
        name: &str,
        level_set: &LevelSet,
        requirement: ContentRequirement<'_>,
        web_service: Option<&WebServiceBinding>,
    ) -> CacheResult<Content> {
        let writer = self.writer("setup content")?;
        let table = schema::table_name_for(name);

        if let Some(binding) = web_service {
            check_binding_kind(&table, binding, requirement.data_type())?;
        }

        let mut tx = writer
            .begin()
            .await
            .map_err(write_error("begin transaction"))?;

        let created = match load_stored_pyramid(&mut tx, &table).await? {
            Some(stored) => {
                check_compatibility(&stored, level_set, requirement)
                    .map_err(|message| CacheError::incompatible(&table, message))?;
                false
            }
            None => {
                insert_content(&mut tx, &table, name, requirement.data_type(), &level_set.sector)
                    .await?;
                insert_tile_matrix_set(&mut tx, &table, &level_set.tile_origin).await?;
                true
            }
        };

        insert_tile_matrices(&mut tx, &table, level_set).await?;
        sqlx::query(&schema::create_tile_table_sql(&table))
            .execute(&mut *tx)
            .await
            .map_err(write_error("create tile table"))?;

        match requirement {
            ContentRequirement::Tiles(format) => {
                if let Some(extension) = format.required_extension() {
                    insert_extension(
                        &mut tx,
                        &table,
                        Some(TILE_DATA_COLUMN),
                        extension,
                        schema::tile_format_extension_definition(extension),
                        "read-write",
                    )
                    .await?;
                }
            }
            ContentRequirement::GriddedCoverage(encoding) => {
                insert_gridded_coverage(&mut tx, &table, encoding).await?;
                let (extension, definition, scope) = schema::gridded_coverage_extension();
                insert_extension(&mut tx, schema::GRIDDED_COVERAGE, None, extension, definition, scope)
                    .await?;
                insert_extension(
                    &mut tx,
                    &table,
                    Some(TILE_DATA_COLUMN),
                    extension,
                    definition,
                    scope,
                )
                .await?;
            }
        }

        if let Some(binding) = web_service {
            upsert_web_service(&mut tx, &table, binding).await?;
        }

        let content = crate::container::fetch_content(&mut tx, &table)
            .await?
            .ok_or_else(|| CacheError::NotFound(format!("content '{}'", table)))?;

        tx.commit().await.map_err(write_error("commit setup"))?;

        if created {
            info!(
                table = %table,
                data_type = requirement.data_type().as_str(),
                levels = level_set.num_levels(),
                "Created content"
            );
        } else {
            debug!(table = %table, "Reusing existing content");
        }
        Ok(content)
    }

    /// Change the identifier and data sector of existing tiles content.
    pub async fn update_tiles_content(
        &self,
        table_name: &str,
        identifier: &str,
        sector: &BoundingBox,
    ) -> CacheResult<Content> {
        self.update_content(table_name, DataType::Tiles, identifier, sector)
            .await
    }

    /// Change the identifier and data sector of an existing coverage.
    pub async fn update_gridded_coverage_content(
        &self,
        table_name: &str,
        identifier: &str,
        sector: &BoundingBox,
    ) -> CacheResult<Content> {
        self.update_content(table_name, DataType::GriddedCoverage, identifier, sector)
            .await
    }

    async fn update_content(
        &self,
        table_name: &str,
        data_type: DataType,
        identifier: &str,
        sector: &BoundingBox,
    ) -> CacheResult<Content> {
        let writer = self.writer("update content")?;
        if !sector.is_valid() {
            return Err(CacheError::validation(format!("invalid sector {}", sector)));
        }

        let mut tx = writer
            .begin()
            .await
            .map_err(write_error("begin transaction"))?;

        let stored = load_stored_pyramid(&mut tx, table_name)
            .await?
            .filter(|s| s.content.kind() == Some(data_type))
            .ok_or_else(|| {
                CacheError::NotFound(format!("{} content '{}'", data_type.as_str(), table_name))
            })?;

        if let Some(tms) = &stored.tile_matrix_set {
            let origin = tms.bounding_box();
            if !origin.contains(sector, COMPAT_TOLERANCE) {
                return Err(CacheError::validation(format!(
                    "sector {} is outside tile origin {}",
                    sector, origin
                )));
            }
        }

        sqlx::query(
            "UPDATE gpkg_contents SET identifier = ?, min_x = ?, min_y = ?, max_x = ?, max_y = ?, \
             last_change = ? WHERE table_name = ?",
        )
        .bind(identifier)
        .bind(sector.min_x)
        .bind(sector.min_y)
        .bind(sector.max_x)
        .bind(sector.max_y)
        .bind(timestamp_now())
        .bind(table_name)
        .execute(&mut *tx)
        .await
        .map_err(write_error("update content"))?;

        let content = crate::container::fetch_content(&mut tx, table_name)
            .await?
            .ok_or_else(|| CacheError::NotFound(format!("content '{}'", table_name)))?;
        tx.commit().await.map_err(write_error("commit update"))?;
        Ok(content)
    }

    /// Add any zoom levels of `level_set` that the table does not have yet.
    pub async fn setup_tile_matrices(&self, table_name: &str, level_set: &LevelSet) -> CacheResult<()> {
        let writer = self.writer("setup tile matrices")?;
        let mut tx = writer
            .begin()
            .await
            .map_err(write_error("begin transaction"))?;

        if crate::container::fetch_tile_matrix_set(&mut tx, table_name)
            .await?
            .is_none()
        {
            return Err(CacheError::NotFound(format!(
                "tile matrix set '{}'",
                table_name
            )));
        }
        insert_tile_matrices(&mut tx, table_name, level_set).await?;
        tx.commit().await.map_err(write_error("commit tile matrices"))
    }

    /// Record or replace the imagery service a tiles table is fetched from.
    pub async fn setup_web_layer(
        &self,
        table_name: &str,
        binding: &WebServiceBinding,
    ) -> CacheResult<()> {
        self.setup_web_service(table_name, binding, DataType::Tiles)
            .await
    }

    /// Record or replace the coverage service a gridded table is fetched from.
    pub async fn setup_web_coverage(
        &self,
        table_name: &str,
        binding: &WebServiceBinding,
    ) -> CacheResult<()> {
        self.setup_web_service(table_name, binding, DataType::GriddedCoverage)
            .await
    }

    async fn setup_web_service(
        &self,
        table_name: &str,
        binding: &WebServiceBinding,
        data_type: DataType,
    ) -> CacheResult<()> {
        let writer = self.writer("setup web service")?;
        check_binding_kind(table_name, binding, data_type)?;

        let mut tx = writer
            .begin()
            .await
            .map_err(write_error("begin transaction"))?;
        let content = crate::container::fetch_content(&mut tx, table_name)
            .await?
            .filter(|c| c.kind() == Some(data_type))
            .ok_or_else(|| {
                CacheError::NotFound(format!("{} content '{}'", data_type.as_str(), table_name))
            })?;
        upsert_web_service(&mut tx, &content.table_name, binding).await?;
        tx.commit().await.map_err(write_error("commit web service"))
    }

    /// Remove every tile of a table while keeping its metadata.
    #[instrument(skip(self))]
    pub async fn clear_content(&self, table_name: &str) -> CacheResult<()> {
        let writer = self.writer("clear content")?;
        let mut tx = writer
            .begin()
            .await
            .map_err(write_error("begin transaction"))?;

        if crate::container::fetch_content(&mut tx, table_name)
            .await?
            .is_none()
        {
            return Err(CacheError::NotFound(format!("content '{}'", table_name)));
        }

        sqlx::query(&format!("DROP TABLE IF EXISTS {}", quote_identifier(table_name)))
            .execute(&mut *tx)
            .await
            .map_err(write_error("drop tile table"))?;
        sqlx::query(&schema::create_tile_table_sql(table_name))
            .execute(&mut *tx)
            .await
            .map_err(write_error("create tile table"))?;
        sqlx::query("DELETE FROM gpkg_2d_gridded_tile_ancillary WHERE tpudt_name = ?")
            .bind(table_name)
            .execute(&mut *tx)
            .await
            .map_err(write_error("clear gridded tiles"))?;
        touch_content(&mut tx, table_name).await?;

        tx.commit().await.map_err(write_error("commit clear"))?;
        info!(table = %table_name, "Cleared content");
        Ok(())
    }

    /// Remove a table and all metadata describing it.
    ///
    /// Returns `false` when there was nothing to delete.
    #[instrument(skip(self))]
    pub async fn delete_content(&self, table_name: &str) -> CacheResult<bool> {
        let writer = self.writer("delete content")?;
        let mut tx = writer
            .begin()
            .await
            .map_err(write_error("begin transaction"))?;

        let existed = crate::container::fetch_content(&mut tx, table_name)
            .await?
            .is_some();

        // Children before parents so foreign keys hold at every step.
        let statements = [
            "DELETE FROM gpkg_2d_gridded_tile_ancillary WHERE tpudt_name = ?",
            "DELETE FROM gpkg_2d_gridded_coverage_ancillary WHERE tile_matrix_set_name = ?",
            "DELETE FROM gpkg_web_service WHERE table_name = ?",
            "DELETE FROM gpkg_extensions WHERE table_name = ?",
            "DELETE FROM gpkg_tile_matrix WHERE table_name = ?",
            "DELETE FROM gpkg_tile_matrix_set WHERE table_name = ?",
            "DELETE FROM gpkg_contents WHERE table_name = ?",
        ];
        for statement in statements {
            sqlx::query(statement)
                .bind(table_name)
                .execute(&mut *tx)
                .await
                .map_err(write_error("delete content metadata"))?;
        }
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", quote_identifier(table_name)))
            .execute(&mut *tx)
            .await
            .map_err(write_error("drop tile table"))?;

        tx.commit().await.map_err(write_error("commit delete"))?;
        self.matrices.invalidate_table(table_name).await;

        if existed {
            info!(table = %table_name, "Deleted content");
        }
        Ok(existed)
    }
}

// ============================================================================
// Row writers used inside setup transactions
// ============================================================================

fn check_binding_kind(
    table_name: &str,
    binding: &WebServiceBinding,
    data_type: DataType,
) -> CacheResult<()> {
    let coverage = data_type == DataType::GriddedCoverage;
    if binding.service_type.is_coverage() != coverage {
        return Err(CacheError::invalid_parameter(
            "service_type",
            format!(
                "{} cannot back {} content '{}'",
                binding.service_type,
                data_type.as_str(),
                table_name
            ),
        ));
    }
    Ok(())
}

async fn insert_content(
    conn: &mut SqliteConnection,
    table_name: &str,
    identifier: &str,
    data_type: DataType,
    sector: &BoundingBox,
) -> CacheResult<()> {
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO gpkg_contents
            (table_name, data_type, identifier, description, last_change, min_x, min_y, max_x, max_y, srs_id)
        VALUES (?, ?, ?, '', ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(table_name)
    .bind(data_type.as_str())
    .bind(identifier)
    .bind(timestamp_now())
    .bind(sector.min_x)
    .bind(sector.min_y)
    .bind(sector.max_x)
    .bind(sector.max_y)
    .bind(WGS84_SRS_ID)
    .execute(&mut *conn)
    .await
    .map_err(write_error("insert content"))?;
    Ok(())
}

async fn insert_tile_matrix_set(
    conn: &mut SqliteConnection,
    table_name: &str,
    tile_origin: &BoundingBox,
) -> CacheResult<()> {
    sqlx::query(
        "INSERT OR IGNORE INTO gpkg_tile_matrix_set (table_name, srs_id, min_x, min_y, max_x, max_y) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(table_name)
    .bind(WGS84_SRS_ID)
    .bind(tile_origin.min_x)
    .bind(tile_origin.min_y)
    .bind(tile_origin.max_x)
    .bind(tile_origin.max_y)
    .execute(&mut *conn)
    .await
    .map_err(write_error("insert tile matrix set"))?;
    Ok(())
}

async fn insert_tile_matrices(
    conn: &mut SqliteConnection,
    table_name: &str,
    level_set: &LevelSet,
) -> CacheResult<()> {
    for level in level_set.levels() {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO gpkg_tile_matrix
                (table_name, zoom_level, matrix_width, matrix_height, tile_width, tile_height, pixel_x_size, pixel_y_size)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(table_name)
        .bind(level.level_number as i64)
        .bind(level.matrix_width as i64)
        .bind(level.matrix_height as i64)
        .bind(level.tile_width as i64)
        .bind(level.tile_height as i64)
        .bind(level.pixel_x_size())
        .bind(level.pixel_y_size())
        .execute(&mut *conn)
        .await
        .map_err(write_error("insert tile matrix"))?;
    }
    Ok(())
}

async fn insert_extension(
    conn: &mut SqliteConnection,
    table_name: &str,
    column_name: Option<&str>,
    extension_name: &str,
    definition: &str,
    scope: &str,
) -> CacheResult<()> {
    // NULL columns never collide in the unique constraint, so check first.
    sqlx::query(
        r#"
        INSERT INTO gpkg_extensions (table_name, column_name, extension_name, definition, scope)
        SELECT ?, ?, ?, ?, ?
        WHERE NOT EXISTS (
            SELECT 1 FROM gpkg_extensions
            WHERE table_name = ? AND column_name IS ? AND extension_name = ?
        )
        "#,
    )
    .bind(table_name)
    .bind(column_name)
    .bind(extension_name)
    .bind(definition)
    .bind(scope)
    .bind(table_name)
    .bind(column_name)
    .bind(extension_name)
    .execute(&mut *conn)
    .await
    .map_err(write_error("insert extension"))?;
    Ok(())
}

async fn insert_gridded_coverage(
    conn: &mut SqliteConnection,
    table_name: &str,
    encoding: &CoverageEncoding,
) -> CacheResult<()> {
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO gpkg_2d_gridded_coverage_ancillary
            (tile_matrix_set_name, datatype, scale, "offset", precision, data_null)
        VALUES (?, ?, ?, ?, 1.0, ?)
        "#,
    )
    .bind(table_name)
    .bind(encoding.datatype.as_str())
    .bind(encoding.data_scale)
    .bind(encoding.data_offset)
    .bind(encoding.data_null)
    .execute(&mut *conn)
    .await
    .map_err(write_error("insert gridded coverage"))?;
    Ok(())
}

async fn upsert_web_service(
    conn: &mut SqliteConnection,
    table_name: &str,
    binding: &WebServiceBinding,
) -> CacheResult<()> {
    sqlx::query(
        r#"
        INSERT INTO gpkg_web_service
            (table_name, service_type, service_address, service_metadata, layer_name, output_format, is_transparent)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(table_name) DO UPDATE SET
            service_type = excluded.service_type,
            service_address = excluded.service_address,
            service_metadata = excluded.service_metadata,
            layer_name = excluded.layer_name,
            output_format = excluded.output_format,
            is_transparent = excluded.is_transparent
        "#,
    )
    .bind(table_name)
    .bind(binding.service_type.as_str())
    .bind(&binding.service_address)
    .bind(&binding.service_metadata)
    .bind(&binding.layer_name)
    .bind(&binding.output_format)
    .bind(binding.is_transparent)
    .execute(&mut *conn)
    .await
    .map_err(write_error("write web service"))?;
    Ok(())
}

/// Set `last_change` of a content row to now.
pub(crate) async fn touch_content(conn: &mut SqliteConnection, table_name: &str) -> CacheResult<()> {
    sqlx::query("UPDATE gpkg_contents SET last_change = ? WHERE table_name = ?")
        .bind(timestamp_now())
        .bind(table_name)
        .execute(&mut *conn)
        .await
        .map_err(write_error("update last change"))?;
    Ok(())
}
