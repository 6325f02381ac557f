//! Container schema and migrations.
//!
//! Table layout follows GeoPackage 1.2 with the 2D gridded coverage
//! extension. Cached content is described by `gpkg_contents` and friends;
//! each content's tiles live in their own table named after it.
//!
//! Logical record to physical table:
//!
//! | Record                  | Table                                                   |
//! |-------------------------|---------------------------------------------------------|
//! | spatial reference system| `gpkg_spatial_ref_sys`                                  |
//! | contents                | `gpkg_contents`                                         |
//! | tile matrix set         | `gpkg_tile_matrix_set`                                  |
//! | tile matrix             | `gpkg_tile_matrix`                                      |
//! | extension               | `gpkg_extensions`                                       |
//! | gridded coverage        | `gpkg_2d_gridded_coverage_ancillary`                    |
//! | gridded tile            | `gpkg_2d_gridded_tile_ancillary`, keyed by `tpudt_name` (tile table) and `tpudt_id` (tile row id) |
//! | web service             | `gpkg_web_service`                                      |
//! | tile                    | one table per content, `(zoom_level, tile_column, tile_row, tile_data)` |

use sqlx::SqliteConnection;
use tile_common::{CacheError, CacheResult};
use tracing::info;

/// `PRAGMA application_id` value identifying a GeoPackage ("GPKG").
pub const APPLICATION_ID: i64 = 0x4750_4B47;

pub const SPATIAL_REF_SYS: &str = "gpkg_spatial_ref_sys";
pub const CONTENTS: &str = "gpkg_contents";
pub const TILE_MATRIX_SET: &str = "gpkg_tile_matrix_set";
pub const TILE_MATRIX: &str = "gpkg_tile_matrix";
pub const EXTENSIONS: &str = "gpkg_extensions";
pub const GRIDDED_COVERAGE: &str = "gpkg_2d_gridded_coverage_ancillary";
pub const GRIDDED_TILE: &str = "gpkg_2d_gridded_tile_ancillary";
pub const WEB_SERVICE: &str = "gpkg_web_service";

/// Extension registered for every gridded coverage table.
pub const GRIDDED_COVERAGE_EXTENSION: &str = "gpkg_2d_gridded_coverage";
const GRIDDED_COVERAGE_DEFINITION: &str = "http://docs.opengeospatial.org/is/17-066r1/17-066r1.html";
const WEBP_DEFINITION: &str = "http://www.geopackage.org/spec120/#extension_tiles_webp";

/// One schema step, applied when `PRAGMA user_version` is below `version`.
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub statements: &'static [&'static str],
}

/// All migrations in order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "core tile tables",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS gpkg_spatial_ref_sys (
                srs_name TEXT NOT NULL,
                srs_id INTEGER NOT NULL PRIMARY KEY,
                organization TEXT NOT NULL,
                organization_coordsys_id INTEGER NOT NULL,
                definition TEXT NOT NULL,
                description TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS gpkg_contents (
                table_name TEXT NOT NULL PRIMARY KEY,
                data_type TEXT NOT NULL,
                identifier TEXT UNIQUE,
                description TEXT DEFAULT '',
                last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
                min_x DOUBLE,
                min_y DOUBLE,
                max_x DOUBLE,
                max_y DOUBLE,
                srs_id INTEGER,
                CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS gpkg_tile_matrix_set (
                table_name TEXT NOT NULL PRIMARY KEY,
                srs_id INTEGER NOT NULL,
                min_x DOUBLE NOT NULL,
                min_y DOUBLE NOT NULL,
                max_x DOUBLE NOT NULL,
                max_y DOUBLE NOT NULL,
                CONSTRAINT fk_gtms_table_name FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
                CONSTRAINT fk_gtms_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys (srs_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS gpkg_tile_matrix (
                table_name TEXT NOT NULL,
                zoom_level INTEGER NOT NULL,
                matrix_width INTEGER NOT NULL,
                matrix_height INTEGER NOT NULL,
                tile_width INTEGER NOT NULL,
                tile_height INTEGER NOT NULL,
                pixel_x_size DOUBLE NOT NULL,
                pixel_y_size DOUBLE NOT NULL,
                CONSTRAINT pk_ttm PRIMARY KEY (table_name, zoom_level),
                CONSTRAINT fk_tmm_table_name FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS gpkg_extensions (
                table_name TEXT,
                column_name TEXT,
                extension_name TEXT NOT NULL,
                definition TEXT NOT NULL,
                scope TEXT NOT NULL,
                CONSTRAINT ge_tce UNIQUE (table_name, column_name, extension_name)
            )
            "#,
        ],
    },
    Migration {
        version: 2,
        description: "gridded coverage extension",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS gpkg_2d_gridded_coverage_ancillary (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                tile_matrix_set_name TEXT NOT NULL UNIQUE,
                datatype TEXT NOT NULL DEFAULT 'integer',
                scale REAL NOT NULL DEFAULT 1.0,
                "offset" REAL NOT NULL DEFAULT 0.0,
                precision REAL DEFAULT 1.0,
                data_null REAL,
                grid_cell_encoding TEXT DEFAULT 'grid-value-is-center',
                uom TEXT,
                field_name TEXT DEFAULT 'Height',
                quantity_definition TEXT DEFAULT 'Height',
                CONSTRAINT fk_g2dgtct_name FOREIGN KEY (tile_matrix_set_name) REFERENCES gpkg_tile_matrix_set (table_name),
                CHECK (datatype IN ('integer', 'float'))
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS gpkg_2d_gridded_tile_ancillary (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                tpudt_name TEXT NOT NULL,
                tpudt_id INTEGER NOT NULL,
                scale REAL NOT NULL DEFAULT 1.0,
                "offset" REAL NOT NULL DEFAULT 0.0,
                min REAL DEFAULT NULL,
                max REAL DEFAULT NULL,
                mean REAL DEFAULT NULL,
                std_dev REAL DEFAULT NULL,
                CONSTRAINT fk_g2dgtat_name FOREIGN KEY (tpudt_name) REFERENCES gpkg_contents (table_name),
                UNIQUE (tpudt_name, tpudt_id)
            )
            "#,
        ],
    },
    Migration {
        version: 3,
        description: "web service bindings",
        statements: &[r#"
            CREATE TABLE IF NOT EXISTS gpkg_web_service (
                table_name TEXT NOT NULL PRIMARY KEY,
                service_type TEXT NOT NULL,
                service_address TEXT NOT NULL,
                service_metadata TEXT,
                layer_name TEXT,
                output_format TEXT,
                is_transparent INTEGER NOT NULL DEFAULT 0,
                CONSTRAINT fk_gws_table_name FOREIGN KEY (table_name) REFERENCES gpkg_contents (table_name)
            )
            "#],
    },
];

/// Schema version after every migration has run.
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// A row of `gpkg_spatial_ref_sys` every container carries.
pub struct DefaultSrs {
    pub srs_name: &'static str,
    pub srs_id: i64,
    pub organization: &'static str,
    pub organization_coordsys_id: i64,
    pub definition: &'static str,
    pub description: &'static str,
}

/// WGS 84 plus the two "undefined" systems GeoPackage requires.
pub const DEFAULT_SRS: &[DefaultSrs] = &[
    DefaultSrs {
        srs_name: "WGS 84 geodetic",
        srs_id: 4326,
        organization: "EPSG",
        organization_coordsys_id: 4326,
        definition: "GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\",SPHEROID[\"WGS 84\",6378137,298.257223563,AUTHORITY[\"EPSG\",\"7030\"]],AUTHORITY[\"EPSG\",\"6326\"]],PRIMEM[\"Greenwich\",0,AUTHORITY[\"EPSG\",\"8901\"]],UNIT[\"degree\",0.0174532925199433,AUTHORITY[\"EPSG\",\"9122\"]],AUTHORITY[\"EPSG\",\"4326\"]]",
        description: "longitude/latitude coordinates in decimal degrees on the WGS 84 spheroid",
    },
    DefaultSrs {
        srs_name: "Undefined cartesian SRS",
        srs_id: -1,
        organization: "NONE",
        organization_coordsys_id: -1,
        definition: "undefined",
        description: "undefined cartesian coordinate reference system",
    },
    DefaultSrs {
        srs_name: "Undefined geographic SRS",
        srs_id: 0,
        organization: "NONE",
        organization_coordsys_id: 0,
        definition: "undefined",
        description: "undefined geographic coordinate reference system",
    },
];

/// `srs_id` of the WGS 84 row every cached pyramid references.
pub const WGS84_SRS_ID: i64 = 4326;

/// Bring the schema up to date and make sure the default SRS rows exist.
///
/// Must run inside the caller's transaction. Safe to run repeatedly.
pub async fn migrate(conn: &mut SqliteConnection) -> CacheResult<()> {
    let (current,): (i64,) = sqlx::query_as("PRAGMA user_version")
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| CacheError::Database(format!("Failed to read schema version: {}", e)))?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        for statement in migration.statements {
            sqlx::query(statement)
                .execute(&mut *conn)
                .await
                .map_err(|e| CacheError::Database(format!("Migration failed: {}", e)))?;
        }
        info!(
            version = migration.version,
            description = migration.description,
            "Applied container migration"
        );
    }

    let latest = latest_version();
    if current < latest {
        // PRAGMA values cannot be bound parameters.
        sqlx::query(&format!("PRAGMA user_version = {}", latest))
            .execute(&mut *conn)
            .await
            .map_err(|e| CacheError::Database(format!("Failed to set schema version: {}", e)))?;
        sqlx::query(&format!("PRAGMA application_id = {}", APPLICATION_ID))
            .execute(&mut *conn)
            .await
            .map_err(|e| CacheError::Database(format!("Failed to set application id: {}", e)))?;
    }

    insert_default_srs(conn).await
}

async fn insert_default_srs(conn: &mut SqliteConnection) -> CacheResult<()> {
    for srs in DEFAULT_SRS {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO gpkg_spatial_ref_sys
                (srs_name, srs_id, organization, organization_coordsys_id, definition, description)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(srs.srs_name)
        .bind(srs.srs_id)
        .bind(srs.organization)
        .bind(srs.organization_coordsys_id)
        .bind(srs.definition)
        .bind(srs.description)
        .execute(&mut *conn)
        .await
        .map_err(|e| CacheError::Database(format!("Insert failed: {}", e)))?;
    }
    Ok(())
}

/// DDL for a per-content tile table.
pub fn create_tile_table_sql(table: &str) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            zoom_level INTEGER NOT NULL,
            tile_column INTEGER NOT NULL,
            tile_row INTEGER NOT NULL,
            tile_data BLOB NOT NULL,
            UNIQUE (zoom_level, tile_column, tile_row)
        )
        "#,
        quote_identifier(table)
    )
}

/// Extension row contents as `(extension_name, definition, scope)`.
pub fn gridded_coverage_extension() -> (&'static str, &'static str, &'static str) {
    (
        GRIDDED_COVERAGE_EXTENSION,
        GRIDDED_COVERAGE_DEFINITION,
        "read-write",
    )
}

/// Definition URL for a tile format extension.
pub fn tile_format_extension_definition(extension_name: &str) -> &'static str {
    match extension_name {
        "gpkg_webp" => WEBP_DEFINITION,
        _ => "",
    }
}

/// Quote a table name for use in SQL text.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Table name used for content called `name`.
///
/// Keeps ASCII letters, digits and underscores, replaces everything else
/// with `_`, and prefixes `_` to names starting with a digit or with the
/// reserved `gpkg_` prefix.
pub fn table_name_for(name: &str) -> String {
    let mut table: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    if table.is_empty() {
        table.push_str("content");
    }
    if table.starts_with(|c: char| c.is_ascii_digit()) || table.starts_with("gpkg_") {
        table.insert(0, '_');
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_for() {
        assert_eq!(table_name_for("Blue Marble"), "Blue_Marble");
        assert_eq!(table_name_for("srtm:30-plus"), "srtm_30_plus");
        assert_eq!(table_name_for("3dep"), "_3dep");
        assert_eq!(table_name_for("gpkg_contents"), "_gpkg_contents");
        assert_eq!(table_name_for("  "), "content");
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("tiles"), "\"tiles\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_migration_versions_increase() {
        let versions: Vec<i64> = MIGRATIONS.iter().map(|m| m.version).collect();
        assert!(versions.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(latest_version(), 3);
    }
}
