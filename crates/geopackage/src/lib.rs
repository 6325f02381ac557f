//! SQLite tile container in GeoPackage layout.
//!
//! Holds cached imagery tiles and gridded elevation coverages, the tile
//! pyramid metadata describing them, and the remote service each was
//! fetched from. See [`GeoPackage`] for the entry point.

pub mod config;
pub mod container;
pub mod matrix_cache;
pub mod model;
pub mod schema;
pub mod setup;
pub mod tiles;
pub mod validation;

pub use config::ContainerConfig;
pub use container::GeoPackage;
pub use matrix_cache::{TileMatrixCache, TileMatrixCacheStats, TileMatrixKey};
pub use model::{
    timestamp_now, Content, DataType, Extension, GriddedCoverage, GriddedTile, GriddedTileValues,
    SpatialReferenceSystem, TileMatrix, TileMatrixSet, TileUserData, WebService,
};
pub use schema::table_name_for;
pub use validation::{check_compatibility, ContentRequirement, StoredPyramid};
