//! Tile cache admin tool.
//!
//! Lists cached content, adds layers from WMS, WMTS and WCS services,
//! fetches single tiles, seeds regions and prunes content. Container and
//! HTTP settings come from the environment (`CACHE_*`, `OGC_*`), with an
//! optional `.env` file, and can be overridden on the command line.

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use content_manager::{CacheConfig, ContentManager};
use ogc_client::{ClientConfig, OgcClient};
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "tile-cache")]
#[command(about = "Manage a GeoPackage tile and elevation cache")]
struct Args {
    /// Container file
    #[arg(long, env = "CACHE_PATH")]
    cache: Option<PathBuf>,

    /// Open the container read-only
    #[arg(long)]
    read_only: bool,

    /// Tile size for pyramids negotiated from WMS and WCS services
    #[arg(long)]
    tile_size: Option<u32>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List cached imagery layers and elevation coverages
    List {
        /// Only content with this identifier or table name
        #[arg(long)]
        name: Option<String>,

        #[arg(long, value_enum, default_value = "all")]
        kind: ListKind,

        /// Print descriptors as JSON
        #[arg(long)]
        json: bool,
    },

    /// Cache one or more WMS layers, composited in one request
    AddWms {
        #[arg(long)]
        address: String,

        /// Comma separated layer names
        #[arg(long, value_delimiter = ',', required = true)]
        layers: Vec<String>,

        /// Content name, the joined layer names by default
        #[arg(long)]
        name: Option<String>,

        /// Do not record the service, leaving the content cache-only
        #[arg(long)]
        no_metadata: bool,
    },

    /// Cache a WMTS layer
    AddWmts {
        #[arg(long)]
        address: String,

        #[arg(long)]
        layer: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        no_metadata: bool,
    },

    /// Cache a WCS elevation coverage
    AddWcs {
        #[arg(long)]
        address: String,

        #[arg(long)]
        coverage: String,

        #[arg(long, value_enum, default_value = "2.0.1")]
        version: WcsVersion,

        #[arg(long)]
        name: Option<String>,

        /// How heights are stored in the container
        #[arg(long, value_enum, default_value = "integer")]
        datatype: Datatype,

        #[arg(long)]
        no_metadata: bool,
    },

    /// Get one tile, fetching it on a miss
    Fetch {
        #[arg(long)]
        name: String,

        #[arg(long)]
        level: u32,

        #[arg(long)]
        row: u32,

        #[arg(long)]
        col: u32,

        /// Write the tile here instead of printing a summary
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Height at a position from an elevation coverage
    Height {
        #[arg(long)]
        name: String,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
    },

    /// Prefetch every tile in a region up to a level
    Seed {
        #[arg(long)]
        name: String,

        /// Region as min_lon,min_lat,max_lon,max_lat
        #[arg(long, allow_hyphen_values = true)]
        bbox: Option<String>,

        #[arg(long)]
        max_level: u32,

        /// Tiles fetched at once
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Remove cached tiles, keeping the content
    Clear {
        #[arg(long)]
        name: String,
    },

    /// Remove content and its metadata
    Delete {
        #[arg(long)]
        name: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ListKind {
    All,
    Imagery,
    Elevation,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum WcsVersion {
    #[value(name = "1.0.0")]
    V100,
    #[value(name = "2.0.1")]
    V201,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Datatype {
    Integer,
    Float,
}

fn init_tracing(log_level: &str, json: bool) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args.log_level, args.json_logs)?;

    let mut config = CacheConfig::from_env();
    if let Some(path) = args.cache {
        config.path = path;
    }
    if args.read_only {
        config.read_only = true;
    }
    if let Some(tile_size) = args.tile_size {
        config.tile_size = tile_size;
    }
    debug!(?config, "Cache configuration");

    let client_config = ClientConfig::from_env();
    client_config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid client configuration: {}", e))?;
    let client = OgcClient::new(&client_config).context("Failed to create HTTP client")?;

    let manager = ContentManager::open(&config, client)
        .await
        .with_context(|| format!("Failed to open cache {}", config.path.display()))?;

    let result = commands::run(&manager, args.command).await;
    manager.container().close().await;
    result
}
