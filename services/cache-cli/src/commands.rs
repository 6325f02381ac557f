//! Subcommand implementations.

use crate::{Command, Datatype, ListKind, WcsVersion};
use anyhow::{anyhow, bail, Context, Result};
use content_manager::{ContentManager, ElevationResult, LayerDescriptor, TileResult};
use elevation_codec::CoverageEncoding;
use serde_json::json;
use tile_common::{BoundingBox, CacheError, ImageFormat, TileCoord};
use tracing::info;

pub async fn run(manager: &ContentManager, command: Command) -> Result<()> {
    match command {
        Command::List { name, kind, json } => list(manager, name.as_deref(), kind, json).await,
        Command::AddWms {
            address,
            layers,
            name,
            no_metadata,
        } => {
            let names: Vec<&str> = layers.iter().map(String::as_str).collect();
            let remote = manager.client().wms_image_layer(&address, &names).await?;
            let name = name.unwrap_or_else(|| layers.join(","));
            let layer = manager
                .setup_image_layer_cache(&remote, &name, !no_metadata)
                .await?;
            print_layer(&layer.descriptor());
            Ok(())
        }
        Command::AddWmts {
            address,
            layer,
            name,
            no_metadata,
        } => {
            let remote = manager.client().wmts_image_layer(&address, &layer).await?;
            let name = name.unwrap_or(layer);
            let layer = manager
                .setup_image_layer_cache(&remote, &name, !no_metadata)
                .await?;
            print_layer(&layer.descriptor());
            Ok(())
        }
        Command::AddWcs {
            address,
            coverage,
            version,
            name,
            datatype,
            no_metadata,
        } => {
            let remote = match version {
                WcsVersion::V100 => manager.client().wcs100_coverage(&address, &coverage).await?,
                WcsVersion::V201 => manager.client().wcs201_coverage(&address, &coverage).await?,
            };
            let encoding = match datatype {
                Datatype::Integer => CoverageEncoding::integer(),
                Datatype::Float => CoverageEncoding::float(),
            };
            let name = name.unwrap_or(coverage);
            let coverage = manager
                .setup_elevation_coverage_cache(&remote, &name, &encoding, !no_metadata)
                .await?;
            print_layer(&coverage.descriptor().layer);
            Ok(())
        }
        Command::Fetch {
            name,
            level,
            row,
            col,
            out,
        } => {
            let coord = TileCoord::new(level, row, col);
            let bytes = fetch_tile(manager, &name, coord).await?;
            match out {
                Some(path) => {
                    tokio::fs::write(&path, &bytes)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!(path = %path.display(), bytes = bytes.len(), "Wrote tile");
                }
                None => {
                    let format = ImageFormat::from_magic(&bytes)
                        .map(|f| f.mime_type())
                        .unwrap_or("unknown");
                    println!("{} {} bytes {}", coord, bytes.len(), format);
                }
            }
            Ok(())
        }
        Command::Height { name, lon, lat } => {
            let coverage = manager.elevation_coverage(&name).await?;
            match coverage.height_at(lon, lat).await {
                Some(height) => println!("{}", height),
                None => println!("no data"),
            }
            Ok(())
        }
        Command::Seed {
            name,
            bbox,
            max_level,
            concurrency,
        } => {
            let concurrency = concurrency.unwrap_or(manager.seed_concurrency());
            let report = match manager.image_layer(&name).await {
                Ok(layer) => {
                    let sector = seed_sector(bbox.as_deref(), layer.level_set().sector)?;
                    layer.seed(&sector, max_level, concurrency).await?
                }
                Err(CacheError::NotFound(_)) => {
                    let coverage = manager.elevation_coverage(&name).await?;
                    let sector = seed_sector(bbox.as_deref(), coverage.level_set().sector)?;
                    coverage.seed(&sector, max_level, concurrency).await?
                }
                Err(e) => return Err(e.into()),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Clear { name } => {
            manager.clear_content(&name).await?;
            println!("cleared {}", name);
            Ok(())
        }
        Command::Delete { name } => {
            if !manager.delete_content(&name).await? {
                bail!("no content named '{}'", name);
            }
            println!("deleted {}", name);
            Ok(())
        }
    }
}

async fn list(
    manager: &ContentManager,
    name: Option<&str>,
    kind: ListKind,
    as_json: bool,
) -> Result<()> {
    let mut imagery = Vec::new();
    let mut elevation = Vec::new();

    if kind != ListKind::Elevation {
        imagery = manager
            .list_image_layers(name)
            .await?
            .iter()
            .map(|layer| layer.descriptor())
            .collect();
    }
    if kind != ListKind::Imagery {
        elevation = manager
            .list_elevation_coverages(name)
            .await?
            .iter()
            .map(|coverage| coverage.descriptor())
            .collect();
    }

    if as_json {
        let doc = json!({ "imagery": imagery, "elevation": elevation });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    for descriptor in &imagery {
        print_layer(descriptor);
    }
    for descriptor in &elevation {
        print_layer(&descriptor.layer);
    }
    Ok(())
}

fn print_layer(descriptor: &LayerDescriptor) {
    let source = descriptor
        .service_type
        .map(|s| s.to_string())
        .unwrap_or_else(|| "local".to_string());
    let last_change = descriptor
        .last_change
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "-".to_string());
    let bbox = descriptor
        .bounding_box
        .map(|b| format!("{},{},{},{}", b.min_x, b.min_y, b.max_x, b.max_y))
        .unwrap_or_else(|| "-".to_string());

    println!(
        "{:<24} {:<20} levels={:<3} source={:<6} bbox={} changed={}",
        descriptor.name,
        descriptor.data_type.as_str(),
        descriptor.level_count,
        source,
        bbox,
        last_change
    );
}

async fn fetch_tile(manager: &ContentManager, name: &str, coord: TileCoord) -> Result<Vec<u8>> {
    match manager.image_layer(name).await {
        Ok(layer) => {
            return match layer.get_tile(coord).await {
                TileResult::Tile(bytes) => Ok(bytes),
                TileResult::Unavailable => {
                    Err(anyhow!("tile {} of '{}' is unavailable", coord, name))
                }
            };
        }
        Err(CacheError::NotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }

    let coverage = manager.elevation_coverage(name).await?;
    match coverage.get_elevation(coord).await {
        ElevationResult::Raster(raster) => Ok(raster.encode()?),
        ElevationResult::Unavailable => Err(anyhow!("tile {} of '{}' is unavailable", coord, name)),
    }
}

fn seed_sector(bbox: Option<&str>, default: BoundingBox) -> Result<BoundingBox> {
    match bbox {
        None => Ok(default),
        Some(s) => {
            let sector = BoundingBox::from_wms_string(s)
                .map_err(|e| anyhow!("Invalid --bbox '{}': {}", s, e))?;
            if !sector.is_valid() {
                bail!("Invalid --bbox '{}': empty extent", s);
            }
            Ok(sector)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_sector() {
        let global = BoundingBox::global();
        assert_eq!(seed_sector(None, global).unwrap(), global);
        assert_eq!(
            seed_sector(Some("-10,30,60,70"), global).unwrap(),
            BoundingBox::new(-10.0, 30.0, 60.0, 70.0)
        );
        assert!(seed_sector(Some("10,10,0,0"), global).is_err());
        assert!(seed_sector(Some("a,b,c,d"), global).is_err());
    }
}
