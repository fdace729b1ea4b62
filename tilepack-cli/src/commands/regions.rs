//! Region management commands.

use std::path::{Path, PathBuf};

use console::style;
use serde_json::Value;
use tilepack::config::config_file_path;
use tilepack::region::RegionId;

use super::common::{metadata_from_pairs, print_records};
use crate::error::CliError;
use crate::runner::CliRunner;

/// List every persisted region.
pub async fn list(runner: &CliRunner, json: bool) -> Result<(), CliError> {
    let records = runner.manager().list_regions().await?;

    if json {
        let array = Value::Array(
            records
                .iter()
                .filter_map(|r| serde_json::to_value(r).ok())
                .collect(),
        );
        println!("{}", array);
    } else {
        print_records(&records);
    }
    Ok(())
}

pub async fn delete(runner: &CliRunner, id: RegionId) -> Result<(), CliError> {
    runner.log_startup("delete");
    runner.manager().delete_region(id).await?;
    println!("{} Region {} deleted", style("✓").green(), id);
    Ok(())
}

pub async fn suspend(runner: &CliRunner, id: RegionId) -> Result<(), CliError> {
    runner.log_startup("suspend");
    runner.manager().suspend_region(id).await?;
    println!("Region {} suspended", id);
    Ok(())
}

pub async fn update_metadata(
    runner: &CliRunner,
    id: RegionId,
    meta: &[String],
) -> Result<(), CliError> {
    runner.log_startup("update-metadata");
    let metadata = metadata_from_pairs(meta)?;
    let record = runner.manager().update_region_metadata(id, metadata).await?;
    println!("{}", record.to_json());
    Ok(())
}

pub async fn merge(runner: &CliRunner, path: PathBuf) -> Result<(), CliError> {
    runner.log_startup("merge");
    let records = runner.manager().merge_regions(path).await?;
    println!("Merged {} region(s)", records.len());
    print_records(&records);
    Ok(())
}

pub async fn install(runner: &CliRunner, path: PathBuf) -> Result<(), CliError> {
    runner.log_startup("install");
    let records = runner.manager().install_pack_store(path).await?;
    println!("Installed {} region(s)", records.len());
    print_records(&records);
    Ok(())
}

/// Persist a tile count limit to the config file.
pub fn limit(runner: &CliRunner, config_path: Option<&Path>, limit: u64) -> Result<(), CliError> {
    let mut config = runner.config().clone();
    config.download.tile_count_limit = limit;

    let path = config_path.map_or_else(config_file_path, Path::to_path_buf);
    config.save_to(&path)?;
    runner.manager().set_tile_count_limit(limit);

    if limit == 0 {
        println!("Tile count limit removed");
    } else {
        println!("Tile count limit set to {}", limit);
    }
    Ok(())
}
