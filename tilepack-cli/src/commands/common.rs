//! Argument parsing and output helpers shared across commands.

use console::style;
use serde_json::Value;
use tilepack::region::{LatLngBounds, Metadata, RegionRecord};

use crate::error::CliError;

/// Parse `S,W,N,E` into bounds.
pub fn parse_bounds(s: &str) -> Result<LatLngBounds, CliError> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CliError::InvalidArgument(format!("bounds '{}': {}", s, e)))?;

    match parts.as_slice() {
        [south, west, north, east] => Ok(LatLngBounds::from([[*south, *west], [*north, *east]])),
        _ => Err(CliError::InvalidArgument(format!(
            "bounds '{}': expected four numbers S,W,N,E",
            s
        ))),
    }
}

/// Parse `key=value`. Values that are valid JSON keep their type,
/// anything else is a string.
pub fn parse_meta(s: &str) -> Result<(String, Value), CliError> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| CliError::InvalidArgument(format!("metadata '{}': expected key=value", s)))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(CliError::InvalidArgument(format!(
            "metadata '{}': empty key",
            s
        )));
    }

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

pub fn metadata_from_pairs(pairs: &[String]) -> Result<Metadata, CliError> {
    pairs.iter().map(|p| parse_meta(p)).collect()
}

/// One line per region for `tilepack list`.
pub fn format_record(record: &RegionRecord) -> String {
    let definition = record.definition();
    let bounds = definition.bounds();
    format!(
        "{:>15}  z{}-{}  [{:.4},{:.4}] [{:.4},{:.4}]  {}  {}",
        record.id(),
        definition.min_zoom(),
        definition.max_zoom(),
        bounds.southwest.lat,
        bounds.southwest.lon,
        bounds.northeast.lat,
        bounds.northeast.lon,
        definition.style_reference(),
        Value::Object(record.metadata().clone()),
    )
}

pub fn print_records(records: &[RegionRecord]) {
    if records.is_empty() {
        println!("No offline regions.");
        return;
    }

    println!(
        "{}",
        style(format!(
            "{:>15}  {:<7}  {:<37}  {}  {}",
            "ID", "ZOOM", "BOUNDS", "STYLE", "METADATA"
        ))
        .bold()
    );
    for record in records {
        println!("{}", format_record(record));
    }
}
