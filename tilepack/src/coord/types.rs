//! Coordinate type definitions

use thiserror::Error;

/// Web Mercator valid latitude range
pub const MIN_LAT: f64 = -85.05112878;
pub const MAX_LAT: f64 = 85.05112878;

/// Valid longitude range
pub const MIN_LON: f64 = -180.0;
pub const MAX_LON: f64 = 180.0;

/// Deepest zoom level the tile math supports.
pub const MAX_TILE_ZOOM: u8 = 22;

/// Tile coordinates in the Web Mercator / Slippy Map system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    /// Y coordinate (north-south), 0 at north
    pub row: u32,
    /// X coordinate (east-west), 0 at west
    pub col: u32,
    /// Zoom level
    pub zoom: u8,
}

/// Errors from coordinate conversion.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordError {
    #[error("Invalid latitude: {0}")]
    InvalidLatitude(f64),

    #[error("Invalid longitude: {0}")]
    InvalidLongitude(f64),

    #[error("Invalid zoom level: {0}")]
    InvalidZoom(u8),
}
