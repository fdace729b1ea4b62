//! Coordinate conversion module
//!
//! Converts geographic coordinates (latitude/longitude) to Web Mercator tile
//! coordinates and counts the tiles needed to cover a region. The local
//! engine uses the count as the expected resource total of a pack.

mod types;

pub use types::{CoordError, TileCoord, MAX_LAT, MAX_LON, MAX_TILE_ZOOM, MIN_LAT, MIN_LON};

use std::f64::consts::PI;

use crate::region::LatLngBounds;

/// Converts geographic coordinates to tile coordinates.
///
/// # Arguments
///
/// * `lat` - Latitude in degrees (-85.05112878 to 85.05112878)
/// * `lon` - Longitude in degrees (-180.0 to 180.0)
/// * `zoom` - Zoom level (0 to 22)
#[inline]
pub fn to_tile_coords(lat: f64, lon: f64, zoom: u8) -> Result<TileCoord, CoordError> {
    if !(MIN_LAT..=MAX_LAT).contains(&lat) {
        return Err(CoordError::InvalidLatitude(lat));
    }
    if !(MIN_LON..=MAX_LON).contains(&lon) {
        return Err(CoordError::InvalidLongitude(lon));
    }
    if zoom > MAX_TILE_ZOOM {
        return Err(CoordError::InvalidZoom(zoom));
    }

    let n = 2.0_f64.powi(zoom as i32);
    let max_index = (n as u32).saturating_sub(1);

    // lon == 180.0 lands one past the last column
    let col = (((lon + 180.0) / 360.0 * n) as u32).min(max_index);

    let lat_rad = lat * PI / 180.0;
    let row = (((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n) as u32).min(max_index);

    Ok(TileCoord { row, col, zoom })
}

/// Number of tiles covering `bounds` at a single zoom level.
///
/// Latitudes outside the Web Mercator range are clamped to it.
pub fn tiles_in_bounds(bounds: &LatLngBounds, zoom: u8) -> Result<u64, CoordError> {
    let north = bounds.northeast.lat.clamp(MIN_LAT, MAX_LAT);
    let south = bounds.southwest.lat.clamp(MIN_LAT, MAX_LAT);

    let top_left = to_tile_coords(north, bounds.southwest.lon, zoom)?;
    let bottom_right = to_tile_coords(south, bounds.northeast.lon, zoom)?;

    let cols = u64::from(bottom_right.col.saturating_sub(top_left.col)) + 1;
    let rows = u64::from(bottom_right.row.saturating_sub(top_left.row)) + 1;

    Ok(cols * rows)
}

/// Total tiles covering `bounds` across every integer zoom in
/// `[floor(min_zoom), ceil(max_zoom)]`.
pub fn tile_count(bounds: &LatLngBounds, min_zoom: f64, max_zoom: f64) -> Result<u64, CoordError> {
    let first = min_zoom.max(0.0).floor() as u8;
    let last = max_zoom.max(0.0).ceil().min(f64::from(MAX_TILE_ZOOM)) as u8;

    let mut total: u64 = 0;
    for zoom in first..=last {
        total = total.saturating_add(tiles_in_bounds(bounds, zoom)?);
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::LatLng;

    fn bounds(south: f64, west: f64, north: f64, east: f64) -> LatLngBounds {
        LatLngBounds::new(LatLng::new(south, west), LatLng::new(north, east))
    }

    #[test]
    fn test_new_york_city_at_zoom_16() {
        let tile = to_tile_coords(40.7128, -74.0060, 16).unwrap();
        assert_eq!(tile.row, 24640);
        assert_eq!(tile.col, 19295);
        assert_eq!(tile.zoom, 16);
    }

    #[test]
    fn test_invalid_latitude() {
        let result = to_tile_coords(89.0, 0.0, 5);
        assert_eq!(result, Err(CoordError::InvalidLatitude(89.0)));
    }

    #[test]
    fn test_invalid_zoom() {
        let result = to_tile_coords(0.0, 0.0, 23);
        assert_eq!(result, Err(CoordError::InvalidZoom(23)));
    }

    #[test]
    fn test_east_edge_is_clamped_to_last_column() {
        let tile = to_tile_coords(0.0, 180.0, 2).unwrap();
        assert_eq!(tile.col, 3);
    }

    #[test]
    fn test_whole_world_tile_counts() {
        let world = bounds(-90.0, -180.0, 90.0, 180.0);
        assert_eq!(tiles_in_bounds(&world, 0).unwrap(), 1);
        assert_eq!(tiles_in_bounds(&world, 1).unwrap(), 4);
        assert_eq!(tiles_in_bounds(&world, 2).unwrap(), 16);
        assert_eq!(tile_count(&world, 0.0, 2.0).unwrap(), 21);
    }

    #[test]
    fn test_small_region_at_zoom_10() {
        // cols 540..=568, rows 453..=483
        let region = bounds(10.0, 10.0, 20.0, 20.0);
        assert_eq!(tiles_in_bounds(&region, 10).unwrap(), 29 * 31);
    }

    #[test]
    fn test_fractional_zooms_cover_enclosing_levels() {
        let world = bounds(-90.0, -180.0, 90.0, 180.0);
        // 0.5..1.5 covers zooms 0, 1 and 2
        assert_eq!(tile_count(&world, 0.5, 1.5).unwrap(), 21);
    }
}
