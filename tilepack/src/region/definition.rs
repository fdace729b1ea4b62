//! Region definitions and their validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Deepest zoom level a region may request.
pub const MAX_ZOOM: f64 = 22.0;

/// Reasons a definition is rejected before any engine call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DefinitionError {
    #[error("coordinates must be finite numbers")]
    NonFiniteCoordinate,

    #[error("latitude {0} is outside [-90, 90]")]
    LatitudeOutOfRange(f64),

    #[error("longitude {0} is outside [-180, 180]")]
    LongitudeOutOfRange(f64),

    #[error("southwest corner ({south}, {west}) is not below/left of northeast corner ({north}, {east})")]
    InvertedBounds {
        south: f64,
        west: f64,
        north: f64,
        east: f64,
    },

    #[error("style reference is empty")]
    EmptyStyle,

    #[error("zoom {0} is outside [0, 22]")]
    ZoomOutOfRange(f64),

    #[error("min zoom {min} is greater than max zoom {max}")]
    InvertedZoom { min: f64, max: f64 },
}

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lon: f64,
}

impl LatLng {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Southwest/northeast bounding box.
///
/// Serialized as `[[sw_lat, sw_lon], [ne_lat, ne_lon]]`. Boxes crossing the
/// antimeridian are not representable: validation requires
/// `southwest.lon <= northeast.lon`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[[f64; 2]; 2]", into = "[[f64; 2]; 2]")]
pub struct LatLngBounds {
    pub southwest: LatLng,
    pub northeast: LatLng,
}

impl LatLngBounds {
    pub fn new(southwest: LatLng, northeast: LatLng) -> Self {
        Self {
            southwest,
            northeast,
        }
    }

    fn validate(&self) -> Result<(), DefinitionError> {
        for corner in [self.southwest, self.northeast] {
            if !corner.lat.is_finite() || !corner.lon.is_finite() {
                return Err(DefinitionError::NonFiniteCoordinate);
            }
            if !(-90.0..=90.0).contains(&corner.lat) {
                return Err(DefinitionError::LatitudeOutOfRange(corner.lat));
            }
            if !(-180.0..=180.0).contains(&corner.lon) {
                return Err(DefinitionError::LongitudeOutOfRange(corner.lon));
            }
        }

        if self.southwest.lat > self.northeast.lat || self.southwest.lon > self.northeast.lon {
            return Err(DefinitionError::InvertedBounds {
                south: self.southwest.lat,
                west: self.southwest.lon,
                north: self.northeast.lat,
                east: self.northeast.lon,
            });
        }

        Ok(())
    }
}

impl From<[[f64; 2]; 2]> for LatLngBounds {
    fn from(pairs: [[f64; 2]; 2]) -> Self {
        Self::new(
            LatLng::new(pairs[0][0], pairs[0][1]),
            LatLng::new(pairs[1][0], pairs[1][1]),
        )
    }
}

impl From<LatLngBounds> for [[f64; 2]; 2] {
    fn from(bounds: LatLngBounds) -> Self {
        [
            [bounds.southwest.lat, bounds.southwest.lon],
            [bounds.northeast.lat, bounds.northeast.lon],
        ]
    }
}

/// What to download: bounds, style and zoom range.
///
/// Immutable after construction. [`validate`](Self::validate) is a separate
/// step so that definitions read back from an engine are never rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionDefinition {
    bounds: LatLngBounds,
    #[serde(alias = "mapStyleUrl")]
    style_reference: String,
    min_zoom: f64,
    max_zoom: f64,
}

impl RegionDefinition {
    pub fn new(
        bounds: LatLngBounds,
        style_reference: impl Into<String>,
        min_zoom: f64,
        max_zoom: f64,
    ) -> Self {
        Self {
            bounds,
            style_reference: style_reference.into(),
            min_zoom,
            max_zoom,
        }
    }

    pub fn bounds(&self) -> &LatLngBounds {
        &self.bounds
    }

    pub fn style_reference(&self) -> &str {
        &self.style_reference
    }

    pub fn min_zoom(&self) -> f64 {
        self.min_zoom
    }

    pub fn max_zoom(&self) -> f64 {
        self.max_zoom
    }

    /// Check bounds ordering, zoom ordering and the style reference.
    ///
    /// Longitude wraparound is not handled; a box crossing the antimeridian
    /// fails with [`DefinitionError::InvertedBounds`].
    pub fn validate(&self) -> Result<(), DefinitionError> {
        self.bounds.validate()?;

        if self.style_reference.trim().is_empty() {
            return Err(DefinitionError::EmptyStyle);
        }

        for zoom in [self.min_zoom, self.max_zoom] {
            if !zoom.is_finite() || !(0.0..=MAX_ZOOM).contains(&zoom) {
                return Err(DefinitionError::ZoomOutOfRange(zoom));
            }
        }
        if self.min_zoom > self.max_zoom {
            return Err(DefinitionError::InvertedZoom {
                min: self.min_zoom,
                max: self.max_zoom,
            });
        }

        Ok(())
    }
}
