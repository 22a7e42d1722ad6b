//! Hexagonal spatial indexing (H3) used as the join key between hazard,
//! weather, and population datasets.

use h3o::{CellIndex, LatLng, Resolution};

use crate::error::{HazardError, Result};
use crate::spatial::{validate_coordinate, LonLat};

pub const DEFAULT_RESOLUTION: u8 = 7;

/// Map a point to its cell at `resolution`.
///
/// Out-of-range coordinates are rejected rather than clamped.
pub fn index(lat: f64, lon: f64, resolution: u8) -> Result<CellIndex> {
    let resolution = parse_resolution(resolution)?;
    validate_coordinate(lat, lon)?;
    let point = LatLng::new(lat, lon).map_err(|_| HazardError::InvalidCoordinate { lat, lon })?;
    Ok(point.to_cell(resolution))
}

pub fn parse_resolution(resolution: u8) -> Result<Resolution> {
    Resolution::try_from(resolution)
        .map_err(|_| HazardError::InvalidConfig(format!("H3 resolution {resolution} not in 0..=15")))
}

/// Cell center as (lat, lon).
pub fn cell_center(cell: CellIndex) -> (f64, f64) {
    let center = LatLng::from(cell);
    (center.lat(), center.lng())
}

/// Cell boundary as a `[lon, lat]` ring.
pub fn cell_boundary(cell: CellIndex) -> Vec<LonLat> {
    cell.boundary().iter().map(|v| [v.lng(), v.lat()]).collect()
}

/// An indexer bound to one resolution.
#[derive(Debug, Clone, Copy)]
pub struct SpatialIndexer {
    resolution: u8,
}

impl SpatialIndexer {
    pub fn new(resolution: u8) -> Result<Self> {
        parse_resolution(resolution)?;
        Ok(Self { resolution })
    }

    pub fn resolution(&self) -> u8 {
        self.resolution
    }

    pub fn index(&self, lat: f64, lon: f64) -> Result<CellIndex> {
        index(lat, lon, self.resolution)
    }
}

impl Default for SpatialIndexer {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
        }
    }
}
