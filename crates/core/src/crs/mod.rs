//! Coordinate reference systems
//!
//! Chunk extents are always geographic lon/lat, so rasters only carry the
//! EPSG code read from (or written to) their GeoTIFF geokeys.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CRS {
    epsg: u32,
}

impl CRS {
    pub fn from_epsg(code: u32) -> Self {
        Self { epsg: code }
    }

    /// Geographic WGS84 (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    pub fn epsg(&self) -> Option<u32> {
        Some(self.epsg)
    }

    /// Whether rasters in both systems can be mosaicked without reprojection
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        self.epsg == other.epsg
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

impl Default for CRS {
    fn default() -> Self {
        Self::wgs84()
    }
}
