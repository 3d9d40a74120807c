//! Geographic extents and their mapping onto pixel grids

use crate::error::{Error, Result};
use crate::raster::GeoTransform;
use serde::{Deserialize, Serialize};

/// A lon/lat bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

/// Which maximum edges of an extent are closed.
///
/// Extents own `[min, max)` on both axes by default. Tiles on the east or north
/// border of a tiling close that edge so the border line still has an owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EdgeRule {
    pub include_max_lon: bool,
    pub include_max_lat: bool,
}

impl EdgeRule {
    /// Both maximum edges closed: the rule for a stand-alone extent
    pub const CLOSED: Self = Self {
        include_max_lon: true,
        include_max_lat: true,
    };
}

/// A rectangular block of pixels: top-left `(row, col)` plus size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub row: usize,
    pub col: usize,
    pub rows: usize,
    pub cols: usize,
}

impl Extent {
    pub fn new(min_lon: f64, max_lon: f64, min_lat: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            max_lon,
            min_lat,
            max_lat,
        }
    }

    /// Reject non-finite or degenerate (min >= max) bounds
    pub fn validate(&self) -> Result<()> {
        let finite = [self.min_lon, self.max_lon, self.min_lat, self.max_lat]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(Error::InvalidParameter {
                name: "extent",
                value: format!("{:?}", self),
                reason: "bounds must be finite".into(),
            });
        }
        if self.min_lon >= self.max_lon {
            return Err(Error::InvalidParameter {
                name: "longitude",
                value: format!("({}, {})", self.min_lon, self.max_lon),
                reason: "min must be lower than max".into(),
            });
        }
        if self.min_lat >= self.max_lat {
            return Err(Error::InvalidParameter {
                name: "latitude",
                value: format!("({}, {})", self.min_lat, self.max_lat),
                reason: "min must be lower than max".into(),
            });
        }
        Ok(())
    }

    /// Point membership under the given edge rule
    pub fn contains(&self, lon: f64, lat: f64, edges: EdgeRule) -> bool {
        let lon_ok = lon >= self.min_lon
            && (lon < self.max_lon || (edges.include_max_lon && lon == self.max_lon));
        let lat_ok = lat >= self.min_lat
            && (lat < self.max_lat || (edges.include_max_lat && lat == self.max_lat));
        lon_ok && lat_ok
    }

    /// Pixels of a north-up grid whose centers fall inside this extent.
    ///
    /// Uses the same half-open rule as [`Extent::contains`], so adjacent
    /// extents sharing a boundary value never select the same pixel.
    /// Returns `None` for rotated grids or when no pixel center is inside.
    pub fn pixel_window(
        &self,
        transform: &GeoTransform,
        rows: usize,
        cols: usize,
        edges: EdgeRule,
    ) -> Option<PixelWindow> {
        if !transform.is_north_up() {
            return None;
        }

        // Fractional index whose pixel center sits exactly on the coordinate.
        let col_at = |lon: f64| (lon - transform.origin_x) / transform.pixel_width - 0.5;
        let row_at = |lat: f64| (lat - transform.origin_y) / transform.pixel_height - 0.5;

        let col_start = col_at(self.min_lon).ceil();
        let col_end = if edges.include_max_lon {
            col_at(self.max_lon).floor() + 1.0
        } else {
            col_at(self.max_lon).ceil()
        };

        // Rows grow southwards: the north edge bounds the first row.
        let row_start = if edges.include_max_lat {
            row_at(self.max_lat).ceil()
        } else {
            row_at(self.max_lat).floor() + 1.0
        };
        let row_end = row_at(self.min_lat).floor() + 1.0;

        let clamp = |v: f64, hi: usize| -> usize {
            if v.is_nan() || v <= 0.0 {
                0
            } else {
                (v as usize).min(hi)
            }
        };

        let (r0, r1) = (clamp(row_start, rows), clamp(row_end, rows));
        let (c0, c1) = (clamp(col_start, cols), clamp(col_end, cols));
        if r0 >= r1 || c0 >= c1 {
            return None;
        }

        Some(PixelWindow {
            row: r0,
            col: c0,
            rows: r1 - r0,
            cols: c1 - c0,
        })
    }
}
