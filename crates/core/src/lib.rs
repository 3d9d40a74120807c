//! # specanom core
//!
//! Core types and I/O shared by every specanom crate.
//!
//! This crate provides:
//! - `Raster<T>`: generic georeferenced grid
//! - `BandSet`: ordered named bands sharing one grid (a composite)
//! - `Mask`: boolean raster used for clean / out-of-range / no-data flags
//! - `RasterStack`: per-band `(time, row, col)` cubes for one time window
//! - `Extent`: lon/lat bounding box with pixel-window selection
//! - codecs for GeoTIFF, the multi-band archive format and PNG

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{
    BandSet, CleanMask, EdgeRule, Extent, GeoTransform, Mask, PixelWindow, Raster, RasterElement,
    RasterStack,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{
        BandSet, CleanMask, EdgeRule, Extent, GeoTransform, Mask, Raster, RasterElement,
        RasterStack,
    };
}
