//! Raster data structures and operations

mod bands;
mod element;
mod extent;
mod geotransform;
mod grid;
mod mask;
mod stack;

pub use bands::BandSet;
pub use element::RasterElement;
pub use extent::{EdgeRule, Extent, PixelWindow};
pub use geotransform::GeoTransform;
pub use grid::{Raster, RasterStatistics};
pub use mask::Mask;
pub use stack::{CleanMask, RasterStack};
