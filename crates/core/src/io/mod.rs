//! Raster codecs
//!
//! - `geotiff`: single-band reads of scene files and float32 multi-band writes
//!   of the final georeferenced product
//! - `archive`: lossless float64 multi-band files used for chunk artifacts and
//!   the archival product; band names survive the roundtrip
//! - `png`: RGBA visualization output

mod archive;
mod geotiff;
mod png;
mod tags;

pub use archive::{read_archive, write_archive};
pub use geotiff::{read_geotiff, write_geotiff, GeoTiffOptions};
pub use png::write_png;
