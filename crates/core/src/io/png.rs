//! PNG output for RGBA visualizations

use crate::error::{Error, Result};
use std::path::Path;

/// Encode a row-major RGBA buffer (`rows * cols * 4` bytes) as PNG
pub fn write_png<P: AsRef<Path>>(rgba: Vec<u8>, rows: usize, cols: usize, path: P) -> Result<()> {
    let image = image::RgbaImage::from_raw(cols as u32, rows as u32, rgba).ok_or(
        Error::InvalidDimensions {
            width: cols,
            height: rows,
        },
    )?;
    image
        .save_with_format(path.as_ref(), image::ImageFormat::Png)
        .map_err(|e| Error::Codec(format!("cannot write PNG: {}", e)))
}
