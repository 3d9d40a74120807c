//! Raster-to-RGBA rendering and flat-color layering.

use crate::scheme::{evaluate, ColorScheme, Rgb, Rgba};
use specanom_core::raster::{Mask, Raster, RasterElement};
use specanom_core::{Error, Result};

/// Parameters for colormap rendering.
#[derive(Debug, Clone)]
pub struct ColormapParams {
    /// Color scheme to use.
    pub scheme: ColorScheme,
    /// Value mapped to position 0.
    pub min: f64,
    /// Value mapped to position 1.
    pub max: f64,
    /// Color for nodata and NaN pixels. Default: fully transparent.
    pub nodata_color: Rgba,
}

impl ColormapParams {
    /// Create params with explicit min/max range.
    pub fn with_range(scheme: ColorScheme, min: f64, max: f64) -> Self {
        Self {
            scheme,
            min,
            max,
            nodata_color: Rgba::TRANSPARENT,
        }
    }
}

/// Linearly rescale `value` from `[min, max]` onto `[0, 1]`.
///
/// Values outside the domain map outside the unit interval; they are not clipped.
/// A degenerate domain maps everything to 0.
pub fn normalize(value: f64, min: f64, max: f64) -> f64 {
    let range = max - min;
    if range.abs() > f64::EPSILON {
        (value - min) / range
    } else {
        0.0
    }
}

/// Row-major RGBA pixel buffer built up in layers; later layers override earlier ones.
#[derive(Debug, Clone, PartialEq)]
pub struct RgbaCanvas {
    rows: usize,
    cols: usize,
    pixels: Vec<u8>,
}

impl RgbaCanvas {
    /// Canvas with every pixel set to `color`
    pub fn filled(rows: usize, cols: usize, color: Rgba) -> Self {
        let pixels = color.to_bytes().repeat(rows * cols);
        Self { rows, cols, pixels }
    }

    /// Colormapped base layer; nodata and NaN pixels get `params.nodata_color`
    pub fn from_raster<T: RasterElement>(raster: &Raster<T>, params: &ColormapParams) -> Self {
        let (rows, cols) = raster.shape();
        let nodata = raster.nodata();
        let mut pixels = Vec::with_capacity(rows * cols * 4);

        for val in raster.data().iter() {
            let color = if val.is_nodata(nodata) {
                params.nodata_color
            } else {
                match val.to_f64() {
                    Some(v) if v.is_finite() => {
                        let Rgb { r, g, b } =
                            evaluate(params.scheme, normalize(v, params.min, params.max));
                        Rgba::new(r, g, b, 255)
                    }
                    _ => params.nodata_color,
                }
            };
            pixels.extend_from_slice(&color.to_bytes());
        }

        Self { rows, cols, pixels }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn pixel(&self, row: usize, col: usize) -> Option<Rgba> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        let o = (row * self.cols + col) * 4;
        Some(Rgba::new(
            self.pixels[o],
            self.pixels[o + 1],
            self.pixels[o + 2],
            self.pixels[o + 3],
        ))
    }

    /// Overwrite every pixel flagged in `mask` with `color`
    pub fn paint(&mut self, mask: &Mask, color: Rgba) -> Result<()> {
        let (mr, mc) = mask.shape();
        if (mr, mc) != (self.rows, self.cols) {
            return Err(Error::SizeMismatch {
                er: self.rows,
                ec: self.cols,
                ar: mr,
                ac: mc,
            });
        }
        let bytes = color.to_bytes();
        for (i, &flag) in mask.data().iter().enumerate() {
            if flag {
                self.pixels[i * 4..i * 4 + 4].copy_from_slice(&bytes);
            }
        }
        Ok(())
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.pixels
    }
}
