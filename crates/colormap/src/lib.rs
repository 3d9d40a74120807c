//! # specanom colormap
//!
//! Color mapping and layered RGBA rendering for change products.
//!
//! Provides the diverging schemes used for difference rasters (red-yellow-green
//! by default) on top of a generic multi-stop interpolation engine, plus an
//! [`RgbaCanvas`] that stacks flat-color layers over a colormapped base.
//!
//! ## Usage
//!
//! ```ignore
//! use specanom_colormap::{ColorScheme, ColormapParams, RgbaCanvas, Rgba};
//!
//! let params = ColormapParams::with_range(ColorScheme::RdYlGn, -2.0, 2.0);
//! let mut canvas = RgbaCanvas::from_raster(&difference, &params);
//! canvas.paint(&out_of_range, Rgba::OUT_OF_COMPOSITE)?;
//! let bytes = canvas.into_raw();
//! ```

mod render;
mod scheme;

pub use render::{normalize, ColormapParams, RgbaCanvas};
pub use scheme::{evaluate, ColorScheme, ColorStop, Rgb, Rgba};
