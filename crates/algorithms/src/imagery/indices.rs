//! Spectral indices on composites
//!
//! Inputs are surface reflectance on a 0–10000 scale. Every index writes the
//! no-data sentinel wherever an input is the sentinel (or NaN) or the formula
//! is undefined.

use std::fmt;
use std::str::FromStr;

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use specanom_core::raster::{BandSet, Mask, Raster};
use specanom_core::{Error, Result};

use super::fractional_cover::FractionalCover;

/// Derives index band(s) from a composite
pub trait SpectralIndexFn: Send + Sync {
    /// `clean` is the composite-level clean flag; `no_data` the sentinel to write.
    fn compute(&self, composite: &BandSet, clean: &Mask, no_data: f64) -> Result<BandSet>;
}

/// Supported spectral indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpectralIndex {
    /// Normalized Difference Vegetation Index
    #[default]
    Ndvi,
    /// Normalized Difference Water Index (McFeeters)
    Ndwi,
    /// Normalized Difference Built-up Index
    Ndbi,
    /// Enhanced Vegetation Index
    Evi,
    /// Bare soil / green / dry vegetation cover percentages
    FractionalCover,
}

impl SpectralIndex {
    pub const ALL: &[SpectralIndex] = &[
        Self::Ndvi,
        Self::Ndwi,
        Self::Ndbi,
        Self::Evi,
        Self::FractionalCover,
    ];

    /// Parameter key, also the band name of single-band indices
    pub fn key(&self) -> &'static str {
        match self {
            Self::Ndvi => "ndvi",
            Self::Ndwi => "ndwi",
            Self::Ndbi => "ndbi",
            Self::Evi => "evi",
            Self::FractionalCover => "fractional_cover",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Ndvi => "NDVI",
            Self::Ndwi => "NDWI",
            Self::Ndbi => "NDBI",
            Self::Evi => "EVI",
            Self::FractionalCover => "Fractional Cover",
        }
    }

    /// Bands the index adds to a composite
    pub fn output_bands(&self) -> &'static [&'static str] {
        match self {
            Self::Ndvi => &["ndvi"],
            Self::Ndwi => &["ndwi"],
            Self::Ndbi => &["ndbi"],
            Self::Evi => &["evi"],
            Self::FractionalCover => &["bs", "pv", "npv"],
        }
    }

    /// Band shown in the color-coded product
    pub fn visualization_band(&self) -> &'static str {
        match self {
            Self::FractionalCover => "pv",
            other => other.output_bands()[0],
        }
    }

    /// Measurements the index reads
    pub fn required_bands(&self) -> &'static [&'static str] {
        match self {
            Self::Ndvi => &["nir", "red"],
            Self::Ndwi => &["green", "nir"],
            Self::Ndbi => &["swir1", "nir"],
            Self::Evi => &["nir", "red", "blue"],
            Self::FractionalCover => &["red", "nir", "swir1", "swir2"],
        }
    }

    /// Theoretical value range of the published index
    pub fn logical_range(&self) -> (f64, f64) {
        match self {
            Self::FractionalCover => (0.0, 100.0),
            _ => (-1.0, 1.0),
        }
    }

    /// Native range of the raw output, when it differs from the logical range
    pub fn working_range(&self) -> Option<(f64, f64)> {
        match self {
            Self::FractionalCover => Some((0.0, 106.0)),
            _ => None,
        }
    }

    /// Range a difference of two index values can take
    pub fn difference_range(&self) -> (f64, f64) {
        let (lo, hi) = self.logical_range();
        (lo - hi, hi - lo)
    }

    /// Resolve the reference implementation of this index
    pub fn function(&self) -> Box<dyn SpectralIndexFn> {
        match self {
            Self::Ndvi => Box::new(NormalizedDifference::new("ndvi", "nir", "red")),
            Self::Ndwi => Box::new(NormalizedDifference::new("ndwi", "green", "nir")),
            Self::Ndbi => Box::new(NormalizedDifference::new("ndbi", "swir1", "nir")),
            Self::Evi => Box::new(Evi::default()),
            Self::FractionalCover => Box::new(FractionalCover::default()),
        }
    }
}

impl fmt::Display for SpectralIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for SpectralIndex {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        Self::ALL
            .iter()
            .copied()
            .find(|i| i.key() == key)
            .ok_or_else(|| Error::InvalidParameter {
                name: "spectral_index",
                value: s.to_string(),
                reason: "expected one of ndvi, ndwi, ndbi, evi, fractional_cover".into(),
            })
    }
}

// ---------------------------------------------------------------------------
// Normalized difference (NDVI, NDWI, NDBI)
// ---------------------------------------------------------------------------

/// `(a - b) / (a + b)`, written to band `name`
#[derive(Debug, Clone)]
pub struct NormalizedDifference {
    pub name: &'static str,
    pub band_a: &'static str,
    pub band_b: &'static str,
}

impl NormalizedDifference {
    pub fn new(name: &'static str, band_a: &'static str, band_b: &'static str) -> Self {
        Self { name, band_a, band_b }
    }
}

impl SpectralIndexFn for NormalizedDifference {
    fn compute(&self, composite: &BandSet, _clean: &Mask, no_data: f64) -> Result<BandSet> {
        let a = composite.require(self.band_a)?;
        let b = composite.require(self.band_b)?;
        let out = per_pixel([a, b], no_data, |[a, b]| {
            let sum = a + b;
            if sum.abs() < 1e-10 {
                return None;
            }
            Some((a - b) / sum)
        })?;
        single(self.name, out)
    }
}

// ---------------------------------------------------------------------------
// EVI
// ---------------------------------------------------------------------------

/// Enhanced Vegetation Index (Huete et al., 2002)
///
/// `EVI = G * (NIR - Red) / (NIR + C1 * Red - C2 * Blue + L)` on reflectance
/// scaled to 0–1. Values outside [-1, 1] are written as the sentinel.
#[derive(Debug, Clone)]
pub struct Evi {
    /// Gain factor (default: 2.5)
    pub g: f64,
    /// Aerosol coefficient for red band (default: 6.0)
    pub c1: f64,
    /// Aerosol coefficient for blue band (default: 7.5)
    pub c2: f64,
    /// Canopy background adjustment (default: 1.0)
    pub l: f64,
    /// Divisor bringing inputs onto 0–1 (default: 10000)
    pub scale: f64,
}

impl Default for Evi {
    fn default() -> Self {
        Self {
            g: 2.5,
            c1: 6.0,
            c2: 7.5,
            l: 1.0,
            scale: 10000.0,
        }
    }
}

impl SpectralIndexFn for Evi {
    fn compute(&self, composite: &BandSet, _clean: &Mask, no_data: f64) -> Result<BandSet> {
        let nir = composite.require("nir")?;
        let red = composite.require("red")?;
        let blue = composite.require("blue")?;
        let out = per_pixel([nir, red, blue], no_data, |[n, r, b]| {
            let (n, r, b) = (n / self.scale, r / self.scale, b / self.scale);
            let denom = n + self.c1 * r - self.c2 * b + self.l;
            if denom.abs() < 1e-10 {
                return None;
            }
            let v = self.g * (n - r) / denom;
            (-1.0..=1.0).contains(&v).then_some(v)
        })?;
        single("evi", out)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn single(name: &str, raster: Raster<f64>) -> Result<BandSet> {
    let mut out = BandSet::new();
    out.insert(name, raster)?;
    Ok(out)
}

/// Apply `f` to every pixel of equally shaped bands, in parallel by row.
///
/// A sentinel or NaN input, or `f` returning `None`, yields `no_data`.
pub(crate) fn per_pixel<const N: usize, F>(
    bands: [&Raster<f64>; N],
    no_data: f64,
    f: F,
) -> Result<Raster<f64>>
where
    F: Fn([f64; N]) -> Option<f64> + Sync,
{
    let template = bands[0];
    for band in &bands[1..] {
        check_dimensions(template, band)?;
    }
    let (rows, cols) = template.shape();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![no_data; cols];
            for (col, cell) in row_data.iter_mut().enumerate() {
                let values = bands.map(|b| b.data()[[row, col]]);
                if values.iter().any(|&v| v.is_nan() || v == no_data) {
                    continue;
                }
                if let Some(v) = f(values) {
                    *cell = v;
                }
            }
            row_data
        })
        .collect();

    build_output(template, rows, cols, data, no_data)
}

pub(crate) fn check_dimensions(a: &Raster<f64>, b: &Raster<f64>) -> Result<()> {
    if a.shape() != b.shape() {
        return Err(Error::SizeMismatch {
            er: a.rows(),
            ec: a.cols(),
            ar: b.rows(),
            ac: b.cols(),
        });
    }
    Ok(())
}

fn build_output(
    template: &Raster<f64>,
    rows: usize,
    cols: usize,
    data: Vec<f64>,
    no_data: f64,
) -> Result<Raster<f64>> {
    let data = Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    let mut output = template.with_data(data)?;
    output.set_nodata(Some(no_data));
    Ok(output)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use specanom_core::GeoTransform;

    const ND: f64 = -9999.0;

    fn composite(bands: &[(&str, f64)]) -> BandSet {
        let mut set = BandSet::new();
        for &(name, v) in bands {
            let mut r = Raster::filled(3, 3, v);
            r.set_transform(GeoTransform::new(10.0, 5.0, 0.01, -0.01));
            set.insert(name, r).unwrap();
        }
        set
    }

    fn all_clean() -> Mask {
        Mask::filled(3, 3, true)
    }

    #[test]
    fn ndvi_vegetation() {
        let c = composite(&[("nir", 5000.0), ("red", 1000.0)]);
        let out = SpectralIndex::Ndvi.function().compute(&c, &all_clean(), ND).unwrap();
        let band = out.require("ndvi").unwrap();
        assert_relative_eq!(band.get(1, 1).unwrap(), 4000.0 / 6000.0, epsilon = 1e-12);
        assert_eq!(band.nodata(), Some(ND));
        assert_eq!(band.transform(), &GeoTransform::new(10.0, 5.0, 0.01, -0.01));
    }

    #[test]
    fn ndwi_and_ndbi_band_order() {
        let c = composite(&[("green", 3000.0), ("nir", 1000.0), ("swir1", 2000.0)]);
        let ndwi = SpectralIndex::Ndwi.function().compute(&c, &all_clean(), ND).unwrap();
        assert_relative_eq!(ndwi.require("ndwi").unwrap().get(0, 0).unwrap(), 0.5);
        let ndbi = SpectralIndex::Ndbi.function().compute(&c, &all_clean(), ND).unwrap();
        assert_relative_eq!(
            ndbi.require("ndbi").unwrap().get(0, 0).unwrap(),
            1000.0 / 3000.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn sentinel_input_propagates() {
        let mut c = composite(&[("nir", 5000.0), ("red", 1000.0)]);
        let mut red = c.require("red").unwrap().clone();
        red.set(2, 2, ND).unwrap();
        c.insert("red", red).unwrap();
        let out = SpectralIndex::Ndvi.function().compute(&c, &all_clean(), ND).unwrap();
        assert_eq!(out.require("ndvi").unwrap().get(2, 2).unwrap(), ND);
        assert_ne!(out.require("ndvi").unwrap().get(0, 0).unwrap(), ND);
    }

    #[test]
    fn zero_denominator_is_sentinel() {
        let c = composite(&[("nir", 0.0), ("red", 0.0)]);
        let out = SpectralIndex::Ndvi.function().compute(&c, &all_clean(), ND).unwrap();
        assert_eq!(out.require("ndvi").unwrap().get(0, 0).unwrap(), ND);
    }

    #[test]
    fn evi_reference_value() {
        let c = composite(&[("nir", 5000.0), ("red", 1000.0), ("blue", 500.0)]);
        let out = SpectralIndex::Evi.function().compute(&c, &all_clean(), ND).unwrap();
        let expected = 2.5 * (0.5 - 0.1) / (0.5 + 6.0 * 0.1 - 7.5 * 0.05 + 1.0);
        assert_relative_eq!(out.require("evi").unwrap().get(1, 1).unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn evi_outside_unit_range_is_sentinel() {
        // strong blue drives the denominator towards zero
        let c = composite(&[("nir", 6000.0), ("red", 100.0), ("blue", 2000.0)]);
        let out = SpectralIndex::Evi.function().compute(&c, &all_clean(), ND).unwrap();
        assert_eq!(out.require("evi").unwrap().get(0, 0).unwrap(), ND);
    }

    #[test]
    fn missing_band_is_an_error() {
        let c = composite(&[("nir", 5000.0)]);
        assert!(SpectralIndex::Ndvi.function().compute(&c, &all_clean(), ND).is_err());
    }

    #[test]
    fn parse_and_describe() {
        assert_eq!("NDVI".parse::<SpectralIndex>().unwrap(), SpectralIndex::Ndvi);
        assert_eq!(
            "fractional cover".parse::<SpectralIndex>().unwrap(),
            SpectralIndex::FractionalCover
        );
        assert!("savi".parse::<SpectralIndex>().is_err());
        assert_eq!(SpectralIndex::FractionalCover.visualization_band(), "pv");
        assert_eq!(SpectralIndex::Evi.visualization_band(), "evi");
        assert_eq!(SpectralIndex::Ndvi.difference_range(), (-2.0, 2.0));
        assert_eq!(SpectralIndex::FractionalCover.difference_range(), (-100.0, 100.0));
        assert_eq!(SpectralIndex::FractionalCover.output_bands().len(), 3);
    }
}
