//! Compositing: reduce a time stack to one multi-band raster
//!
//! Every method only looks at samples flagged clean and writes the no-data
//! sentinel where a pixel has none.

use ndarray::{Array2, Array3, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use specanom_core::raster::{BandSet, CleanMask, Raster, RasterStack};
use specanom_core::{Error, Result};

/// A time-axis reduction over the clean samples of a stack
pub trait CompositeMethod: Send + Sync {
    fn name(&self) -> &'static str;

    /// Bands the method needs beyond the requested measurements
    fn required_bands(&self) -> &'static [&'static str] {
        &[]
    }

    /// One output band per stack band, carrying `no_data` as its nodata value
    fn compose(&self, stack: &RasterStack, clean: &CleanMask, no_data: f64) -> Result<BandSet>;
}

/// Named composite methods, as they appear in parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeKind {
    #[default]
    MostRecent,
    Median,
    MaxNdvi,
}

impl CompositeKind {
    pub fn method(self) -> Box<dyn CompositeMethod> {
        match self {
            CompositeKind::MostRecent => Box::new(MostRecent),
            CompositeKind::Median => Box::new(Median),
            CompositeKind::MaxNdvi => Box::new(MaxNdvi),
        }
    }
}

/// Latest clean sample per pixel
#[derive(Debug, Clone, Copy, Default)]
pub struct MostRecent;

/// Per-band median of the clean samples
#[derive(Debug, Clone, Copy, Default)]
pub struct Median;

/// Sample with the greatest NDVI among the clean ones
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxNdvi;

impl CompositeMethod for MostRecent {
    fn name(&self) -> &'static str {
        "most_recent"
    }

    fn compose(&self, stack: &RasterStack, clean: &CleanMask, no_data: f64) -> Result<BandSet> {
        check_mask(stack, clean)?;
        // stacks are sorted ascending, so the last clean index is the latest
        let pick = select_time(clean, |_, row, col| {
            (0..clean.len_of(Axis(0))).rev().find(|&t| clean[[t, row, col]])
        })?;
        gather(stack, &pick, no_data)
    }
}

impl CompositeMethod for MaxNdvi {
    fn name(&self) -> &'static str {
        "max_ndvi"
    }

    fn required_bands(&self) -> &'static [&'static str] {
        &["nir", "red"]
    }

    fn compose(&self, stack: &RasterStack, clean: &CleanMask, no_data: f64) -> Result<BandSet> {
        check_mask(stack, clean)?;
        let nir = stack.require("nir")?;
        let red = stack.require("red")?;
        let pick = select_time(clean, |times, row, col| {
            let mut best: Option<(usize, f64)> = None;
            for t in 0..times {
                if !clean[[t, row, col]] {
                    continue;
                }
                let (n, r) = (nir[[t, row, col]], red[[t, row, col]]);
                let sum = n + r;
                if sum.abs() < 1e-10 {
                    continue;
                }
                let ndvi = (n - r) / sum;
                if best.map_or(true, |(_, b)| ndvi > b) {
                    best = Some((t, ndvi));
                }
            }
            best.map(|(t, _)| t)
        })?;
        gather(stack, &pick, no_data)
    }
}

impl CompositeMethod for Median {
    fn name(&self) -> &'static str {
        "median"
    }

    fn compose(&self, stack: &RasterStack, clean: &CleanMask, no_data: f64) -> Result<BandSet> {
        check_mask(stack, clean)?;
        let (times, rows, cols) = clean.dim();
        let mut out = BandSet::new();
        for name in stack.band_names() {
            let cube = stack.require(name)?;
            let data: Vec<f64> = (0..rows)
                .into_par_iter()
                .flat_map(|row| {
                    let mut samples = Vec::with_capacity(times);
                    (0..cols)
                        .map(|col| {
                            samples.clear();
                            samples.extend(
                                (0..times)
                                    .filter(|&t| clean[[t, row, col]])
                                    .map(|t| cube[[t, row, col]]),
                            );
                            median(&mut samples).unwrap_or(no_data)
                        })
                        .collect::<Vec<_>>()
                })
                .collect();
            out.insert(name.as_str(), band_raster(stack, rows, cols, data, no_data)?)?;
        }
        Ok(out)
    }
}

fn median(samples: &mut [f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    samples.sort_by(|a, b| a.total_cmp(b));
    let mid = samples.len() / 2;
    Some(if samples.len() % 2 == 0 {
        (samples[mid - 1] + samples[mid]) / 2.0
    } else {
        samples[mid]
    })
}

fn check_mask(stack: &RasterStack, clean: &CleanMask) -> Result<()> {
    let (rows, cols) = stack.shape();
    let (t, ar, ac) = clean.dim();
    if t != stack.len() || (ar, ac) != (rows, cols) {
        return Err(Error::SizeMismatch { er: rows, ec: cols, ar, ac });
    }
    Ok(())
}

/// Chosen time index per pixel, `None` where nothing qualifies
fn select_time<F>(clean: &CleanMask, pick: F) -> Result<Array2<Option<usize>>>
where
    F: Fn(usize, usize, usize) -> Option<usize> + Sync,
{
    let (times, rows, cols) = clean.dim();
    let picks: Vec<Option<usize>> = (0..rows)
        .into_par_iter()
        .flat_map(|row| (0..cols).map(|col| pick(times, row, col)).collect::<Vec<_>>())
        .collect();
    Array2::from_shape_vec((rows, cols), picks).map_err(|e| Error::Other(e.to_string()))
}

fn gather(stack: &RasterStack, pick: &Array2<Option<usize>>, no_data: f64) -> Result<BandSet> {
    let (rows, cols) = pick.dim();
    let mut out = BandSet::new();
    for name in stack.band_names() {
        let cube: &Array3<f64> = stack.require(name)?;
        let data = Array2::from_shape_fn((rows, cols), |(row, col)| {
            pick[[row, col]].map_or(no_data, |t| cube[[t, row, col]])
        });
        let mut raster = Raster::from_array(data);
        raster.set_transform(*stack.transform());
        raster.set_crs(stack.crs().copied());
        raster.set_nodata(Some(no_data));
        out.insert(name.as_str(), raster)?;
    }
    Ok(out)
}

fn band_raster(
    stack: &RasterStack,
    rows: usize,
    cols: usize,
    data: Vec<f64>,
    no_data: f64,
) -> Result<Raster<f64>> {
    let mut raster = Raster::from_vec(data, rows, cols)?;
    raster.set_transform(*stack.transform());
    raster.set_crs(stack.crs().copied());
    raster.set_nodata(Some(no_data));
    Ok(raster)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ndarray::array;

    const ND: f64 = -9999.0;

    /// Three scenes of a 1x2 grid with (red, nir) per scene
    fn stack(values: &[([f64; 2], [f64; 2])]) -> RasterStack {
        let scenes = values
            .iter()
            .enumerate()
            .map(|(t, (red, nir))| {
                let mut b = BandSet::new();
                b.insert("red", Raster::from_array(array![[red[0], red[1]]]))
                    .unwrap();
                b.insert("nir", Raster::from_array(array![[nir[0], nir[1]]]))
                    .unwrap();
                (Utc.with_ymd_and_hms(2021, 3, 1 + t as u32, 0, 0, 0).unwrap(), b)
            })
            .collect();
        RasterStack::from_scenes(scenes, &["red", "nir"]).unwrap()
    }

    fn sample_stack() -> RasterStack {
        stack(&[
            ([100.0, 200.0], [900.0, 400.0]),
            ([300.0, 250.0], [600.0, 600.0]),
            ([500.0, 260.0], [700.0, 300.0]),
        ])
    }

    #[test]
    fn most_recent_takes_latest_clean_sample() {
        let s = sample_stack();
        let mut clean = Array3::from_elem((3, 1, 2), true);
        clean[[2, 0, 0]] = false;
        let c = MostRecent.compose(&s, &clean, ND).unwrap();
        assert_eq!(c.get("red").unwrap().data(), &array![[300.0, 260.0]]);
        assert_eq!(c.get("nir").unwrap().data(), &array![[600.0, 300.0]]);
        assert_eq!(c.get("red").unwrap().nodata(), Some(ND));
    }

    #[test]
    fn no_clean_sample_yields_sentinel() {
        let s = sample_stack();
        let mut clean = Array3::from_elem((3, 1, 2), false);
        clean[[0, 0, 1]] = true;
        for kind in [CompositeKind::MostRecent, CompositeKind::Median, CompositeKind::MaxNdvi] {
            let c = kind.method().compose(&s, &clean, ND).unwrap();
            assert_eq!(c.get("red").unwrap().data(), &array![[ND, 200.0]], "{}", kind.method().name());
        }
    }

    #[test]
    fn median_of_clean_samples() {
        let s = sample_stack();
        let mut clean = Array3::from_elem((3, 1, 2), true);
        clean[[1, 0, 1]] = false;
        let c = Median.compose(&s, &clean, ND).unwrap();
        // col 0: {100,300,500}; col 1: {200,260} -> mean of the middle pair
        assert_eq!(c.get("red").unwrap().data(), &array![[300.0, 230.0]]);
    }

    #[test]
    fn max_ndvi_picks_greenest_sample() {
        let s = sample_stack();
        let clean = Array3::from_elem((3, 1, 2), true);
        let c = MaxNdvi.compose(&s, &clean, ND).unwrap();
        // col 0: t0 has ndvi 0.8; col 1: t1 has ndvi 0.41
        assert_eq!(c.get("red").unwrap().data(), &array![[100.0, 250.0]]);
        assert_eq!(c.get("nir").unwrap().data(), &array![[900.0, 600.0]]);
    }

    #[test]
    fn mismatched_mask_is_rejected() {
        let s = sample_stack();
        let clean = Array3::from_elem((2, 1, 2), true);
        assert!(MostRecent.compose(&s, &clean, ND).is_err());
    }

    #[test]
    fn max_ndvi_requires_nir_and_red() {
        assert_eq!(MaxNdvi.required_bands(), &["nir", "red"]);
        assert!(MostRecent.required_bands().is_empty());
    }
}
