//! Clean masks: which observations may feed a composite
//!
//! Three independent flags are evaluated per pixel-per-time:
//! - the sensor's own quality mask ([`SensorMask`], e.g. a QA-band bit test)
//! - physical plausibility of every present reflectance band
//! - the no-data sentinel on the reference band
//!
//! [`CleanMaskRule`] decides how they combine.

use ndarray::{Array2, Array3, Zip};
use serde::{Deserialize, Serialize};
use specanom_core::raster::{BandSet, CleanMask, Mask, RasterStack};
use specanom_core::{Error, Result};

/// Reflectance bands subject to the plausibility test, when present.
pub const REFLECTANCE_BANDS: &[&str] = &["red", "green", "blue", "nir", "swir1", "swir2"];

/// Open interval a plausible surface reflectance lies in.
pub const REFLECTANCE_RANGE: (f64, f64) = (0.0, 10000.0);

/// How the validity flags combine into one clean flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanMaskRule {
    /// A sample is clean only if no flag excludes it
    #[default]
    AllValid,
    /// A sample is clean if any flag admits it
    AnyValid,
}

impl CleanMaskRule {
    fn combine(self, a: bool, b: bool) -> bool {
        match self {
            CleanMaskRule::AllValid => a && b,
            CleanMaskRule::AnyValid => a || b,
        }
    }
}

/// Sensor-native validity of each sample of a stack
pub trait SensorMask: Send + Sync + std::fmt::Debug {
    /// `(time, row, col)` flags, `true` where the sensor considers the sample valid
    fn valid(&self, stack: &RasterStack) -> Result<Array3<bool>>;

    /// Bands the mask reads, which must be loaded with the stack
    fn required_bands(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Sensor mask that accepts everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl SensorMask for AcceptAll {
    fn valid(&self, stack: &RasterStack) -> Result<Array3<bool>> {
        let (rows, cols) = stack.shape();
        Ok(Array3::from_elem((stack.len(), rows, cols), true))
    }
}

/// Pixel-QA bit test: a sample is valid when any accepted bit is set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaBitMask {
    pub band: String,
    pub accepted_bits: Vec<u8>,
}

impl QaBitMask {
    pub fn new(band: impl Into<String>, accepted_bits: Vec<u8>) -> Self {
        Self {
            band: band.into(),
            accepted_bits,
        }
    }

    fn bit_mask(&self) -> Result<u32> {
        self.accepted_bits.iter().try_fold(0u32, |acc, &bit| {
            if bit >= 32 {
                return Err(Error::InvalidParameter {
                    name: "accepted_bits",
                    value: bit.to_string(),
                    reason: "QA bits are numbered 0..32".into(),
                });
            }
            Ok(acc | (1 << bit))
        })
    }
}

impl SensorMask for QaBitMask {
    fn valid(&self, stack: &RasterStack) -> Result<Array3<bool>> {
        let bits = self.bit_mask()?;
        let qa = stack.require(&self.band)?;
        Ok(qa.mapv(|v| v.is_finite() && v >= 0.0 && (v as u32) & bits != 0))
    }

    fn required_bands(&self) -> Vec<String> {
        vec![self.band.clone()]
    }
}

fn plausible(v: f64) -> bool {
    v > REFLECTANCE_RANGE.0 && v < REFLECTANCE_RANGE.1
}

/// `true` where every present reflectance band lies strictly inside [`REFLECTANCE_RANGE`]
pub fn plausible_stack(stack: &RasterStack) -> Array3<bool> {
    let (rows, cols) = stack.shape();
    let mut out = Array3::from_elem((stack.len(), rows, cols), true);
    for name in REFLECTANCE_BANDS {
        if let Some(cube) = stack.band(name) {
            Zip::from(&mut out).and(cube).for_each(|o, &v| *o = *o && plausible(v));
        }
    }
    out
}

/// Composite-level counterpart of [`plausible_stack`]
pub fn plausible_bands(bands: &BandSet) -> Mask {
    let (rows, cols) = bands.shape().unwrap_or((0, 0));
    let mut out = Array2::from_elem((rows, cols), true);
    for name in REFLECTANCE_BANDS {
        if let Some(band) = bands.get(name) {
            Zip::from(&mut out)
                .and(band.data())
                .for_each(|o, &v| *o = *o && plausible(v));
        }
    }
    Mask::from_array(out)
}

/// Per-sample clean mask of a stack.
///
/// The reference band is the first band of the stack.
pub fn stack_clean_mask(
    stack: &RasterStack,
    sensor: &dyn SensorMask,
    no_data: f64,
    rule: CleanMaskRule,
) -> Result<CleanMask> {
    let reference = stack
        .band_names()
        .first()
        .ok_or_else(|| Error::Other("stack without bands".into()))?;
    let reference = stack.require(reference)?;

    let sensor_valid = sensor.valid(stack)?;
    if sensor_valid.dim() != reference.dim() {
        let (_, er, ec) = reference.dim();
        let (_, ar, ac) = sensor_valid.dim();
        return Err(Error::SizeMismatch { er, ec, ar, ac });
    }
    let plausible = plausible_stack(stack);

    let mut clean = Array3::from_elem(reference.dim(), false);
    Zip::from(&mut clean)
        .and(&sensor_valid)
        .and(&plausible)
        .and(reference)
        .for_each(|c, &s, &p, &r| {
            *c = rule.combine(rule.combine(s, p), r != no_data);
        });
    Ok(clean)
}

/// Clean flag of a composite, with `reference` as the proxy band for no-data
pub fn composite_clean_mask(
    composite: &BandSet,
    reference: &str,
    no_data: f64,
    rule: CleanMaskRule,
) -> Result<Mask> {
    let reference = composite.require(reference)?;
    let mut clean = plausible_bands(composite).data().clone();
    Zip::from(&mut clean)
        .and(reference.data())
        .for_each(|c, &r| *c = rule.combine(*c, r != no_data));
    Ok(Mask::from_array(clean))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ndarray::array;
    use specanom_core::raster::Raster;

    const ND: f64 = -9999.0;

    fn stack(red: [f64; 2], qa: [f64; 2]) -> RasterStack {
        let scenes = (0..2)
            .map(|t| {
                let mut b = BandSet::new();
                b.insert("red", Raster::filled(1, 1, red[t])).unwrap();
                b.insert("pixel_qa", Raster::filled(1, 1, qa[t])).unwrap();
                (Utc.with_ymd_and_hms(2020, 1, 1 + t as u32, 0, 0, 0).unwrap(), b)
            })
            .collect();
        RasterStack::from_scenes(scenes, &["red", "pixel_qa"]).unwrap()
    }

    #[test]
    fn qa_bits_accept_any_listed_bit() {
        let s = stack([500.0, 500.0], [66.0, 2.0]);
        // bit 6 set in 66, only bit 1 in 2
        let valid = QaBitMask::new("pixel_qa", vec![6]).valid(&s).unwrap();
        assert_eq!(valid.as_slice().unwrap(), &[true, false]);
        let valid = QaBitMask::new("pixel_qa", vec![1, 6]).valid(&s).unwrap();
        assert_eq!(valid.as_slice().unwrap(), &[true, true]);
    }

    #[test]
    fn qa_bit_out_of_range_rejected() {
        let s = stack([500.0, 500.0], [1.0, 1.0]);
        assert!(QaBitMask::new("pixel_qa", vec![40]).valid(&s).is_err());
    }

    #[test]
    fn implausible_reflectance_excluded() {
        let s = stack([0.0, 10000.0], [66.0, 66.0]);
        let p = plausible_stack(&s);
        assert_eq!(p.as_slice().unwrap(), &[false, false]);
        let s = stack([1.0, 9999.0], [66.0, 66.0]);
        assert!(plausible_stack(&s).iter().all(|&v| v));
    }

    #[test]
    fn all_valid_rule_excludes_any_flag() {
        // t0: sentinel on reference; t1: sensor rejects
        let s = stack([ND, 800.0], [66.0, 2.0]);
        let sensor = QaBitMask::new("pixel_qa", vec![6]);
        let clean = stack_clean_mask(&s, &sensor, ND, CleanMaskRule::AllValid).unwrap();
        assert_eq!(clean.as_slice().unwrap(), &[false, false]);

        let s = stack([700.0, 800.0], [66.0, 66.0]);
        let clean = stack_clean_mask(&s, &sensor, ND, CleanMaskRule::AllValid).unwrap();
        assert_eq!(clean.as_slice().unwrap(), &[true, true]);
    }

    #[test]
    fn any_valid_rule_admits_on_one_flag() {
        let s = stack([ND, 800.0], [66.0, 2.0]);
        let sensor = QaBitMask::new("pixel_qa", vec![6]);
        let clean = stack_clean_mask(&s, &sensor, ND, CleanMaskRule::AnyValid).unwrap();
        // t1 fails the sensor test but is plausible and not the sentinel
        assert_eq!(clean.as_slice().unwrap(), &[true, true]);
    }

    #[test]
    fn composite_clean_uses_reference_band() {
        let mut c = BandSet::new();
        c.insert("red", Raster::from_array(array![[ND, 500.0, 20000.0]]))
            .unwrap();
        let clean = composite_clean_mask(&c, "red", ND, CleanMaskRule::AllValid).unwrap();
        assert_eq!(clean.data(), &array![[false, true, false]]);
        assert!(composite_clean_mask(&c, "nir", ND, CleanMaskRule::AllValid).is_err());
    }
}
