//! Fractional cover by linear spectral unmixing
//!
//! Each pixel's red / nir / swir1 / swir2 reflectance is modelled as a mix of
//! three endmembers (bare soil, green vegetation, dry vegetation). A heavily
//! weighted sum-to-one row is appended to the system before solving it in the
//! least-squares sense.

use specanom_core::raster::{BandSet, Mask, Raster};
use specanom_core::{Error, Result};

use super::indices::{per_pixel, SpectralIndexFn};

/// Upper bound of the native cover percentages.
pub const WORKING_MAX: f64 = 106.0;

/// Reflectance (0–1) of one pure surface type
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Endmember {
    pub red: f64,
    pub nir: f64,
    pub swir1: f64,
    pub swir2: f64,
}

impl Endmember {
    pub const fn new(red: f64, nir: f64, swir1: f64, swir2: f64) -> Self {
        Self { red, nir, swir1, swir2 }
    }

    fn as_array(&self) -> [f64; 4] {
        [self.red, self.nir, self.swir1, self.swir2]
    }
}

/// Least-squares solver for three endmember fractions
#[derive(Debug, Clone)]
pub struct LinearUnmixing {
    /// Rows of `(AᵀA)⁻¹Aᵀ`, one per endmember
    pinv: [[f64; 5]; 3],
    weight: f64,
}

impl LinearUnmixing {
    pub fn new(endmembers: [Endmember; 3], sum_to_one_weight: f64) -> Result<Self> {
        // A is 5x3: four bands plus the weighted sum-to-one row
        let mut a = [[0.0; 3]; 5];
        for (j, e) in endmembers.iter().enumerate() {
            for (i, v) in e.as_array().into_iter().enumerate() {
                a[i][j] = v;
            }
            a[4][j] = sum_to_one_weight;
        }

        let mut m = [[0.0; 3]; 3];
        for i in 0..3 {
            for j in 0..3 {
                m[i][j] = (0..5).map(|k| a[k][i] * a[k][j]).sum();
            }
        }
        let inv = invert3(&m).ok_or_else(|| Error::InvalidParameter {
            name: "endmembers",
            value: format!("{endmembers:?}"),
            reason: "endmember spectra are linearly dependent".into(),
        })?;

        let mut pinv = [[0.0; 5]; 3];
        for i in 0..3 {
            for k in 0..5 {
                pinv[i][k] = (0..3).map(|j| inv[i][j] * a[k][j]).sum();
            }
        }
        Ok(Self {
            pinv,
            weight: sum_to_one_weight,
        })
    }

    /// Fractions (0–1, unclipped) for a reflectance sample
    pub fn unmix(&self, reflectance: [f64; 4]) -> [f64; 3] {
        let b = [
            reflectance[0],
            reflectance[1],
            reflectance[2],
            reflectance[3],
            self.weight,
        ];
        self.pinv
            .map(|row| row.iter().zip(b.iter()).map(|(p, v)| p * v).sum())
    }
}

fn invert3(m: &[[f64; 3]; 3]) -> Option<[[f64; 3]; 3]> {
    let cof = |r0: usize, r1: usize, c0: usize, c1: usize| m[r0][c0] * m[r1][c1] - m[r0][c1] * m[r1][c0];
    let det = m[0][0] * cof(1, 2, 1, 2) - m[0][1] * cof(1, 2, 0, 2) + m[0][2] * cof(1, 2, 0, 1);
    if det.abs() < 1e-12 {
        return None;
    }
    let adj = [
        [cof(1, 2, 1, 2), -cof(0, 2, 1, 2), cof(0, 1, 1, 2)],
        [-cof(1, 2, 0, 2), cof(0, 2, 0, 2), -cof(0, 1, 0, 2)],
        [cof(1, 2, 0, 1), -cof(0, 2, 0, 1), cof(0, 1, 0, 1)],
    ];
    Some(adj.map(|row| row.map(|v| v / det)))
}

/// Fractional cover index: bands `bs`, `pv`, `npv` as percentages on 0–106
#[derive(Debug, Clone)]
pub struct FractionalCover {
    pub bare_soil: Endmember,
    pub green_vegetation: Endmember,
    pub dry_vegetation: Endmember,
    pub sum_to_one_weight: f64,
    /// Divisor bringing inputs onto 0–1
    pub scale: f64,
}

impl Default for FractionalCover {
    fn default() -> Self {
        Self {
            bare_soil: Endmember::new(0.25, 0.30, 0.40, 0.35),
            green_vegetation: Endmember::new(0.04, 0.45, 0.20, 0.09),
            dry_vegetation: Endmember::new(0.18, 0.26, 0.38, 0.28),
            sum_to_one_weight: 1.0,
            scale: 10000.0,
        }
    }
}

impl SpectralIndexFn for FractionalCover {
    fn compute(&self, composite: &BandSet, clean: &Mask, no_data: f64) -> Result<BandSet> {
        let solver = LinearUnmixing::new(
            [self.bare_soil, self.green_vegetation, self.dry_vegetation],
            self.sum_to_one_weight,
        )?;
        let inputs = [
            composite.require("red")?,
            composite.require("nir")?,
            composite.require("swir1")?,
            composite.require("swir2")?,
        ];
        let (rows, cols) = inputs[0].shape();
        if clean.shape() != (rows, cols) {
            let (ar, ac) = clean.shape();
            return Err(Error::SizeMismatch { er: rows, ec: cols, ar, ac });
        }
        let clean_flags = inputs[0].with_data(clean.data().mapv(|c| if c { 1.0 } else { 0.0 }))?;

        let mut out = BandSet::new();
        for (k, name) in ["bs", "pv", "npv"].into_iter().enumerate() {
            let band = per_pixel(
                [&clean_flags, inputs[0], inputs[1], inputs[2], inputs[3]],
                no_data,
                |[c, red, nir, swir1, swir2]| {
                    if c == 0.0 {
                        return None;
                    }
                    let fractions = solver.unmix([red, nir, swir1, swir2].map(|v| v / self.scale));
                    Some((fractions[k] * 100.0).clamp(0.0, WORKING_MAX))
                },
            )?;
            out.insert(name, band)?;
        }
        Ok(out)
    }
}

/// Linearly map `raster` from `from` onto `to`, leaving sentinel cells untouched.
///
/// Values are not clipped: anything beyond `from` lands proportionally beyond `to`.
pub fn rescale(raster: &Raster<f64>, from: (f64, f64), to: (f64, f64), no_data: f64) -> Raster<f64> {
    let span = from.1 - from.0;
    let mut out = raster.map(|v| {
        if v == no_data || span == 0.0 {
            v
        } else {
            to.0 + (v - from.0) / span * (to.1 - to.0)
        }
    });
    out.set_nodata(raster.nodata());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const ND: f64 = -9999.0;

    fn composite(fc: &FractionalCover, fractions: [f64; 3]) -> BandSet {
        let ems = [fc.bare_soil, fc.green_vegetation, fc.dry_vegetation];
        let mix = |get: fn(&Endmember) -> f64| {
            ems.iter().zip(fractions).map(|(e, f)| get(e) * f).sum::<f64>() * fc.scale
        };
        let mut set = BandSet::new();
        set.insert("red", Raster::filled(2, 2, mix(|e| e.red))).unwrap();
        set.insert("nir", Raster::filled(2, 2, mix(|e| e.nir))).unwrap();
        set.insert("swir1", Raster::filled(2, 2, mix(|e| e.swir1))).unwrap();
        set.insert("swir2", Raster::filled(2, 2, mix(|e| e.swir2))).unwrap();
        set
    }

    #[test]
    fn pure_endmember_unmixes_to_itself() {
        let fc = FractionalCover::default();
        let out = fc.compute(&composite(&fc, [0.0, 1.0, 0.0]), &Mask::filled(2, 2, true), ND).unwrap();
        assert_relative_eq!(out.require("bs").unwrap().get(0, 0).unwrap(), 0.0, epsilon = 1e-6);
        assert_relative_eq!(out.require("pv").unwrap().get(0, 0).unwrap(), 100.0, epsilon = 1e-6);
        assert_relative_eq!(out.require("npv").unwrap().get(0, 0).unwrap(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn mixed_pixel_recovers_fractions() {
        let fc = FractionalCover::default();
        let out = fc
            .compute(&composite(&fc, [0.2, 0.5, 0.3]), &Mask::filled(2, 2, true), ND)
            .unwrap();
        assert_relative_eq!(out.require("bs").unwrap().get(1, 1).unwrap(), 20.0, epsilon = 1e-6);
        assert_relative_eq!(out.require("pv").unwrap().get(1, 1).unwrap(), 50.0, epsilon = 1e-6);
        assert_relative_eq!(out.require("npv").unwrap().get(1, 1).unwrap(), 30.0, epsilon = 1e-6);
    }

    #[test]
    fn unclean_pixels_are_sentinel() {
        let fc = FractionalCover::default();
        let mut clean = Mask::filled(2, 2, true);
        clean.set(0, 1, false).unwrap();
        let out = fc.compute(&composite(&fc, [0.2, 0.5, 0.3]), &clean, ND).unwrap();
        for band in ["bs", "pv", "npv"] {
            assert_eq!(out.require(band).unwrap().get(0, 1).unwrap(), ND);
            assert_ne!(out.require(band).unwrap().get(0, 0).unwrap(), ND);
        }
    }

    #[test]
    fn dependent_endmembers_rejected() {
        let e = Endmember::new(0.1, 0.2, 0.3, 0.4);
        assert!(LinearUnmixing::new([e, e, Endmember::new(0.3, 0.1, 0.2, 0.2)], 1.0).is_err());
    }

    #[test]
    fn rescale_working_to_logical_range() {
        let r = Raster::from_vec(vec![106.0, 0.0, 53.0, ND, 112.0, -6.0], 2, 3).unwrap();
        let out = rescale(&r, (0.0, WORKING_MAX), (0.0, 100.0), ND);
        assert_relative_eq!(out.get(0, 0).unwrap(), 100.0, epsilon = 1e-9);
        assert_relative_eq!(out.get(0, 1).unwrap(), 0.0);
        assert_relative_eq!(out.get(0, 2).unwrap(), 50.0, epsilon = 1e-9);
        assert_eq!(out.get(1, 0).unwrap(), ND);
        // beyond the working bounds stays proportionally beyond
        assert_relative_eq!(out.get(1, 1).unwrap(), 112.0 * 100.0 / 106.0, epsilon = 1e-9);
        assert_relative_eq!(out.get(1, 2).unwrap(), -6.0 * 100.0 / 106.0, epsilon = 1e-9);
    }
}
