//! Boolean rasters: clean flags, out-of-range flags and no-data flags

use crate::error::{Error, Result};
use crate::raster::Raster;
use ndarray::{Array2, Zip};

/// A 2D boolean raster aligned with a composite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    data: Array2<bool>,
}

impl Mask {
    /// All-false mask
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, false)
    }

    pub fn filled(rows: usize, cols: usize, value: bool) -> Self {
        Self {
            data: Array2::from_elem((rows, cols), value),
        }
    }

    pub fn from_array(data: Array2<bool>) -> Self {
        Self { data }
    }

    /// Flag every cell of `raster` for which `pred` holds
    pub fn from_raster<F: Fn(f64) -> bool>(raster: &Raster<f64>, pred: F) -> Self {
        Self {
            data: raster.data().mapv(pred),
        }
    }

    /// Decode a mask stored as a 0/1 band
    pub fn from_flags(raster: &Raster<f64>) -> Self {
        Self::from_raster(raster, |v| v != 0.0 && !v.is_nan())
    }

    /// Encode as a 0/1 band on the grid of `template`
    pub fn to_flags(&self, template: &Raster<f64>) -> Result<Raster<f64>> {
        template.with_data(self.data.mapv(|b| if b { 1.0 } else { 0.0 }))
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<bool> {
        self.data.get((row, col)).copied()
    }

    pub fn set(&mut self, row: usize, col: usize, value: bool) -> Result<()> {
        let (rows, cols) = self.shape();
        match self.data.get_mut((row, col)) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(Error::IndexOutOfBounds { row, col, rows, cols }),
        }
    }

    pub fn data(&self) -> &Array2<bool> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array2<bool> {
        &mut self.data
    }

    /// Number of flagged cells
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&b| b).count()
    }

    pub fn any(&self) -> bool {
        self.data.iter().any(|&b| b)
    }

    /// Cell-wise OR
    pub fn or(&self, other: &Mask) -> Result<Mask> {
        self.zip(other, |a, b| a || b)
    }

    /// Cell-wise AND
    pub fn and(&self, other: &Mask) -> Result<Mask> {
        self.zip(other, |a, b| a && b)
    }

    fn zip<F: Fn(bool, bool) -> bool>(&self, other: &Mask, f: F) -> Result<Mask> {
        if self.shape() != other.shape() {
            let (er, ec) = self.shape();
            let (ar, ac) = other.shape();
            return Err(Error::SizeMismatch { er, ec, ar, ac });
        }
        let data = Zip::from(&self.data)
            .and(&other.data)
            .map_collect(|&a, &b| f(a, b));
        Ok(Mask { data })
    }
}
