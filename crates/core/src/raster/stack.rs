//! Time stacks: every acquisition of a window over one chunk

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{BandSet, GeoTransform};
use chrono::{DateTime, Utc};
use ndarray::{Array3, ArrayView2, Axis};

/// Per pixel-per-time flag: `true` where the observation may feed a composite.
pub type CleanMask = Array3<bool>;

/// Multi-band observations over one grid, band-major `(time, row, col)`.
///
/// Acquisition times are kept in ascending order.
#[derive(Debug, Clone)]
pub struct RasterStack {
    times: Vec<DateTime<Utc>>,
    names: Vec<String>,
    cubes: Vec<Array3<f64>>,
    transform: GeoTransform,
    crs: Option<CRS>,
}

impl RasterStack {
    /// A stack with no acquisitions (the data source found nothing)
    pub fn empty(transform: GeoTransform) -> Self {
        Self {
            times: Vec::new(),
            names: Vec::new(),
            cubes: Vec::new(),
            transform,
            crs: None,
        }
    }

    /// Build from per-acquisition band sets, sorting by time.
    ///
    /// Every scene must carry all of `names` on the same shape.
    pub fn from_scenes<S: AsRef<str>>(
        mut scenes: Vec<(DateTime<Utc>, BandSet)>,
        names: &[S],
    ) -> Result<Self> {
        scenes.sort_by_key(|(t, _)| *t);

        let Some((_, first)) = scenes.first() else {
            return Ok(Self::empty(GeoTransform::default()));
        };
        let (rows, cols) = first.shape().ok_or_else(|| {
            Error::Other("scene without bands".to_string())
        })?;
        let transform = first
            .transform()
            .copied()
            .unwrap_or_default();
        let crs = first
            .iter()
            .next()
            .and_then(|(_, r)| r.crs().copied());

        let mut cubes = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            let mut cube = Array3::<f64>::zeros((scenes.len(), rows, cols));
            for (t, (_, scene)) in scenes.iter().enumerate() {
                let band = scene.require(name)?;
                if band.shape() != (rows, cols) {
                    let (ar, ac) = band.shape();
                    return Err(Error::SizeMismatch { er: rows, ec: cols, ar, ac });
                }
                cube.index_axis_mut(Axis(0), t).assign(band.data());
            }
            cubes.push(cube);
        }

        Ok(Self {
            times: scenes.iter().map(|(t, _)| *t).collect(),
            names: names.iter().map(|n| n.as_ref().to_string()).collect(),
            cubes,
            transform,
            crs,
        })
    }

    /// True when there is nothing to composite: no scenes or no pixels
    pub fn is_empty(&self) -> bool {
        let (rows, cols) = self.shape();
        self.times.is_empty() || rows == 0 || cols == 0
    }

    /// Number of acquisitions
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// `(rows, cols)` of every time slice
    pub fn shape(&self) -> (usize, usize) {
        match self.cubes.first() {
            Some(c) => {
                let (_, r, k) = c.dim();
                (r, k)
            }
            None => (0, 0),
        }
    }

    pub fn times(&self) -> &[DateTime<Utc>] {
        &self.times
    }

    pub fn band_names(&self) -> &[String] {
        &self.names
    }

    pub fn band(&self, name: &str) -> Option<&Array3<f64>> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| &self.cubes[i])
    }

    pub fn require(&self, name: &str) -> Result<&Array3<f64>> {
        self.band(name).ok_or_else(|| Error::MissingBand(name.to_string()))
    }

    /// One acquisition of one band
    pub fn slice(&self, name: &str, time: usize) -> Result<ArrayView2<'_, f64>> {
        let cube = self.require(name)?;
        if time >= cube.len_of(Axis(0)) {
            let (rows, cols) = self.shape();
            return Err(Error::IndexOutOfBounds { row: time, col: 0, rows, cols });
        }
        Ok(cube.index_axis(Axis(0), time))
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }
}
