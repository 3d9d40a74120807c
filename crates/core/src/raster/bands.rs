//! Named multi-band rasters sharing one grid

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster};

/// An ordered set of named `f64` bands on a common grid.
///
/// Used for composites (one band per measurement plus derived index bands)
/// and for difference composites. Insertion order is preserved; it decides
/// band order in the archive and GeoTIFF outputs.
#[derive(Debug, Clone, Default)]
pub struct BandSet {
    bands: Vec<(String, Raster<f64>)>,
}

impl BandSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a band. The first band fixes the shape of the set.
    pub fn insert(&mut self, name: impl Into<String>, raster: Raster<f64>) -> Result<()> {
        let name = name.into();
        if let Some((er, ec)) = self.shape() {
            let (ar, ac) = raster.shape();
            if (er, ec) != (ar, ac) {
                return Err(Error::SizeMismatch { er, ec, ar, ac });
            }
        }
        match self.bands.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = raster,
            None => self.bands.push((name, raster)),
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Raster<f64>> {
        self.bands.iter().find(|(n, _)| n == name).map(|(_, r)| r)
    }

    /// Like [`BandSet::get`] but a missing band is an error
    pub fn require(&self, name: &str) -> Result<&Raster<f64>> {
        self.get(name).ok_or_else(|| Error::MissingBand(name.to_string()))
    }

    pub fn remove(&mut self, name: &str) -> Option<Raster<f64>> {
        let idx = self.bands.iter().position(|(n, _)| n == name)?;
        Some(self.bands.remove(idx).1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bands.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Raster<f64>)> {
        self.bands.iter().map(|(n, r)| (n.as_str(), r))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Raster<f64>)> {
        self.bands.iter_mut().map(|(n, r)| (n.as_str(), r))
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Shape of every band, `None` while empty
    pub fn shape(&self) -> Option<(usize, usize)> {
        self.bands.first().map(|(_, r)| r.shape())
    }

    pub fn transform(&self) -> Option<&GeoTransform> {
        self.bands.first().map(|(_, r)| r.transform())
    }

    /// Move all bands of `other` into `self` (replacing same-named bands)
    pub fn merge(&mut self, other: BandSet) -> Result<()> {
        for (name, raster) in other.bands {
            self.insert(name, raster)?;
        }
        Ok(())
    }

    /// Copy of the named bands, in the requested order
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<BandSet> {
        let mut out = BandSet::new();
        for name in names {
            let name = name.as_ref();
            out.insert(name, self.require(name)?.clone())?;
        }
        Ok(out)
    }

    /// Copy without the named bands; names not present are ignored
    pub fn without<S: AsRef<str>>(&self, names: &[S]) -> BandSet {
        BandSet {
            bands: self
                .bands
                .iter()
                .filter(|(n, _)| !names.iter().any(|d| d.as_ref() == n))
                .cloned()
                .collect(),
        }
    }

    /// `self - other` band by band, over the bands of `self`
    pub fn difference(&self, other: &BandSet) -> Result<BandSet> {
        let mut out = BandSet::new();
        for (name, a) in self.iter() {
            let b = other.require(name)?;
            if a.shape() != b.shape() {
                let (er, ec) = a.shape();
                let (ar, ac) = b.shape();
                return Err(Error::SizeMismatch { er, ec, ar, ac });
            }
            let mut diff = a.with_data(a.data() - b.data())?;
            diff.set_nodata(a.nodata());
            out.insert(name, diff)?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band(v: f64) -> Raster<f64> {
        Raster::filled(2, 3, v)
    }

    #[test]
    fn insert_keeps_order_and_replaces() {
        let mut set = BandSet::new();
        set.insert("red", band(1.0)).unwrap();
        set.insert("nir", band(2.0)).unwrap();
        set.insert("red", band(3.0)).unwrap();
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["red", "nir"]);
        assert_eq!(set.require("red").unwrap().get(0, 0).unwrap(), 3.0);
    }

    #[test]
    fn insert_rejects_shape_mismatch() {
        let mut set = BandSet::new();
        set.insert("red", band(1.0)).unwrap();
        assert!(set.insert("nir", Raster::filled(3, 3, 0.0)).is_err());
    }

    #[test]
    fn difference_drops_nothing_itself() {
        let mut after = BandSet::new();
        after.insert("ndvi", band(0.75)).unwrap();
        after.insert("red", band(10.0)).unwrap();
        let mut before = BandSet::new();
        before.insert("ndvi", band(0.25)).unwrap();
        before.insert("red", band(4.0)).unwrap();

        let diff = after.without(&["red"]).difference(&before).unwrap();
        assert_eq!(diff.len(), 1);
        assert_eq!(diff.require("ndvi").unwrap().get(1, 2).unwrap(), 0.5);
    }

    #[test]
    fn missing_band_is_error() {
        let set = BandSet::new();
        assert!(matches!(set.require("pv"), Err(Error::MissingBand(_))));
        assert!(set.select(&["pv"]).is_err());
    }
}
