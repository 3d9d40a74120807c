//! Raster data sources
//!
//! A [`DataSource`] answers three questions for the pipeline: which
//! acquisitions cover an extent in a window, whether a measurement set can be
//! served, and the time stack of a chunk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use specanom_core::io::read_geotiff;
use specanom_core::{BandSet, EdgeRule, Extent, GeoTransform, Raster, RasterStack};
use tracing::debug;

use crate::config::TimeWindow;
use crate::error::{PipelineError, Result};

pub trait DataSource: Send + Sync {
    /// Stack of every acquisition in `window` whose pixels fall inside `extent`.
    ///
    /// Pixel ownership follows `edges`. An empty stack is not an error.
    fn load_raster_stack(
        &self,
        extent: &Extent,
        edges: EdgeRule,
        window: &TimeWindow,
        measurements: &[String],
    ) -> Result<RasterStack>;

    /// Sorted unique acquisition times covering `extent` in `window`
    fn list_acquisition_dates(&self, extent: &Extent, window: &TimeWindow)
        -> Result<Vec<DateTime<Utc>>>;

    fn validate_measurements(&self, measurements: &[String]) -> bool;
}

/// One acquisition: named bands on a shared grid
#[derive(Debug, Clone)]
pub struct Scene {
    pub time: DateTime<Utc>,
    pub bands: BandSet,
}

impl Scene {
    pub fn new(time: DateTime<Utc>, bands: BandSet) -> Self {
        Self { time, bands }
    }

    fn covers(&self, extent: &Extent, edges: EdgeRule) -> bool {
        match (self.bands.transform(), self.bands.shape()) {
            (Some(t), Some((rows, cols))) => extent.pixel_window(t, rows, cols, edges).is_some(),
            _ => false,
        }
    }

    /// The part of this scene owned by `extent`, `None` when no pixel center falls inside
    fn crop(&self, extent: &Extent, edges: EdgeRule, measurements: &[String]) -> Result<Option<BandSet>> {
        let (Some(transform), Some((rows, cols))) = (self.bands.transform(), self.bands.shape())
        else {
            return Ok(None);
        };
        let Some(window) = extent.pixel_window(transform, rows, cols, edges) else {
            return Ok(None);
        };
        let mut out = BandSet::new();
        for name in measurements {
            out.insert(name.as_str(), self.bands.require(name)?.crop(&window)?)?;
        }
        Ok(Some(out))
    }
}

fn stack_from_crops(
    scenes: Vec<(DateTime<Utc>, BandSet)>,
    measurements: &[String],
) -> Result<RasterStack> {
    if scenes.is_empty() {
        return Ok(RasterStack::empty(GeoTransform::default()));
    }
    Ok(RasterStack::from_scenes(scenes, measurements)?)
}

fn sorted_unique(mut times: Vec<DateTime<Utc>>) -> Vec<DateTime<Utc>> {
    times.sort();
    times.dedup();
    times
}

/// Scenes held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    scenes: Vec<Scene>,
}

impl InMemorySource {
    pub fn new(scenes: Vec<Scene>) -> Self {
        Self { scenes }
    }

    pub fn push(&mut self, scene: Scene) {
        self.scenes.push(scene);
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

impl DataSource for InMemorySource {
    fn load_raster_stack(
        &self,
        extent: &Extent,
        edges: EdgeRule,
        window: &TimeWindow,
        measurements: &[String],
    ) -> Result<RasterStack> {
        let mut crops = Vec::new();
        for scene in self.scenes.iter().filter(|s| window.contains(&s.time)) {
            if let Some(bands) = scene.crop(extent, edges, measurements)? {
                crops.push((scene.time, bands));
            }
        }
        stack_from_crops(crops, measurements)
    }

    fn list_acquisition_dates(
        &self,
        extent: &Extent,
        window: &TimeWindow,
    ) -> Result<Vec<DateTime<Utc>>> {
        Ok(sorted_unique(
            self.scenes
                .iter()
                .filter(|s| window.contains(&s.time) && s.covers(extent, EdgeRule::CLOSED))
                .map(|s| s.time)
                .collect(),
        ))
    }

    fn validate_measurements(&self, measurements: &[String]) -> bool {
        !self.scenes.is_empty()
            && self
                .scenes
                .iter()
                .all(|s| measurements.iter().all(|m| s.bands.contains(m)))
    }
}

/// Manifest entry: one acquisition stored as single-band GeoTIFF files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub time: DateTime<Utc>,
    /// Band name to file; relative paths resolve against the manifest directory
    pub bands: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogManifest {
    pub scenes: Vec<CatalogEntry>,
}

/// Scenes described by a JSON manifest and read from disk on demand
#[derive(Debug, Clone)]
pub struct SceneCatalog {
    root: PathBuf,
    entries: Vec<CatalogEntry>,
}

impl SceneCatalog {
    pub fn open<P: AsRef<Path>>(manifest: P) -> Result<Self> {
        let path = manifest.as_ref();
        let text = std::fs::read_to_string(path)?;
        let manifest: CatalogManifest = serde_json::from_str(&text)?;
        let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
        debug!(scenes = manifest.scenes.len(), root = %root.display(), "opened scene catalog");
        Ok(Self::from_manifest(manifest, root))
    }

    pub fn from_manifest(manifest: CatalogManifest, root: PathBuf) -> Self {
        Self {
            root,
            entries: manifest.scenes,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn read_band(&self, entry: &CatalogEntry, name: &str) -> Result<Raster<f64>> {
        let file = entry.bands.get(name).ok_or_else(|| {
            PipelineError::Computation(format!("scene {} has no '{name}' band", entry.time))
        })?;
        Ok(read_geotiff::<f64, _>(self.root.join(file))?)
    }

    fn read_scene(&self, entry: &CatalogEntry, measurements: &[String]) -> Result<Scene> {
        let mut bands = BandSet::new();
        for name in measurements {
            bands.insert(name.as_str(), self.read_band(entry, name)?)?;
        }
        Ok(Scene::new(entry.time, bands))
    }
}

impl DataSource for SceneCatalog {
    fn load_raster_stack(
        &self,
        extent: &Extent,
        edges: EdgeRule,
        window: &TimeWindow,
        measurements: &[String],
    ) -> Result<RasterStack> {
        let mut crops = Vec::new();
        for entry in self.entries.iter().filter(|e| window.contains(&e.time)) {
            let scene = self.read_scene(entry, measurements)?;
            if let Some(bands) = scene.crop(extent, edges, measurements)? {
                crops.push((scene.time, bands));
            }
        }
        stack_from_crops(crops, measurements)
    }

    fn list_acquisition_dates(
        &self,
        extent: &Extent,
        window: &TimeWindow,
    ) -> Result<Vec<DateTime<Utc>>> {
        let mut times = Vec::new();
        for entry in self.entries.iter().filter(|e| window.contains(&e.time)) {
            let Some(name) = entry.bands.keys().next() else {
                continue;
            };
            let scene = self.read_scene(entry, std::slice::from_ref(name))?;
            if scene.covers(extent, EdgeRule::CLOSED) {
                times.push(entry.time);
            }
        }
        Ok(sorted_unique(times))
    }

    fn validate_measurements(&self, measurements: &[String]) -> bool {
        !self.entries.is_empty()
            && self
                .entries
                .iter()
                .all(|e| measurements.iter().all(|m| e.bands.contains_key(m)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use specanom_core::io::{write_geotiff, GeoTiffOptions};

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 7, d, 0, 0, 0).unwrap()
    }

    /// 4x4 grid over lon 0..1, lat 0..1 with cell value `v + row*10 + col`
    fn scene(d: u32, v: f64) -> Scene {
        let mut bands = BandSet::new();
        for (k, name) in ["red", "nir"].into_iter().enumerate() {
            let data: Vec<f64> = (0..16).map(|i| v + k as f64 + (i / 4 * 10 + i % 4) as f64).collect();
            let mut r = Raster::from_vec(data, 4, 4).unwrap();
            r.set_transform(GeoTransform::new(0.0, 1.0, 0.25, -0.25));
            bands.insert(name, r).unwrap();
        }
        Scene::new(day(d), bands)
    }

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn july() -> TimeWindow {
        TimeWindow::new(day(1), day(20))
    }

    #[test]
    fn stack_is_cropped_to_the_chunk() {
        let src = InMemorySource::new(vec![scene(5, 100.0), scene(2, 200.0), scene(25, 0.0)]);
        // western half, open on the east edge
        let west = Extent::new(0.0, 0.5, 0.0, 1.0);
        let stack = src
            .load_raster_stack(&west, EdgeRule { include_max_lon: false, include_max_lat: true }, &july(), &names(&["red"]))
            .unwrap();
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.shape(), (4, 2));
        assert_eq!(stack.times(), &[day(2), day(5)]);
        assert_eq!(stack.slice("red", 0).unwrap()[[1, 1]], 211.0);
        assert_eq!(stack.transform().origin_x, 0.0);
    }

    #[test]
    fn east_chunk_gets_the_remaining_columns() {
        let src = InMemorySource::new(vec![scene(5, 100.0)]);
        let east = Extent::new(0.5, 1.0, 0.0, 1.0);
        let stack = src
            .load_raster_stack(&east, EdgeRule::CLOSED, &july(), &names(&["nir"]))
            .unwrap();
        assert_eq!(stack.shape(), (4, 2));
        assert_eq!(stack.slice("nir", 0).unwrap()[[0, 0]], 103.0);
        assert_eq!(stack.transform().origin_x, 0.5);
    }

    #[test]
    fn outside_extent_yields_empty_stack() {
        let src = InMemorySource::new(vec![scene(5, 100.0)]);
        let far = Extent::new(5.0, 6.0, 5.0, 6.0);
        let stack = src
            .load_raster_stack(&far, EdgeRule::CLOSED, &july(), &names(&["red"]))
            .unwrap();
        assert!(stack.is_empty());
        assert!(src.list_acquisition_dates(&far, &july()).unwrap().is_empty());
    }

    #[test]
    fn dates_and_measurements() {
        let src = InMemorySource::new(vec![scene(5, 1.0), scene(5, 2.0), scene(3, 1.0), scene(30, 1.0)]);
        let all = Extent::new(0.0, 1.0, 0.0, 1.0);
        assert_eq!(src.list_acquisition_dates(&all, &july()).unwrap(), vec![day(3), day(5)]);
        assert!(src.validate_measurements(&names(&["red", "nir"])));
        assert!(!src.validate_measurements(&names(&["swir1"])));
        assert!(!InMemorySource::default().validate_measurements(&names(&["red"])));
    }

    #[test]
    fn catalog_reads_scene_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = CatalogManifest::default();
        for (d, v) in [(4, 300.0), (9, 400.0)] {
            let s = scene(d, v);
            let mut files = BTreeMap::new();
            for name in ["red", "nir"] {
                let file = format!("{d}_{name}.tif");
                write_geotiff(
                    &s.bands.select(&[name]).unwrap(),
                    dir.path().join(&file),
                    Some(GeoTiffOptions { nodata: Some(-9999.0) }),
                )
                .unwrap();
                files.insert(name.to_string(), PathBuf::from(file));
            }
            manifest.scenes.push(CatalogEntry { time: day(d), bands: files });
        }
        let manifest_path = dir.path().join("catalog.json");
        std::fs::write(&manifest_path, serde_json::to_string(&manifest).unwrap()).unwrap();

        let catalog = SceneCatalog::open(&manifest_path).unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.validate_measurements(&names(&["red", "nir"])));
        assert!(!catalog.validate_measurements(&names(&["blue"])));

        let all = Extent::new(0.0, 1.0, 0.0, 1.0);
        assert_eq!(catalog.list_acquisition_dates(&all, &july()).unwrap(), vec![day(4), day(9)]);
        let stack = catalog
            .load_raster_stack(&all, EdgeRule::CLOSED, &july(), &names(&["nir", "red"]))
            .unwrap();
        assert_eq!(stack.shape(), (4, 4));
        assert_eq!(stack.band_names(), &["nir".to_string(), "red".to_string()]);
        assert_eq!(stack.slice("nir", 1).unwrap()[[3, 3]], 401.0 + 33.0);
    }
}
