//! End-to-end runs of the workflow over in-memory scenes

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use specanom_algorithms::imagery::{
    AcceptAll, MostRecent, NormalizedDifference, SensorMask, SpectralIndex, SpectralIndexFn,
};
use specanom_colormap::{evaluate, normalize, ColorScheme, Rgba};
use specanom_core::io::read_archive;
use specanom_core::{BandSet, EdgeRule, Extent, GeoTransform, Mask, Raster, RasterStack};
use specanom_parallel::ProcessingMode;
use specanom_pipeline::{
    AnomalyParams, ChartRenderer, DataSource, InMemorySource, Scene, TaskRecord, TaskStatus, TimeWindow,
    Workflow, WorkflowEvent,
};

const ND: f64 = -9999.0;

fn day(year: i32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, 1, d, 0, 0, 0).unwrap()
}

/// 2 x 4 scene at 0.5 degree over lon [0, 2], lat [0, 1]
fn scene(time: DateTime<Utc>, red: f64, nir: f64, hole: bool) -> Scene {
    let mut bands = BandSet::new();
    for (name, v) in [("red", red), ("nir", nir)] {
        let mut r = Raster::filled(2, 4, v);
        if hole && name == "red" {
            r.set(1, 3, ND).unwrap();
        }
        r.set_transform(GeoTransform::new(0.0, 1.0, 0.5, -0.5));
        bands.insert(name, r).unwrap();
    }
    Scene::new(time, bands)
}

/// Three baseline scenes with NDVI 0.5, two analysis scenes with NDVI 0
/// and a permanent hole at (1, 3) in the analysis window.
fn source() -> InMemorySource {
    let mut scenes = Vec::new();
    for d in [3, 10, 20] {
        scenes.push(scene(day(2015, d), 1000.0, 3000.0, false));
    }
    for d in [5, 15] {
        scenes.push(scene(day(2016, d), 2000.0, 2000.0, true));
    }
    InMemorySource::new(scenes)
}

fn params() -> AnomalyParams {
    let mut p = AnomalyParams::new(
        Extent::new(0.0, 2.0, 0.0, 1.0),
        TimeWindow::new(day(2015, 1), day(2015, 31)),
        TimeWindow::new(day(2016, 1), day(2016, 31)),
        SpectralIndex::Ndvi,
    );
    p.measurements = vec!["red".into(), "nir".into()];
    p.chunk_size.lon_step = 1.0;
    p.chunk_size.lat_step = 1.0;
    p.composite_range = Some((-1.0, 1.0));
    p
}

fn run(params: AnomalyParams, out: &Path) -> TaskRecord {
    Workflow::new(params, Arc::new(source())).run(out)
}

fn png(path: &Path) -> image::RgbaImage {
    image::open(path).unwrap().to_rgba8()
}

fn pixel(img: &image::RgbaImage, row: u32, col: u32) -> [u8; 4] {
    img.get_pixel(col, row).0
}

#[test]
fn two_chunk_run_produces_every_product() {
    let out = tempfile::tempdir().unwrap();
    let (tx, rx) = crossbeam_channel::unbounded();
    let workflow = Workflow::new(params(), Arc::new(source())).with_events(tx);
    let record = workflow.run(out.path());

    assert_eq!(record.status, TaskStatus::Ok, "{}", record.message);
    assert_eq!(record.message, "All products have been generated.");
    assert!(record.complete);
    assert_eq!(record.total_scenes, 5);
    assert_eq!(record.scenes_processed, 5);
    assert_eq!(workflow.progress().processed(), 5);
    assert!(record.execution_start.unwrap() <= record.execution_end.unwrap());

    let archive = read_archive(record.archive_path.as_ref().unwrap()).unwrap();
    let ndvi = archive.require("ndvi").unwrap();
    assert_eq!(ndvi.shape(), (2, 4));
    for row in 0..2 {
        for col in 0..4 {
            let expected = if (row, col) == (1, 3) { ND } else { -0.5 };
            assert_eq!(ndvi.get(row, col).unwrap(), expected);
        }
    }
    assert!(record.geotiff_path.as_ref().unwrap().exists());

    let img = png(record.result_path.as_ref().unwrap());
    assert_eq!(img.dimensions(), (4, 2));
    let diverging = evaluate(ColorScheme::RdYlGn, normalize(-0.5, -2.0, 2.0))
        .opaque()
        .to_bytes();
    for row in 0..2 {
        for col in 0..4 {
            let expected = if (row, col) == (1, 3) {
                Rgba::TRANSPARENT.to_bytes()
            } else {
                diverging
            };
            assert_eq!(pixel(&img, row, col), expected, "pixel ({row}, {col})");
        }
    }

    assert_eq!(record.acquisition_list.len(), 5);
    assert_eq!(
        record.clean_pixel_percentages_per_acquisition,
        vec![100.0, 100.0, 100.0, 87.5, 87.5]
    );
    assert_eq!(record.pixel_count, 8);
    assert!(record.plot_path.as_ref().unwrap().exists());

    let events: Vec<WorkflowEvent> = rx.try_iter().collect();
    let messages: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            WorkflowEvent::Status { message, .. } => Some(message.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(
        messages,
        vec![
            "Parsed out parameters.",
            "Validated parameters.",
            "Chunked parameter set.",
            "Starting processing.",
            "All products have been generated.",
        ]
    );
    assert!(events.contains(&WorkflowEvent::Planned {
        chunks: 2,
        total_scenes: 5
    }));
    let finished = events
        .iter()
        .filter(|e| matches!(e, WorkflowEvent::ChunkFinished { produced: true, .. }))
        .count();
    assert_eq!(finished, 2);
}

#[test]
fn scheduling_does_not_change_products() {
    let mut bytes = Vec::new();
    for mode in [
        ProcessingMode::Sequential,
        ProcessingMode::Parallel,
        ProcessingMode::ParallelWith(2),
    ] {
        let out = tempfile::tempdir().unwrap();
        let mut p = params();
        p.processing_mode = mode;
        let record = run(p, out.path());
        assert_eq!(record.status, TaskStatus::Ok);
        bytes.push((
            std::fs::read(record.archive_path.unwrap()).unwrap(),
            std::fs::read(record.result_path.unwrap()).unwrap(),
        ));
    }
    assert_eq!(bytes[0], bytes[1]);
    assert_eq!(bytes[0], bytes[2]);
}

#[test]
fn spilled_run_matches_in_memory_run() {
    let spill = tempfile::tempdir().unwrap();
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();

    let in_memory = run(params(), a.path());
    let mut p = params();
    p.intermediate_dir = Some(spill.path().to_path_buf());
    let spilled = run(p, b.path());

    assert_eq!(spilled.status, TaskStatus::Ok, "{}", spilled.message);
    let left = read_archive(in_memory.archive_path.unwrap()).unwrap();
    let right = read_archive(spilled.archive_path.unwrap()).unwrap();
    assert_eq!(
        left.require("ndvi").unwrap().data(),
        right.require("ndvi").unwrap().data()
    );
    assert_eq!(in_memory.pixel_count, spilled.pixel_count);
    // the per-run directory is gone
    assert_eq!(std::fs::read_dir(spill.path()).unwrap().count(), 0);
}

#[test]
fn change_filter_renders_flat_colors() {
    let out = tempfile::tempdir().unwrap();
    let mut p = params();
    p.change_range = Some((-0.6, -0.4));
    let record = run(p, out.path());
    let img = png(record.result_path.as_ref().unwrap());
    assert_eq!(pixel(&img, 0, 0), Rgba::HIGHLIGHT.to_bytes());
    assert_eq!(pixel(&img, 1, 3), Rgba::TRANSPARENT.to_bytes());

    let out = tempfile::tempdir().unwrap();
    let mut p = params();
    p.change_range = Some((0.0, 1.0));
    let record = run(p, out.path());
    let img = png(record.result_path.as_ref().unwrap());
    assert_eq!(pixel(&img, 0, 0), Rgba::OUT_OF_CHANGE.to_bytes());
    assert_eq!(pixel(&img, 1, 3), Rgba::TRANSPARENT.to_bytes());
}

#[test]
fn composite_range_marks_white() {
    let out = tempfile::tempdir().unwrap();
    let mut p = params();
    // baseline NDVI 0.5 falls outside
    p.composite_range = Some((-1.0, 0.25));
    let record = run(p, out.path());
    let img = png(record.result_path.as_ref().unwrap());
    assert_eq!(pixel(&img, 0, 0), Rgba::OUT_OF_COMPOSITE.to_bytes());
    assert_eq!(pixel(&img, 1, 3), Rgba::TRANSPARENT.to_bytes());
}

#[test]
fn cancelled_run_writes_nothing() {
    let out = tempfile::tempdir().unwrap();
    let workflow = Workflow::new(params(), Arc::new(source()));
    workflow.cancellation_token().cancel();
    let record = workflow.run(out.path());

    assert_eq!(record.status, TaskStatus::Cancelled);
    assert!(record.complete);
    assert_eq!(record.archive_path, None);
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
}

#[test]
fn missing_analysis_scenes_is_reported() {
    let out = tempfile::tempdir().unwrap();
    let mut p = params();
    p.analysis = TimeWindow::new(day(2017, 1), day(2017, 31));
    let record = run(p, out.path());
    assert_eq!(record.status, TaskStatus::Error);
    assert_eq!(
        record.message,
        "There are no acquisitions for this parameter set for the analysis time period."
    );
}

#[test]
fn unsupported_measurements_are_rejected() {
    let out = tempfile::tempdir().unwrap();
    let mut p = params();
    p.measurements.push("swir1".into());
    let record = run(p, out.path());
    assert_eq!(record.status, TaskStatus::Error);
    assert!(record.message.starts_with("Configuration error"), "{}", record.message);
    assert_eq!(record.scenes_processed, 0);
}

/// Lists acquisitions but never returns pixels
struct ListingOnly(InMemorySource);

impl DataSource for ListingOnly {
    fn load_raster_stack(
        &self,
        _extent: &Extent,
        _edges: EdgeRule,
        _window: &TimeWindow,
        _measurements: &[String],
    ) -> specanom_pipeline::Result<RasterStack> {
        Ok(RasterStack::empty(GeoTransform::new(0.0, 1.0, 0.5, -0.5)))
    }

    fn list_acquisition_dates(
        &self,
        extent: &Extent,
        window: &TimeWindow,
    ) -> specanom_pipeline::Result<Vec<DateTime<Utc>>> {
        self.0.list_acquisition_dates(extent, window)
    }

    fn validate_measurements(&self, measurements: &[String]) -> bool {
        self.0.validate_measurements(measurements)
    }
}

#[test]
fn run_without_pixels_reports_no_data() {
    let out = tempfile::tempdir().unwrap();
    let record = Workflow::new(params(), Arc::new(ListingOnly(source()))).run(out.path());
    assert_eq!(record.status, TaskStatus::Error);
    assert_eq!(record.message, "No data was found for the requested extent.");
    assert!(record.complete);
}

/// NDVI that fails the first `failures` calls
struct Flaky {
    inner: NormalizedDifference,
    failures: AtomicUsize,
}

impl Flaky {
    fn new(failures: usize) -> Self {
        Self {
            inner: NormalizedDifference::new("ndvi", "nir", "red"),
            failures: AtomicUsize::new(failures),
        }
    }
}

impl SpectralIndexFn for Flaky {
    fn compute(
        &self,
        composite: &BandSet,
        clean: &Mask,
        no_data: f64,
    ) -> specanom_core::Result<BandSet> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(specanom_core::Error::Other("transient".into()));
        }
        self.inner.compute(composite, clean, no_data)
    }
}

#[test]
fn transient_chunk_failure_is_retried() {
    let out = tempfile::tempdir().unwrap();
    let mut p = params();
    p.processing_mode = ProcessingMode::Sequential;
    let record = Workflow::new(p, Arc::new(source()))
        .map_processor(|proc| proc.with_index_function(Box::new(Flaky::new(1))))
        .run(out.path());
    assert_eq!(record.status, TaskStatus::Ok, "{}", record.message);
    assert_eq!(record.scenes_processed, 5);
}

#[test]
fn persistent_chunk_failure_ends_the_run() {
    let out = tempfile::tempdir().unwrap();
    let mut p = params();
    p.processing_mode = ProcessingMode::Sequential;
    p.max_chunk_retries = 1;
    let record = Workflow::new(p, Arc::new(source()))
        .map_processor(|proc| proc.with_index_function(Box::new(Flaky::new(2))))
        .run(out.path());
    assert_eq!(record.status, TaskStatus::Error);
    assert!(record.message.contains("transient"), "{}", record.message);
    assert_eq!(record.archive_path, None);
}

/// Accepts every sample and counts how often it was asked
#[derive(Debug, Default)]
struct CountingMask(Arc<AtomicUsize>);

impl SensorMask for CountingMask {
    fn valid(&self, stack: &RasterStack) -> specanom_core::Result<ndarray::Array3<bool>> {
        self.0.fetch_add(1, Ordering::SeqCst);
        AcceptAll.valid(stack)
    }
}

/// Keeps the series it was handed and writes one line per point
#[derive(Default)]
struct RecordingChart(Arc<Mutex<Vec<f64>>>);

impl ChartRenderer for RecordingChart {
    fn file_name(&self) -> &str {
        "series.csv"
    }

    fn render(&self, series: &[(DateTime<Utc>, f64)], path: &Path) -> specanom_pipeline::Result<()> {
        let mut seen = self.0.lock().unwrap();
        let mut text = String::new();
        for (date, pct) in series {
            seen.push(*pct);
            text.push_str(&format!("{},{pct}\n", date.format("%Y-%m-%d")));
        }
        std::fs::write(path, text)?;
        Ok(())
    }
}

#[test]
fn injected_parts_are_used() {
    let out = tempfile::tempdir().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let series = Arc::new(Mutex::new(Vec::new()));
    let mut p = params();
    p.processing_mode = ProcessingMode::Sequential;

    let record = Workflow::new(p, Arc::new(source()))
        .map_processor(|proc| {
            proc.with_sensor_mask(Box::new(CountingMask(calls.clone())))
                .with_composite_method(Box::new(MostRecent))
        })
        .with_chart_renderer(Box::new(RecordingChart(series.clone())))
        .run(out.path());

    assert_eq!(record.status, TaskStatus::Ok, "{}", record.message);
    // two chunks, two windows each
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    // uniform windows: most recent equals the median
    let archive = read_archive(record.archive_path.as_ref().unwrap()).unwrap();
    assert_eq!(archive.require("ndvi").unwrap().get(0, 0).unwrap(), -0.5);

    let plot = record.plot_path.unwrap();
    assert!(plot.ends_with("series.csv"));
    assert_eq!(std::fs::read_to_string(plot).unwrap().lines().count(), 5);
    assert_eq!(*series.lock().unwrap(), vec![100.0, 100.0, 100.0, 87.5, 87.5]);
}
