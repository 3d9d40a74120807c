//! Barrier reduce: chunk artifacts into full-extent mosaics

use ndarray::{s, Array2};
use specanom_core::{BandSet, GeoTransform, Mask, Raster};
use specanom_parallel::CancellationToken;
use tracing::debug;

use crate::error::{PipelineError, Result, StageOutcome};
use crate::metadata::TaskMetadata;
use crate::processor::ChunkArtifact;

/// Full-extent products of a run
#[derive(Debug, Clone)]
pub struct Mosaic {
    pub difference: BandSet,
    pub out_of_range: Mask,
    pub no_data: Mask,
    pub metadata: TaskMetadata,
}

impl Mosaic {
    pub fn shape(&self) -> (usize, usize) {
        self.out_of_range.shape()
    }
}

/// Stitches artifacts by their own georeferencing.
///
/// Uncovered cells get the declared fill: the sentinel for difference bands,
/// `false` for the out-of-range mask and `true` for the no-data mask.
#[derive(Debug, Clone, Copy)]
pub struct ChunkRecombiner {
    no_data: f64,
}

/// Placement of one artifact inside the mosaic grid
struct Placement {
    row: usize,
    col: usize,
}

impl ChunkRecombiner {
    pub fn new(no_data: f64) -> Self {
        Self { no_data }
    }

    /// Merge all artifacts; an empty list is an [`StageOutcome::Empty`] run
    pub fn recombine(
        &self,
        artifacts: Vec<ChunkArtifact>,
        cancel: &CancellationToken,
    ) -> Result<StageOutcome<Mosaic>> {
        StageOutcome::from_result(self.run(artifacts, cancel))
    }

    fn run(&self, mut artifacts: Vec<ChunkArtifact>, cancel: &CancellationToken) -> Result<Option<Mosaic>> {
        cancel.checkpoint()?;
        if artifacts.is_empty() {
            return Ok(None);
        }

        // metadata lists keep arrival order; rasters are placed by chunk id
        let mut metadata = TaskMetadata::new();
        for a in &artifacts {
            metadata.extend(a.metadata.clone());
        }
        artifacts.sort_by_key(|a| a.chunk_id);

        let first = &artifacts[0];
        let reference = *first
            .difference
            .transform()
            .ok_or_else(|| fault(first.chunk_id, "artifact has no bands"))?;
        let band_names: Vec<String> = first.difference.names().map(String::from).collect();
        let crs = first.difference.iter().next().and_then(|(_, r)| r.crs().copied());

        for a in &artifacts {
            let names: Vec<&str> = a.difference.names().collect();
            if names != band_names.iter().map(String::as_str).collect::<Vec<_>>() {
                return Err(fault(a.chunk_id, "band set differs from the other chunks"));
            }
            let t = a
                .difference
                .transform()
                .ok_or_else(|| fault(a.chunk_id, "artifact has no bands"))?;
            if !t.same_resolution(&reference) || !t.is_north_up() {
                return Err(fault(a.chunk_id, "pixel size differs from the other chunks"));
            }
            let a_crs = a.difference.iter().next().and_then(|(_, r)| r.crs());
            if let (Some(x), Some(y)) = (a_crs, crs.as_ref()) {
                if !x.is_equivalent(y) {
                    return Err(fault(a.chunk_id, "coordinate system differs from the other chunks"));
                }
            }
            let shape = a.difference.shape().unwrap_or((0, 0));
            if a.out_of_range.shape() != shape || a.no_data.shape() != shape {
                return Err(fault(a.chunk_id, "mask shape differs from the difference bands"));
            }
        }

        let (transform, rows, cols) = union_grid(&artifacts, &reference);
        let placements: Vec<Placement> = artifacts
            .iter()
            .map(|a| place(a, &transform))
            .collect::<Result<_>>()?;
        debug!(chunks = artifacts.len(), rows, cols, "recombining chunks");

        let mut difference = BandSet::new();
        for name in &band_names {
            let mut band = Raster::filled(rows, cols, self.no_data);
            band.set_transform(transform);
            band.set_crs(crs);
            band.set_nodata(Some(self.no_data));
            for (a, p) in artifacts.iter().zip(&placements) {
                band.paste(a.difference.require(name)?, p.row, p.col)?;
            }
            difference.insert(name.as_str(), band)?;
        }

        let mut out_of_range = Array2::from_elem((rows, cols), false);
        let mut no_data = Array2::from_elem((rows, cols), true);
        for (a, p) in artifacts.iter().zip(&placements) {
            let (r, c) = a.out_of_range.shape();
            out_of_range
                .slice_mut(s![p.row..p.row + r, p.col..p.col + c])
                .assign(a.out_of_range.data());
            no_data
                .slice_mut(s![p.row..p.row + r, p.col..p.col + c])
                .assign(a.no_data.data());
        }

        Ok(Some(Mosaic {
            difference,
            out_of_range: Mask::from_array(out_of_range),
            no_data: Mask::from_array(no_data),
            metadata,
        }))
    }
}

fn fault(chunk: usize, msg: &str) -> PipelineError {
    PipelineError::Computation(format!("chunk {chunk}: {msg}"))
}

/// North-up grid covering every artifact, at the reference resolution
fn union_grid(artifacts: &[ChunkArtifact], reference: &GeoTransform) -> (GeoTransform, usize, usize) {
    let mut bounds = (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
    for a in artifacts {
        let (rows, cols) = a.difference.shape().unwrap_or((0, 0));
        if let Some(t) = a.difference.transform() {
            let (x0, y0, x1, y1) = t.bounds(cols, rows);
            bounds = (bounds.0.min(x0), bounds.1.min(y0), bounds.2.max(x1), bounds.3.max(y1));
        }
    }
    let (min_x, min_y, max_x, max_y) = bounds;
    let pw = reference.pixel_width;
    let ph = reference.pixel_height.abs();
    let cols = ((max_x - min_x) / pw).round() as usize;
    let rows = ((max_y - min_y) / ph).round() as usize;
    (
        GeoTransform::new(min_x, max_y, pw, -ph),
        rows,
        cols,
    )
}

fn place(a: &ChunkArtifact, mosaic: &GeoTransform) -> Result<Placement> {
    let t = a
        .difference
        .transform()
        .ok_or_else(|| fault(a.chunk_id, "artifact has no bands"))?;
    let col = ((t.origin_x - mosaic.origin_x) / mosaic.pixel_width).round();
    let row = ((t.origin_y - mosaic.origin_y) / mosaic.pixel_height).round();
    if col < 0.0 || row < 0.0 {
        return Err(fault(a.chunk_id, "artifact lies outside the mosaic grid"));
    }
    Ok(Placement {
        row: row as usize,
        col: col as usize,
    })
}
