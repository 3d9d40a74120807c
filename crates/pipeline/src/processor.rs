//! Per-chunk compositing and anomaly masks
//!
//! For each window the processor loads the chunk's stack, masks it, reduces it
//! to a composite, derives the spectral index and flags out-of-range pixels.
//! The two windows are then differenced into a [`ChunkArtifact`].

use std::sync::Arc;

use specanom_algorithms::imagery::{
    composite_clean_mask, rescale, stack_clean_mask, AcceptAll, CleanMaskRule, CompositeMethod,
    SensorMask, SpectralIndex, SpectralIndexFn,
};
use specanom_core::{BandSet, Mask};
use specanom_parallel::{CancellationToken, ProgressCounter};
use tracing::debug;

use crate::config::{AnomalyParams, WindowKind};
use crate::error::{Result, StageOutcome};
use crate::metadata::TaskMetadata;
use crate::planner::GeographicChunk;
use crate::source::DataSource;

/// Output of one chunk: difference bands plus the combined masks on the same grid
#[derive(Debug, Clone)]
pub struct ChunkArtifact {
    pub chunk_id: usize,
    /// Analysis minus baseline, derived index bands only
    pub difference: BandSet,
    pub out_of_range: Mask,
    pub no_data: Mask,
    pub metadata: TaskMetadata,
}

/// Scenes credited to the progress counter when a window of this chunk completes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SceneShare {
    pub baseline: u64,
    pub analysis: u64,
}

impl SceneShare {
    fn for_window(&self, kind: WindowKind) -> u64 {
        match kind {
            WindowKind::Baseline => self.baseline,
            WindowKind::Analysis => self.analysis,
        }
    }
}

struct WindowComposite {
    composite: BandSet,
    out_of_range: Mask,
}

/// Which composite cells count as no-data for an index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoDataRule {
    /// Reference band of either window is the sentinel
    ReferenceBand,
    /// As `ReferenceBand`, or the index band of either window is the sentinel
    ReferenceOrIndex,
    /// Any cover band of the baseline composite is the sentinel
    BaselineCover,
}

impl NoDataRule {
    pub fn for_index(index: SpectralIndex) -> Self {
        match index {
            SpectralIndex::Evi => NoDataRule::ReferenceOrIndex,
            SpectralIndex::FractionalCover => NoDataRule::BaselineCover,
            _ => NoDataRule::ReferenceBand,
        }
    }
}

/// Processes chunks independently; holds no per-chunk state
pub struct ChunkProcessor {
    params: Arc<AnomalyParams>,
    source: Arc<dyn DataSource>,
    sensor: Box<dyn SensorMask>,
    composite: Box<dyn CompositeMethod>,
    index: Box<dyn SpectralIndexFn>,
}

impl ChunkProcessor {
    /// Processor using the reference implementations named by `params`
    pub fn new(params: Arc<AnomalyParams>, source: Arc<dyn DataSource>) -> Self {
        let sensor: Box<dyn SensorMask> = match &params.sensor_mask {
            Some(qa) => Box::new(qa.clone()),
            None => Box::new(AcceptAll),
        };
        let composite = params.composite_method.method();
        let index = params.spectral_index.function();
        Self {
            params,
            source,
            sensor,
            composite,
            index,
        }
    }

    pub fn with_sensor_mask(mut self, sensor: Box<dyn SensorMask>) -> Self {
        self.sensor = sensor;
        self
    }

    pub fn with_composite_method(mut self, composite: Box<dyn CompositeMethod>) -> Self {
        self.composite = composite;
        self
    }

    pub fn with_index_function(mut self, index: Box<dyn SpectralIndexFn>) -> Self {
        self.index = index;
        self
    }

    /// Run one chunk to completion, emptiness or cancellation
    pub fn process(
        &self,
        chunk: &GeographicChunk,
        share: SceneShare,
        progress: &ProgressCounter,
        cancel: &CancellationToken,
    ) -> Result<StageOutcome<ChunkArtifact>> {
        StageOutcome::from_result(self.run(chunk, share, progress, cancel))
    }

    fn run(
        &self,
        chunk: &GeographicChunk,
        share: SceneShare,
        progress: &ProgressCounter,
        cancel: &CancellationToken,
    ) -> Result<Option<ChunkArtifact>> {
        let mut metadata = TaskMetadata::new();

        let Some(baseline) =
            self.process_window(chunk, WindowKind::Baseline, share, &mut metadata, progress, cancel)?
        else {
            return Ok(None);
        };
        let Some(analysis) =
            self.process_window(chunk, WindowKind::Analysis, share, &mut metadata, progress, cancel)?
        else {
            return Ok(None);
        };

        cancel.checkpoint()?;
        let measurements = self.params.load_measurements();
        let difference = analysis
            .composite
            .without(&measurements)
            .difference(&baseline.composite)?;
        let out_of_range = baseline.out_of_range.or(&analysis.out_of_range)?;
        let no_data = self.no_data_mask(&baseline.composite, &analysis.composite)?;

        let (rows, cols) = out_of_range.shape();
        metadata.record_chunk_pixels((rows * cols) as u64);
        debug!(chunk = chunk.id, rows, cols, "chunk composited");

        Ok(Some(ChunkArtifact {
            chunk_id: chunk.id,
            difference,
            out_of_range,
            no_data,
            metadata,
        }))
    }

    fn process_window(
        &self,
        chunk: &GeographicChunk,
        kind: WindowKind,
        share: SceneShare,
        metadata: &mut TaskMetadata,
        progress: &ProgressCounter,
        cancel: &CancellationToken,
    ) -> Result<Option<WindowComposite>> {
        let params = &self.params;
        let nd = params.no_data;
        let rule: CleanMaskRule = params.clean_mask_rule;

        cancel.checkpoint()?;
        let stack = self.source.load_raster_stack(
            &chunk.extent,
            chunk.edges,
            params.window(kind),
            &params.load_measurements(),
        )?;
        cancel.checkpoint()?;
        if stack.is_empty() {
            debug!(chunk = chunk.id, window = %kind, "no covering data");
            return Ok(None);
        }

        let clean = stack_clean_mask(&stack, self.sensor.as_ref(), nd, rule)?;
        cancel.checkpoint()?;

        let mut composite = self.composite.compose(&stack, &clean, nd)?;
        cancel.checkpoint()?;

        let composite_clean = composite_clean_mask(&composite, params.reference_band(), nd, rule)?;
        let mut derived = self.index.compute(&composite, &composite_clean, nd)?;
        if let Some(working) = params.spectral_index.working_range() {
            let logical = params.spectral_index.logical_range();
            for (_, band) in derived.iter_mut() {
                *band = rescale(band, working, logical, nd);
            }
        }
        composite.merge(derived)?;
        cancel.checkpoint()?;

        let out_of_range = self.out_of_range(&composite)?;

        metadata.record_window(kind, stack.times(), &clean);
        progress.add(share.for_window(kind));

        Ok(Some(WindowComposite {
            composite,
            out_of_range,
        }))
    }

    /// True where any index band lies outside the composite range
    fn out_of_range(&self, composite: &BandSet) -> Result<Mask> {
        let (lo, hi) = self.params.composite_range();
        let mut mask: Option<Mask> = None;
        for name in self.params.spectral_index.output_bands() {
            let band = composite.require(name)?;
            let flags = Mask::from_raster(band, |v| v < lo || v > hi);
            mask = Some(match mask {
                Some(m) => m.or(&flags)?,
                None => flags,
            });
        }
        let (rows, cols) = composite.shape().unwrap_or((0, 0));
        Ok(mask.unwrap_or_else(|| Mask::new(rows, cols)))
    }

    fn no_data_mask(&self, baseline: &BandSet, analysis: &BandSet) -> Result<Mask> {
        let nd = self.params.no_data;
        let sentinel = |set: &BandSet, name: &str| -> Result<Mask> {
            Ok(Mask::from_raster(set.require(name)?, |v| v == nd || v.is_nan()))
        };
        let reference = self.params.reference_band();
        let index = self.params.spectral_index;

        match NoDataRule::for_index(index) {
            NoDataRule::ReferenceBand => {
                sentinel(baseline, reference)?.or(&sentinel(analysis, reference)?).map_err(Into::into)
            }
            NoDataRule::ReferenceOrIndex => {
                let band = index.output_bands()[0];
                let reference = sentinel(baseline, reference)?.or(&sentinel(analysis, reference)?)?;
                let derived = sentinel(baseline, band)?.or(&sentinel(analysis, band)?)?;
                Ok(reference.or(&derived)?)
            }
            NoDataRule::BaselineCover => {
                let mut mask = sentinel(baseline, "bs")?;
                for band in ["pv", "npv"] {
                    mask = mask.or(&sentinel(baseline, band)?)?;
                }
                Ok(mask)
            }
        }
    }
}
