//! Run parameters
//!
//! `AnomalyParams` is read from JSON. Everything except the extent, the two
//! time windows and the spectral index has a default.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use specanom_algorithms::imagery::{CleanMaskRule, CompositeKind, QaBitMask, SpectralIndex};
use specanom_colormap::ColorScheme;
use specanom_core::Extent;
use specanom_parallel::ProcessingMode;

use crate::error::{PipelineError, Result};

/// Default no-data sentinel.
pub const DEFAULT_NO_DATA: f64 = -9999.0;

/// Inclusive acquisition time range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, t: &DateTime<Utc>) -> bool {
        *t >= self.start && *t <= self.end
    }
}

/// The two windows of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    Baseline,
    Analysis,
}

impl WindowKind {
    pub const BOTH: [WindowKind; 2] = [WindowKind::Baseline, WindowKind::Analysis];
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WindowKind::Baseline => "baseline",
            WindowKind::Analysis => "analysis",
        })
    }
}

/// Chunk dimensions in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChunkSize {
    pub lon_step: f64,
    pub lat_step: f64,
}

impl Default for ChunkSize {
    fn default() -> Self {
        Self {
            lon_step: 0.5,
            lat_step: 0.5,
        }
    }
}

/// All parameters of a change run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyParams {
    pub extent: Extent,
    pub baseline: TimeWindow,
    pub analysis: TimeWindow,
    pub spectral_index: SpectralIndex,

    /// Loaded bands; the first one is the reference band
    #[serde(default = "default_measurements")]
    pub measurements: Vec<String>,
    /// Accepted composite index values, inclusive; `None` means the
    /// index's logical range
    #[serde(default)]
    pub composite_range: Option<(f64, f64)>,
    /// Accepted difference values, inclusive; `None` disables the filter
    #[serde(default)]
    pub change_range: Option<(f64, f64)>,
    #[serde(default)]
    pub chunk_size: ChunkSize,
    #[serde(default = "default_no_data")]
    pub no_data: f64,
    #[serde(default)]
    pub composite_method: CompositeKind,
    #[serde(default)]
    pub clean_mask_rule: CleanMaskRule,
    /// Sensor QA test; `None` accepts every sample
    #[serde(default)]
    pub sensor_mask: Option<QaBitMask>,
    #[serde(default)]
    pub processing_mode: ProcessingMode,
    #[serde(default)]
    pub colormap: ColorScheme,
    #[serde(default = "default_retries")]
    pub max_chunk_retries: u32,
    /// Where chunk artifacts are spilled between processing and recombination
    #[serde(default)]
    pub intermediate_dir: Option<PathBuf>,
}

fn default_measurements() -> Vec<String> {
    ["red", "green", "blue", "nir", "swir1", "swir2"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_no_data() -> f64 {
    DEFAULT_NO_DATA
}

fn default_retries() -> u32 {
    2
}

impl AnomalyParams {
    /// Parameters with every optional field at its default
    pub fn new(
        extent: Extent,
        baseline: TimeWindow,
        analysis: TimeWindow,
        spectral_index: SpectralIndex,
    ) -> Self {
        Self {
            extent,
            baseline,
            analysis,
            spectral_index,
            measurements: default_measurements(),
            composite_range: None,
            change_range: None,
            chunk_size: ChunkSize::default(),
            no_data: DEFAULT_NO_DATA,
            composite_method: CompositeKind::default(),
            clean_mask_rule: CleanMaskRule::default(),
            sensor_mask: None,
            processing_mode: ProcessingMode::default(),
            colormap: ColorScheme::default(),
            max_chunk_retries: default_retries(),
            intermediate_dir: None,
        }
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn window(&self, kind: WindowKind) -> &TimeWindow {
        match kind {
            WindowKind::Baseline => &self.baseline,
            WindowKind::Analysis => &self.analysis,
        }
    }

    /// Accepted composite values, falling back to the index's logical range
    pub fn composite_range(&self) -> (f64, f64) {
        self.composite_range
            .unwrap_or_else(|| self.spectral_index.logical_range())
    }

    /// The reference band, used as the no-data proxy
    pub fn reference_band(&self) -> &str {
        self.measurements.first().map(String::as_str).unwrap_or("red")
    }

    /// Measurements plus the sensor QA band, without duplicates
    pub fn load_measurements(&self) -> Vec<String> {
        let mut bands = self.measurements.clone();
        if let Some(qa) = &self.sensor_mask {
            if !bands.contains(&qa.band) {
                bands.push(qa.band.clone());
            }
        }
        bands
    }

    /// Check every parameter before any data is touched
    pub fn validate(&self) -> Result<()> {
        self.extent
            .validate()
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;

        let ChunkSize { lon_step, lat_step } = self.chunk_size;
        if !(lon_step.is_finite() && lon_step > 0.0 && lat_step.is_finite() && lat_step > 0.0) {
            return Err(config(format!(
                "chunk steps must be positive and finite, got ({lon_step}, {lat_step})"
            )));
        }

        for kind in WindowKind::BOTH {
            let w = self.window(kind);
            if w.start > w.end {
                return Err(config(format!(
                    "{kind} window starts after it ends ({} > {})",
                    w.start, w.end
                )));
            }
        }

        let (cmin, cmax) = self.composite_range();
        if !(cmin.is_finite() && cmax.is_finite()) || cmin > cmax {
            return Err(config(format!("invalid composite range ({cmin}, {cmax})")));
        }
        if let Some((lo, hi)) = self.change_range {
            if !(lo.is_finite() && hi.is_finite()) || lo > hi {
                return Err(config(format!("invalid change range ({lo}, {hi})")));
            }
        }

        if self.measurements.is_empty() {
            return Err(config("no measurements requested".to_string()));
        }
        let required = self
            .spectral_index
            .required_bands()
            .iter()
            .chain(self.composite_method.method().required_bands());
        for band in required {
            if !self.measurements.iter().any(|m| m == band) {
                return Err(config(format!(
                    "measurement '{band}' is required by {} / {:?}",
                    self.spectral_index.display_name(),
                    self.composite_method
                )));
            }
        }

        let nd = self.no_data;
        if !nd.is_finite() {
            return Err(config(format!("no-data sentinel must be finite, got {nd}")));
        }
        let (lmin, lmax) = self.spectral_index.logical_range();
        let inside = |(lo, hi): (f64, f64)| nd >= lo && nd <= hi;
        if inside(self.composite_range()) || inside((lmin, lmax)) {
            return Err(config(format!(
                "no-data sentinel {nd} lies inside the accepted value range"
            )));
        }
        if self.change_range.is_some_and(inside) {
            return Err(config(format!(
                "no-data sentinel {nd} lies inside the change range"
            )));
        }

        if matches!(self.processing_mode, ProcessingMode::ParallelWith(0)) {
            return Err(config("thread count must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn config(msg: String) -> PipelineError {
    PipelineError::Configuration(msg)
}
