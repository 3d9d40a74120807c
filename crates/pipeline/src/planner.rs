//! Spatial decomposition of an extent into independent chunks

use serde::{Deserialize, Serialize};
use specanom_core::{EdgeRule, Extent};

use crate::config::ChunkSize;
use crate::error::{PipelineError, Result};

/// One tile of the requested extent.
///
/// Owns `[min, max)` on both axes; the easternmost column also owns `max_lon`
/// and the northernmost row also owns `max_lat`, as recorded in `edges`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeographicChunk {
    pub id: usize,
    /// Grid row, 0 is northernmost
    pub row: usize,
    /// Grid column, 0 is westernmost
    pub col: usize,
    pub extent: Extent,
    pub edges: EdgeRule,
}

impl GeographicChunk {
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        self.extent.contains(lon, lat, self.edges)
    }
}

/// Splits an extent into a row-major grid of chunks
#[derive(Debug, Clone, Copy)]
pub struct ChunkPlanner {
    size: ChunkSize,
}

impl ChunkPlanner {
    pub fn new(size: ChunkSize) -> Self {
        Self { size }
    }

    pub fn plan(&self, extent: &Extent) -> Result<Vec<GeographicChunk>> {
        extent
            .validate()
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;
        let ChunkSize { lon_step, lat_step } = self.size;
        for (name, step) in [("lon_step", lon_step), ("lat_step", lat_step)] {
            if !(step.is_finite() && step > 0.0) {
                return Err(PipelineError::Configuration(format!(
                    "{name} must be positive and finite, got {step}"
                )));
            }
        }

        let lon_edges = edges(extent.min_lon, extent.max_lon, lon_step);
        // north to south so that row 0 is the northernmost
        let mut lat_edges = edges(extent.min_lat, extent.max_lat, lat_step);
        lat_edges.reverse();

        let cols = lon_edges.len() - 1;
        let rows = lat_edges.len() - 1;
        let mut chunks = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                chunks.push(GeographicChunk {
                    id: row * cols + col,
                    row,
                    col,
                    extent: Extent::new(
                        lon_edges[col],
                        lon_edges[col + 1],
                        lat_edges[row + 1],
                        lat_edges[row],
                    ),
                    edges: EdgeRule {
                        include_max_lon: col == cols - 1,
                        include_max_lat: row == 0,
                    },
                });
            }
        }
        Ok(chunks)
    }
}

/// Ascending boundaries from `min` to `max` every `step`; the last one is `max` exactly.
fn edges(min: f64, max: f64, step: f64) -> Vec<f64> {
    let span = (max - min) / step;
    // a span within rounding noise of a whole number gets no sliver chunk
    let count = if (span - span.round()).abs() < 1e-9 {
        span.round()
    } else {
        span.ceil()
    }
    .max(1.0) as usize;

    let mut out: Vec<f64> = (0..count).map(|i| min + i as f64 * step).collect();
    out.push(max);
    out
}
