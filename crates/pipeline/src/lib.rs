//! # specanom pipeline
//!
//! Chunked spectral-anomaly detection between a baseline and an analysis
//! time window.
//!
//! A run is planned into geographic chunks ([`ChunkPlanner`]), each chunk is
//! composited and differenced independently ([`ChunkProcessor`]), the chunk
//! artifacts are stitched into one mosaic ([`ChunkRecombiner`]) and turned
//! into files ([`ProductAssembler`]). [`Workflow`] drives the whole chain.

pub mod assemble;
pub mod config;
pub mod error;
pub mod intermediate;
pub mod metadata;
pub mod planner;
pub mod processor;
pub mod recombine;
pub mod source;
pub mod task;
pub mod workflow;

pub use assemble::{ChartRenderer, JsonSeriesChart, ProductAssembler, Products};
pub use config::{AnomalyParams, ChunkSize, TimeWindow, WindowKind, DEFAULT_NO_DATA};
pub use error::{PipelineError, Result, StageOutcome};
pub use intermediate::IntermediateStore;
pub use metadata::{AcquisitionRecord, MetadataSummary, TaskMetadata};
pub use planner::{ChunkPlanner, GeographicChunk};
pub use processor::{ChunkArtifact, ChunkProcessor, NoDataRule, SceneShare};
pub use recombine::{ChunkRecombiner, Mosaic};
pub use source::{CatalogEntry, CatalogManifest, DataSource, InMemorySource, Scene, SceneCatalog};
pub use task::{TaskRecord, TaskStatus};
pub use workflow::{apportion, Workflow, WorkflowEvent};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        AnomalyParams, DataSource, PipelineError, Result, StageOutcome, TaskRecord, TaskStatus,
        TimeWindow, Workflow, WorkflowEvent,
    };
    pub use specanom_algorithms::prelude::*;
}
