//! Run orchestration: validate, plan, fan out, recombine, assemble
//!
//! [`Workflow::run`] drives the stages in order and keeps a [`TaskRecord`]
//! current. Chunk failures are retried; cancellation and configuration
//! errors end the run at once.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use crossbeam_channel::Sender;
use specanom_parallel::{CancellationToken, ParallelStrategy, ProgressCounter};
use tracing::{debug, error, info, warn};

use crate::assemble::{ChartRenderer, JsonSeriesChart, ProductAssembler};
use crate::config::{AnomalyParams, WindowKind};
use crate::error::{PipelineError, Result, StageOutcome};
use crate::intermediate::IntermediateStore;
use crate::planner::{ChunkPlanner, GeographicChunk};
use crate::processor::{ChunkArtifact, ChunkProcessor, SceneShare};
use crate::recombine::ChunkRecombiner;
use crate::source::DataSource;
use crate::task::{TaskRecord, TaskStatus};

pub const MSG_PARSED: &str = "Parsed out parameters.";
pub const MSG_VALIDATED: &str = "Validated parameters.";
pub const MSG_CHUNKED: &str = "Chunked parameter set.";
pub const MSG_STARTED: &str = "Starting processing.";
pub const MSG_DONE: &str = "All products have been generated.";
pub const MSG_NO_DATA: &str = "No data was found for the requested extent.";
pub const MSG_CANCELLED: &str = "Task was cancelled.";

/// Progress notifications for an observer such as a progress bar
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    Status { status: TaskStatus, message: String },
    Planned { chunks: usize, total_scenes: u64 },
    /// `produced` is false for chunks without covering data
    ChunkFinished { chunk_id: usize, produced: bool },
    Progress { processed: u64, total: u64 },
}

/// Where a finished chunk's artifact lives until recombination
enum Held {
    Memory(ChunkArtifact),
    Spilled(usize),
}

pub struct Workflow {
    params: Arc<AnomalyParams>,
    source: Arc<dyn DataSource>,
    processor: ChunkProcessor,
    chart: Box<dyn ChartRenderer>,
    events: Option<Sender<WorkflowEvent>>,
    cancel: CancellationToken,
    progress: ProgressCounter,
}

impl Workflow {
    pub fn new(params: AnomalyParams, source: Arc<dyn DataSource>) -> Self {
        let params = Arc::new(params);
        let processor = ChunkProcessor::new(params.clone(), source.clone());
        Self {
            params,
            source,
            processor,
            chart: Box::new(JsonSeriesChart),
            events: None,
            cancel: CancellationToken::new(),
            progress: ProgressCounter::default(),
        }
    }

    pub fn with_events(mut self, events: Sender<WorkflowEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_chart_renderer(mut self, chart: Box<dyn ChartRenderer>) -> Self {
        self.chart = chart;
        self
    }

    /// Swap pluggable parts of the chunk processor
    pub fn map_processor(mut self, f: impl FnOnce(ChunkProcessor) -> ChunkProcessor) -> Self {
        self.processor = f(self.processor);
        self
    }

    /// Token that aborts the run at its next checkpoint
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn progress(&self) -> ProgressCounter {
        self.progress.clone()
    }

    pub fn params(&self) -> &AnomalyParams {
        &self.params
    }

    /// Execute the whole run, writing products below `output_dir`.
    ///
    /// Failures are reported through the returned record, never as a panic.
    pub fn run(&self, output_dir: &Path) -> TaskRecord {
        let started = Instant::now();
        let mut record = TaskRecord::new();
        record.execution_start = Some(Utc::now());
        self.set_status(&mut record, TaskStatus::Wait, MSG_PARSED);

        let (status, message) = match self.execute(&mut record, output_dir) {
            Ok(StageOutcome::Done(())) => (TaskStatus::Ok, MSG_DONE.to_string()),
            Ok(StageOutcome::Empty) => (TaskStatus::Error, MSG_NO_DATA.to_string()),
            Ok(StageOutcome::Cancelled) => (TaskStatus::Cancelled, MSG_CANCELLED.to_string()),
            Err(e) => {
                error!(error = %e, "run failed");
                (TaskStatus::Error, e.to_string())
            }
        };
        record.scenes_processed = self.progress.processed();
        record.finish(status, message.clone());
        self.emit(WorkflowEvent::Status { status, message });
        info!(
            status = ?record.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "run finished"
        );
        record
    }

    fn execute(&self, record: &mut TaskRecord, output_dir: &Path) -> Result<StageOutcome<()>> {
        let params = &self.params;
        params.validate()?;

        let mut totals = [0u64; 2];
        for (total, kind) in totals.iter_mut().zip(WindowKind::BOTH) {
            let dates = self
                .source
                .list_acquisition_dates(&params.extent, params.window(kind))?;
            if dates.is_empty() {
                return Err(PipelineError::NoAcquisitions { window: kind });
            }
            *total = dates.len() as u64;
        }
        let measurements = params.load_measurements();
        if !self.source.validate_measurements(&measurements) {
            return Err(PipelineError::Configuration(format!(
                "unsupported measurement set: {}",
                measurements.join(", ")
            )));
        }
        self.set_status(record, TaskStatus::Wait, MSG_VALIDATED);

        let chunks = ChunkPlanner::new(params.chunk_size).plan(&params.extent)?;
        self.set_status(record, TaskStatus::Wait, MSG_CHUNKED);

        let baseline = apportion(totals[0], chunks.len());
        let analysis = apportion(totals[1], chunks.len());
        record.total_scenes = totals.iter().sum();
        record.scenes_processed = 0;
        self.progress.reset(record.total_scenes);
        info!(chunks = chunks.len(), total_scenes = record.total_scenes, "planned run");
        self.emit(WorkflowEvent::Planned {
            chunks: chunks.len(),
            total_scenes: record.total_scenes,
        });
        self.set_status(record, TaskStatus::Wait, MSG_STARTED);

        let store = params
            .intermediate_dir
            .as_deref()
            .map(IntermediateStore::create)
            .transpose()?;

        let results = params.processing_mode.par_map(0..chunks.len(), |i| {
            let share = SceneShare {
                baseline: baseline[i],
                analysis: analysis[i],
            };
            self.run_chunk(&chunks[i], share, store.as_ref())
        });

        let mut held = Vec::new();
        for result in results {
            match result? {
                StageOutcome::Done(h) => held.push(h),
                StageOutcome::Empty => {}
                StageOutcome::Cancelled => return Ok(StageOutcome::Cancelled),
            }
        }
        debug!(artifacts = held.len(), "fan-out complete");

        let mut artifacts = Vec::with_capacity(held.len());
        for h in held {
            artifacts.push(match (h, store.as_ref()) {
                (Held::Memory(a), _) => a,
                (Held::Spilled(id), Some(store)) => store.load(id)?,
                (Held::Spilled(id), None) => {
                    return Err(PipelineError::Computation(format!(
                        "chunk {id} was spilled without an intermediate directory"
                    )))
                }
            });
        }

        let mosaic = match ChunkRecombiner::new(params.no_data).recombine(artifacts, &self.cancel)? {
            StageOutcome::Done(m) => m,
            StageOutcome::Empty => return Ok(StageOutcome::Empty),
            StageOutcome::Cancelled => return Ok(StageOutcome::Cancelled),
        };
        record.apply_metadata(&mosaic.metadata);

        let assembler = ProductAssembler::new(params);
        match assembler.assemble(&mosaic, output_dir, self.chart.as_ref(), &self.cancel)? {
            StageOutcome::Done(products) => {
                record.apply_products(&products);
                Ok(StageOutcome::Done(()))
            }
            StageOutcome::Empty => Ok(StageOutcome::Empty),
            StageOutcome::Cancelled => Ok(StageOutcome::Cancelled),
        }
    }

    /// Process one chunk, retrying retryable failures
    fn run_chunk(
        &self,
        chunk: &GeographicChunk,
        share: SceneShare,
        store: Option<&IntermediateStore>,
    ) -> Result<StageOutcome<Held>> {
        let started = Instant::now();
        let mut attempt = 0;
        let outcome = loop {
            match self.processor.process(chunk, share, &self.progress, &self.cancel) {
                Err(e) if e.is_retryable() && attempt < self.params.max_chunk_retries => {
                    attempt += 1;
                    warn!(chunk = chunk.id, attempt, error = %e, "chunk failed, retrying");
                }
                Err(e) => {
                    error!(chunk = chunk.id, error = %e, "chunk failed");
                    return Err(e);
                }
                Ok(outcome) => break outcome,
            }
        };

        let held = match outcome {
            StageOutcome::Done(artifact) => match store {
                Some(store) => {
                    store.spill(&artifact)?;
                    StageOutcome::Done(Held::Spilled(artifact.chunk_id))
                }
                None => StageOutcome::Done(Held::Memory(artifact)),
            },
            StageOutcome::Empty => StageOutcome::Empty,
            StageOutcome::Cancelled => return Ok(StageOutcome::Cancelled),
        };

        let produced = matches!(held, StageOutcome::Done(_));
        debug!(
            chunk = chunk.id,
            produced,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "chunk finished"
        );
        self.emit(WorkflowEvent::ChunkFinished {
            chunk_id: chunk.id,
            produced,
        });
        self.emit(WorkflowEvent::Progress {
            processed: self.progress.processed(),
            total: self.progress.total(),
        });
        Ok(held)
    }

    fn set_status(&self, record: &mut TaskRecord, status: TaskStatus, message: &str) {
        info!(?status, "{message}");
        record.update_status(status, message);
        self.emit(WorkflowEvent::Status {
            status,
            message: message.to_string(),
        });
    }

    fn emit(&self, event: WorkflowEvent) {
        if let Some(tx) = &self.events {
            // a closed receiver only means nobody is watching
            let _ = tx.send(event);
        }
    }
}

/// Split `total` into `parts` shares that sum exactly to `total`.
///
/// Shares are equal; the remainder goes one each to the lowest indices.
pub fn apportion(total: u64, parts: usize) -> Vec<u64> {
    if parts == 0 {
        return Vec::new();
    }
    let n = parts as u64;
    let (base, rem) = (total / n, total % n);
    (0..n).map(|i| base + u64::from(i < rem)).collect()
}
