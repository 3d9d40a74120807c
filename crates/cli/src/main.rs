//! specanom CLI - chunked spectral-anomaly change runs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::Receiver;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use specanom_core::io::read_archive;
use specanom_parallel::ProcessingMode;
use specanom_pipeline::{
    AnomalyParams, ChunkPlanner, SceneCatalog, TaskStatus, Workflow, WorkflowEvent,
};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "specanom")]
#[command(author, version, about = "Chunked spectral-anomaly detection", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the chunk grid of a parameter set
    Plan {
        /// Parameter file (JSON)
        #[arg(short, long)]
        params: PathBuf,
    },
    /// Run a change detection and write its products
    Run {
        /// Parameter file (JSON)
        #[arg(short, long)]
        params: PathBuf,
        /// Scene catalog manifest (JSON)
        #[arg(short, long)]
        catalog: PathBuf,
        /// Output directory
        #[arg(short, long)]
        output: PathBuf,
        /// Worker threads (default: all cores)
        #[arg(short, long)]
        threads: Option<usize>,
    },
    /// Show bands and statistics of an archival raster
    Info {
        /// Archive written by `run`
        #[arg(short, long)]
        archive: PathBuf,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")
}

fn load_params(path: &Path) -> Result<AnomalyParams> {
    AnomalyParams::from_json_file(path)
        .with_context(|| format!("Failed to read parameters from {}", path.display()))
}

fn progress_bar() -> Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} scenes {msg}")
            .context("invalid progress template")?
            .progress_chars("=> "),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    Ok(pb)
}

/// Drive the bar until the workflow drops its sender
fn follow(events: Receiver<WorkflowEvent>, pb: ProgressBar) {
    for event in events {
        match event {
            WorkflowEvent::Planned { total_scenes, .. } => pb.set_length(total_scenes),
            // retries can credit a window twice
            WorkflowEvent::Progress { processed, total } => pb.set_position(processed.min(total)),
            WorkflowEvent::Status { message, .. } => pb.set_message(message),
            WorkflowEvent::ChunkFinished { .. } => {}
        }
    }
    pb.finish_and_clear();
}

fn run(params: &Path, catalog: &Path, output: &Path, threads: Option<usize>) -> Result<()> {
    let mut params = load_params(params)?;
    if let Some(n) = threads {
        params.processing_mode = ProcessingMode::ParallelWith(n);
    }
    let catalog = SceneCatalog::open(catalog)
        .with_context(|| format!("Failed to open catalog {}", catalog.display()))?;
    info!("Catalog: {} scenes", catalog.len());
    std::fs::create_dir_all(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;

    let (tx, rx) = crossbeam_channel::unbounded();
    let pb = progress_bar()?;
    let watcher = std::thread::spawn(move || follow(rx, pb));

    let start = Instant::now();
    let record = {
        let workflow = Workflow::new(params, Arc::new(catalog)).with_events(tx);
        workflow.run(output)
    };
    let elapsed = start.elapsed();
    if watcher.join().is_err() {
        tracing::warn!("progress display thread panicked");
    }

    let task_path = output.join("task.json");
    record
        .write_json(&task_path)
        .context("Failed to write task record")?;

    println!("Status: {:?} - {}", record.status, record.message);
    println!("Scenes: {}/{}", record.scenes_processed, record.total_scenes);
    for path in [
        &record.archive_path,
        &record.geotiff_path,
        &record.result_path,
        &record.plot_path,
    ]
    .into_iter()
    .flatten()
    {
        println!("  {}", path.display());
    }
    println!("Task record saved to: {}", task_path.display());
    println!("  Processing time: {:.2?}", elapsed);

    if record.status != TaskStatus::Ok {
        anyhow::bail!("{}", record.message);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Plan { params } => {
            let params = load_params(&params)?;
            let chunks = ChunkPlanner::new(params.chunk_size)
                .plan(&params.extent)
                .context("Failed to plan chunks")?;
            println!("{} chunks", chunks.len());
            for c in &chunks {
                println!(
                    "  #{:<4} row {:<3} col {:<3} lon [{:.4}, {:.4}{} lat [{:.4}, {:.4}{}",
                    c.id,
                    c.row,
                    c.col,
                    c.extent.min_lon,
                    c.extent.max_lon,
                    if c.edges.include_max_lon { "]" } else { ")" },
                    c.extent.min_lat,
                    c.extent.max_lat,
                    if c.edges.include_max_lat { "]" } else { ")" },
                );
            }
        }

        Commands::Run {
            params,
            catalog,
            output,
            threads,
        } => run(&params, &catalog, &output, threads)?,

        Commands::Info { archive } => {
            let bands = read_archive(&archive).context("Failed to read archive")?;
            println!("File: {}", archive.display());
            if let Some((_, first)) = bands.iter().next() {
                let (rows, cols) = first.shape();
                let (min_x, min_y, max_x, max_y) = first.bounds();
                println!("Dimensions: {} x {} ({} cells)", cols, rows, rows * cols);
                println!(
                    "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                    min_x, min_y, max_x, max_y
                );
            }
            for (name, raster) in bands.iter() {
                let stats = raster.statistics();
                println!("\nBand '{}':", name);
                if let Some(nodata) = raster.nodata() {
                    println!("  NoData: {}", nodata);
                }
                if let Some(min) = stats.min {
                    println!("  Min: {:.4}", min);
                }
                if let Some(max) = stats.max {
                    println!("  Max: {:.4}", max);
                }
                if let Some(mean) = stats.mean {
                    println!("  Mean: {:.4}", mean);
                }
                println!(
                    "  Valid cells: {} ({:.1}%)",
                    stats.valid_count,
                    100.0 * stats.valid_count as f64 / raster.len().max(1) as f64
                );
            }
        }
    }

    Ok(())
}
