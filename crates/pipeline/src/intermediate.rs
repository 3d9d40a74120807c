//! Spill storage for chunk artifacts between processing and recombination
//!
//! Layout per chunk: `<id>.tif` (difference bands, archival codec),
//! `<id>_out_of_range.tif` and `<id>_no_data.tif` (0/1 masks) and
//! `<id>_metadata.json`.

use std::path::{Path, PathBuf};

use chrono::Utc;
use specanom_core::io::{read_archive, write_archive};
use specanom_core::{BandSet, Mask};
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::metadata::TaskMetadata;
use crate::processor::ChunkArtifact;

const MASK_BAND: &str = "flags";

/// A per-run directory, removed when the store is dropped
#[derive(Debug)]
pub struct IntermediateStore {
    dir: PathBuf,
}

impl IntermediateStore {
    /// Create a fresh run directory below `root`
    pub fn create(root: &Path) -> Result<Self> {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.f");
        let dir = root.join(format!("run-{stamp}-{}", std::process::id()));
        std::fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "intermediate directory created");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, chunk_id: usize, suffix: &str) -> PathBuf {
        self.dir.join(format!("{chunk_id}{suffix}"))
    }

    pub fn spill(&self, artifact: &ChunkArtifact) -> Result<()> {
        let id = artifact.chunk_id;
        let template = artifact
            .difference
            .iter()
            .next()
            .map(|(_, band)| band)
            .ok_or_else(|| PipelineError::Computation(format!("chunk {id} has no difference bands")))?;

        write_archive(&artifact.difference, self.path(id, ".tif"))?;
        for (mask, suffix) in [
            (&artifact.out_of_range, "_out_of_range.tif"),
            (&artifact.no_data, "_no_data.tif"),
        ] {
            let mut set = BandSet::new();
            set.insert(MASK_BAND, mask.to_flags(template)?)?;
            write_archive(&set, self.path(id, suffix))?;
        }
        let json = serde_json::to_string(&artifact.metadata)?;
        std::fs::write(self.path(id, "_metadata.json"), json)?;
        Ok(())
    }

    pub fn load(&self, chunk_id: usize) -> Result<ChunkArtifact> {
        let difference = read_archive(self.path(chunk_id, ".tif"))?;
        let out_of_range = self.load_mask(chunk_id, "_out_of_range.tif")?;
        let no_data = self.load_mask(chunk_id, "_no_data.tif")?;
        let json = std::fs::read_to_string(self.path(chunk_id, "_metadata.json"))?;
        let metadata: TaskMetadata = serde_json::from_str(&json)?;
        Ok(ChunkArtifact {
            chunk_id,
            difference,
            out_of_range,
            no_data,
            metadata,
        })
    }

    fn load_mask(&self, chunk_id: usize, suffix: &str) -> Result<Mask> {
        let set = read_archive(self.path(chunk_id, suffix))?;
        Ok(Mask::from_flags(set.require(MASK_BAND)?))
    }
}

impl Drop for IntermediateStore {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            warn!(dir = %self.dir.display(), error = %e, "could not remove intermediate directory");
        }
    }
}
