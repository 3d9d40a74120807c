//! Task record: the status document a run keeps up to date

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assemble::Products;
use crate::error::Result;
use crate::metadata::TaskMetadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Wait,
    Ok,
    Error,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub status: TaskStatus,
    pub message: String,
    pub total_scenes: u64,
    pub scenes_processed: u64,
    pub complete: bool,
    pub execution_start: Option<DateTime<Utc>>,
    pub execution_end: Option<DateTime<Utc>>,

    pub archive_path: Option<PathBuf>,
    pub geotiff_path: Option<PathBuf>,
    /// Color-coded mosaic
    pub result_path: Option<PathBuf>,
    pub plot_path: Option<PathBuf>,

    pub acquisition_list: Vec<DateTime<Utc>>,
    pub clean_pixel_percentages_per_acquisition: Vec<f64>,
    pub clean_pixel_percentage: f64,
    pub pixel_count: u64,
}

impl Default for TaskRecord {
    fn default() -> Self {
        Self {
            status: TaskStatus::Wait,
            message: String::new(),
            total_scenes: 0,
            scenes_processed: 0,
            complete: false,
            execution_start: None,
            execution_end: None,
            archive_path: None,
            geotiff_path: None,
            result_path: None,
            plot_path: None,
            acquisition_list: Vec::new(),
            clean_pixel_percentages_per_acquisition: Vec::new(),
            clean_pixel_percentage: 0.0,
            pixel_count: 0,
        }
    }
}

impl TaskRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_status(&mut self, status: TaskStatus, message: impl Into<String>) {
        self.status = status;
        self.message = message.into();
    }

    /// Terminal transition; stamps `execution_end`
    pub fn finish(&mut self, status: TaskStatus, message: impl Into<String>) {
        self.update_status(status, message);
        self.complete = true;
        self.execution_end = Some(Utc::now());
    }

    pub fn is_terminal(&self) -> bool {
        self.complete
    }

    pub fn apply_metadata(&mut self, metadata: &TaskMetadata) {
        let summary = metadata.summary();
        self.acquisition_list = summary.acquisition_list;
        self.clean_pixel_percentages_per_acquisition =
            summary.clean_pixel_percentages_per_acquisition;
        self.clean_pixel_percentage = summary.clean_pixel_percentage;
        self.pixel_count = summary.pixel_count;
    }

    pub fn apply_products(&mut self, products: &Products) {
        self.archive_path = Some(products.archive_path.clone());
        self.geotiff_path = Some(products.geotiff_path.clone());
        self.result_path = Some(products.png_path.clone());
        self.plot_path = products.plot_path.clone();
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
