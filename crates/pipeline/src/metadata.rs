//! Acquisition metadata accumulated across windows and chunks
//!
//! Only lists are stored. Merging concatenates them; every statistic is
//! derived from the lists on demand, so merged values never depend on how
//! the work was split.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ndarray::Axis;
use serde::{Deserialize, Serialize};
use specanom_core::CleanMask;

use crate::config::WindowKind;

/// Clean-pixel accounting for one acquisition over one chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionRecord {
    pub date: DateTime<Utc>,
    pub clean_pixels: u64,
    pub total_pixels: u64,
    pub window: WindowKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub acquisitions: Vec<AcquisitionRecord>,
    /// Pixel count of every chunk artifact folded in
    pub chunk_pixels: Vec<u64>,
}

/// Derived view written to the task record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataSummary {
    pub acquisition_list: Vec<DateTime<Utc>>,
    pub clean_pixel_percentages_per_acquisition: Vec<f64>,
    pub clean_pixel_percentage: f64,
    pub pixel_count: u64,
}

impl TaskMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one record per acquisition of a stack's clean mask
    pub fn record_window(&mut self, window: WindowKind, times: &[DateTime<Utc>], clean: &CleanMask) {
        for (t, slice) in times.iter().zip(clean.axis_iter(Axis(0))) {
            self.acquisitions.push(AcquisitionRecord {
                date: *t,
                clean_pixels: slice.iter().filter(|&&c| c).count() as u64,
                total_pixels: slice.len() as u64,
                window,
            });
        }
    }

    pub fn record_chunk_pixels(&mut self, pixels: u64) {
        self.chunk_pixels.push(pixels);
    }

    /// Concatenate `other` after `self`
    pub fn extend(&mut self, other: TaskMetadata) {
        self.acquisitions.extend(other.acquisitions);
        self.chunk_pixels.extend(other.chunk_pixels);
    }

    /// Sorted unique acquisition dates
    pub fn acquisition_dates(&self) -> Vec<DateTime<Utc>> {
        self.per_date().into_keys().collect()
    }

    /// `(date, clean %)` in chronological order, pooled over chunks
    pub fn clean_percentage_series(&self) -> Vec<(DateTime<Utc>, f64)> {
        self.per_date()
            .into_iter()
            .map(|(date, (clean, total))| (date, percentage(clean, total)))
            .collect()
    }

    /// Clean share of every observed sample
    pub fn clean_pixel_percentage(&self) -> f64 {
        let clean = self.acquisitions.iter().map(|a| a.clean_pixels).sum();
        let total = self.acquisitions.iter().map(|a| a.total_pixels).sum();
        percentage(clean, total)
    }

    pub fn pixel_count(&self) -> u64 {
        self.chunk_pixels.iter().sum()
    }

    pub fn summary(&self) -> MetadataSummary {
        let series = self.clean_percentage_series();
        MetadataSummary {
            acquisition_list: series.iter().map(|(d, _)| *d).collect(),
            clean_pixel_percentages_per_acquisition: series.iter().map(|(_, p)| *p).collect(),
            clean_pixel_percentage: self.clean_pixel_percentage(),
            pixel_count: self.pixel_count(),
        }
    }

    fn per_date(&self) -> BTreeMap<DateTime<Utc>, (u64, u64)> {
        let mut map = BTreeMap::new();
        for a in &self.acquisitions {
            let entry = map.entry(a.date).or_insert((0, 0));
            entry.0 += a.clean_pixels;
            entry.1 += a.total_pixels;
        }
        map
    }
}

fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}
