//! Final products: numeric exports, the color-coded mosaic and the clean-pixel chart

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use specanom_algorithms::imagery::SpectralIndex;
use specanom_colormap::{ColorScheme, ColormapParams, Rgba, RgbaCanvas};
use specanom_core::io::{write_archive, write_geotiff, write_png, GeoTiffOptions};
use specanom_core::{BandSet, Mask};
use specanom_parallel::CancellationToken;
use tracing::{debug, info};

use crate::config::AnomalyParams;
use crate::error::{PipelineError, Result, StageOutcome};
use crate::recombine::Mosaic;

pub const ARCHIVE_FILE: &str = "data_archive.tif";
pub const GEOTIFF_FILE: &str = "data_geotiff.tif";
pub const PNG_FILE: &str = "png_mosaic.png";

/// Renders the clean-pixel-percentage series of a run
pub trait ChartRenderer: Send + Sync {
    /// File name the chart is written to inside the output directory
    fn file_name(&self) -> &str;

    /// `series` is in chronological order
    fn render(&self, series: &[(DateTime<Utc>, f64)], path: &Path) -> Result<()>;
}

/// Writes the series as JSON for an external plotting step
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSeriesChart;

#[derive(Serialize)]
struct SeriesPoint {
    date: DateTime<Utc>,
    clean_pixel_percentage: f64,
}

impl ChartRenderer for JsonSeriesChart {
    fn file_name(&self) -> &str {
        "plot_series.json"
    }

    fn render(&self, series: &[(DateTime<Utc>, f64)], path: &Path) -> Result<()> {
        let points: Vec<SeriesPoint> = series
            .iter()
            .map(|&(date, clean_pixel_percentage)| SeriesPoint {
                date,
                clean_pixel_percentage,
            })
            .collect();
        let json = serde_json::to_string_pretty(&points)
            .map_err(|e| PipelineError::Chart(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Paths of everything a run wrote
#[derive(Debug, Clone, PartialEq)]
pub struct Products {
    pub archive_path: PathBuf,
    pub geotiff_path: PathBuf,
    pub png_path: PathBuf,
    pub plot_path: Option<PathBuf>,
}

/// Turns a mosaic into files
#[derive(Debug, Clone)]
pub struct ProductAssembler {
    index: SpectralIndex,
    change_range: Option<(f64, f64)>,
    no_data: f64,
    scheme: ColorScheme,
}

impl ProductAssembler {
    pub fn new(params: &AnomalyParams) -> Self {
        Self {
            index: params.spectral_index,
            change_range: params.change_range,
            no_data: params.no_data,
            scheme: params.colormap,
        }
    }

    pub fn assemble(
        &self,
        mosaic: &Mosaic,
        out_dir: &Path,
        chart: &dyn ChartRenderer,
        cancel: &CancellationToken,
    ) -> Result<StageOutcome<Products>> {
        StageOutcome::from_result(self.run(mosaic, out_dir, chart, cancel))
    }

    fn run(
        &self,
        mosaic: &Mosaic,
        out_dir: &Path,
        chart: &dyn ChartRenderer,
        cancel: &CancellationToken,
    ) -> Result<Option<Products>> {
        cancel.checkpoint()?;
        std::fs::create_dir_all(out_dir)?;

        let export = self.export_bands(mosaic)?;
        let canvas = self.visualize(mosaic)?;
        let (rows, cols) = canvas.shape();

        let products = Products {
            archive_path: out_dir.join(ARCHIVE_FILE),
            geotiff_path: out_dir.join(GEOTIFF_FILE),
            png_path: out_dir.join(PNG_FILE),
            plot_path: None,
        };
        write_archive(&export, &products.archive_path)?;
        write_geotiff(
            &export,
            &products.geotiff_path,
            Some(GeoTiffOptions {
                nodata: Some(self.no_data),
            }),
        )?;
        write_png(canvas.into_raw(), rows, cols, &products.png_path)?;
        debug!(rows, cols, bands = export.len(), "wrote raster products");

        let series = mosaic.metadata.clean_percentage_series();
        let plot_path = if series.len() > 1 {
            let path = out_dir.join(chart.file_name());
            chart.render(&series, &path)?;
            Some(path)
        } else {
            None
        };

        info!(dir = %out_dir.display(), "products written");
        Ok(Some(Products {
            plot_path,
            ..products
        }))
    }

    /// Index band(s) of the difference, sentinel wherever the no-data mask is set
    pub fn export_bands(&self, mosaic: &Mosaic) -> Result<BandSet> {
        let mut export = mosaic.difference.select(self.index.output_bands())?;
        let nd = self.no_data;
        for (_, band) in export.iter_mut() {
            ndarray::Zip::from(band.data_mut())
                .and(mosaic.no_data.data())
                .for_each(|v, &missing| {
                    if missing {
                        *v = nd;
                    }
                });
            band.set_nodata(Some(nd));
        }
        Ok(export)
    }

    /// Layered RGBA rendering of the visualization band
    pub fn visualize(&self, mosaic: &Mosaic) -> Result<RgbaCanvas> {
        let raw = mosaic.difference.require(self.index.visualization_band())?;
        let (rows, cols) = raw.shape();

        let mut canvas = match self.change_range {
            Some((lo, hi)) => {
                let mut canvas = RgbaCanvas::filled(rows, cols, Rgba::HIGHLIGHT);
                let outside = Mask::from_raster(raw, |v| v < lo || v > hi);
                canvas.paint(&outside, Rgba::OUT_OF_CHANGE)?;
                canvas
            }
            None => {
                let (dmin, dmax) = self.index.difference_range();
                let mut values = raw.clone();
                ndarray::Zip::from(values.data_mut())
                    .and(mosaic.no_data.data())
                    .for_each(|v, &missing| {
                        if missing {
                            *v = f64::NAN;
                        }
                    });
                values.set_nodata(None);
                RgbaCanvas::from_raster(&values, &ColormapParams::with_range(self.scheme, dmin, dmax))
            }
        };
        canvas.paint(&mosaic.out_of_range, Rgba::OUT_OF_COMPOSITE)?;
        canvas.paint(&mosaic.no_data, Rgba::TRANSPARENT)?;
        Ok(canvas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeWindow;
    use crate::metadata::TaskMetadata;
    use chrono::TimeZone;
    use ndarray::array;
    use specanom_core::{Extent, GeoTransform, Raster};

    const ND: f64 = -9999.0;

    fn params(index: SpectralIndex, change: Option<(f64, f64)>) -> AnomalyParams {
        let t = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let mut p = AnomalyParams::new(
            Extent::new(0.0, 1.0, 0.0, 1.0),
            TimeWindow::new(t, t),
            TimeWindow::new(t, t),
            index,
        );
        p.change_range = change;
        p
    }

    fn mosaic() -> Mosaic {
        let mut band = Raster::from_array(array![[-2.0, 0.0, 2.0, 0.1]]);
        band.set_transform(GeoTransform::new(0.0, 1.0, 0.25, -1.0));
        let mut difference = BandSet::new();
        difference.insert("ndvi", band).unwrap();
        Mosaic {
            difference,
            out_of_range: Mask::from_array(array![[false, true, false, true]]),
            no_data: Mask::from_array(array![[false, false, false, true]]),
            metadata: TaskMetadata::new(),
        }
    }

    #[test]
    fn colormap_layers_without_change_filter() {
        let canvas = ProductAssembler::new(&params(SpectralIndex::Ndvi, None))
            .visualize(&mosaic())
            .unwrap();
        assert_eq!(canvas.pixel(0, 0), Some(Rgba::new(165, 0, 38, 255)));
        assert_eq!(canvas.pixel(0, 1), Some(Rgba::OUT_OF_COMPOSITE));
        assert_eq!(canvas.pixel(0, 2), Some(Rgba::new(0, 104, 55, 255)));
        // no-data wins over out-of-range
        assert_eq!(canvas.pixel(0, 3), Some(Rgba::TRANSPARENT));
    }

    #[test]
    fn change_filter_uses_flat_colors() {
        let canvas = ProductAssembler::new(&params(SpectralIndex::Ndvi, Some((-1.0, 1.0))))
            .visualize(&mosaic())
            .unwrap();
        assert_eq!(canvas.pixel(0, 0), Some(Rgba::OUT_OF_CHANGE));
        assert_eq!(canvas.pixel(0, 1), Some(Rgba::OUT_OF_COMPOSITE));
        assert_eq!(canvas.pixel(0, 2), Some(Rgba::OUT_OF_CHANGE));
        assert_eq!(canvas.pixel(0, 3), Some(Rgba::TRANSPARENT));

        let allowed = [
            Rgba::HIGHLIGHT,
            Rgba::OUT_OF_CHANGE,
            Rgba::OUT_OF_COMPOSITE,
            Rgba::TRANSPARENT,
        ];
        for col in 0..4 {
            assert!(allowed.contains(&canvas.pixel(0, col).unwrap()));
        }
    }

    #[test]
    fn export_marks_no_data_with_sentinel() {
        let export = ProductAssembler::new(&params(SpectralIndex::Ndvi, None))
            .export_bands(&mosaic())
            .unwrap();
        let band = export.require("ndvi").unwrap();
        assert_eq!(band.data(), &array![[-2.0, 0.0, 2.0, ND]]);
        assert_eq!(band.nodata(), Some(ND));
    }

    #[test]
    fn writes_all_products() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = mosaic();
        let mut times = Vec::new();
        for d in [3, 1] {
            times.push(Utc.with_ymd_and_hms(2020, 1, d, 0, 0, 0).unwrap());
        }
        let clean = ndarray::Array3::from_elem((2, 1, 4), true);
        m.metadata
            .record_window(crate::config::WindowKind::Baseline, &times, &clean);

        let products = ProductAssembler::new(&params(SpectralIndex::Ndvi, None))
            .assemble(&m, dir.path(), &JsonSeriesChart, &CancellationToken::new())
            .unwrap()
            .done()
            .unwrap();
        assert!(products.archive_path.exists());
        assert!(products.geotiff_path.exists());
        assert!(products.png_path.exists());
        let plot = products.plot_path.unwrap();
        let series: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(plot).unwrap()).unwrap();
        assert_eq!(series.as_array().unwrap().len(), 2);
        assert_eq!(series[0]["clean_pixel_percentage"], 100.0);

        let archive = specanom_core::io::read_archive(&products.archive_path).unwrap();
        assert_eq!(archive.names().collect::<Vec<_>>(), vec!["ndvi"]);
    }

    #[test]
    fn single_acquisition_skips_chart() {
        let dir = tempfile::tempdir().unwrap();
        let products = ProductAssembler::new(&params(SpectralIndex::Ndvi, None))
            .assemble(&mosaic(), dir.path(), &JsonSeriesChart, &CancellationToken::new())
            .unwrap()
            .done()
            .unwrap();
        assert_eq!(products.plot_path, None);
    }
}
