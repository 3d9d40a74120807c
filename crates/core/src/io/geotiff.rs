//! Native GeoTIFF reading/writing via the `tiff` crate

use super::tags::{codec_err, read_crs, read_geotransform, read_nodata, write_georef};
use crate::error::{Error, Result};
use crate::raster::{BandSet, Raster, RasterElement};
use std::fs::File;
use std::io::{BufWriter, Read, Seek};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;

/// Options for writing GeoTIFF files
#[derive(Debug, Clone, Default)]
pub struct GeoTiffOptions {
    /// Value written to the GDAL no-data tag and stored in NaN cells
    pub nodata: Option<f64>,
}

/// Read the first image of a GeoTIFF file into a Raster
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    decode_geotiff(file)
}

fn decode_geotiff<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement,
    R: Read + Seek,
{
    let mut decoder = Decoder::new(reader).map_err(|e| codec_err("TIFF decode error", e))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| codec_err("cannot read dimensions", e))?;
    let rows = height as usize;
    let cols = width as usize;

    let transform = read_geotransform(&mut decoder).ok();
    let nodata = read_nodata(&mut decoder);
    let crs = read_crs(&mut decoder);

    let result = decoder
        .read_image()
        .map_err(|e| codec_err("cannot read image data", e))?;

    let data: Vec<T> = cast_samples(result)?;
    if data.len() != rows * cols {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;
    if let Some(transform) = transform {
        raster.set_transform(transform);
    }
    raster.set_nodata(nodata.and_then(|v| num_traits::cast(v)));
    raster.set_crs(crs);
    Ok(raster)
}

pub(super) fn cast_samples<T: RasterElement>(result: DecodingResult) -> Result<Vec<T>> {
    fn cast_all<S: Copy + num_traits::NumCast, T: RasterElement>(buf: Vec<S>) -> Vec<T> {
        buf.into_iter()
            .map(|v| num_traits::cast(v).unwrap_or(T::default_nodata()))
            .collect()
    }

    Ok(match result {
        DecodingResult::F32(buf) => cast_all(buf),
        DecodingResult::F64(buf) => cast_all(buf),
        DecodingResult::U8(buf) => cast_all(buf),
        DecodingResult::U16(buf) => cast_all(buf),
        DecodingResult::U32(buf) => cast_all(buf),
        DecodingResult::I8(buf) => cast_all(buf),
        DecodingResult::I16(buf) => cast_all(buf),
        DecodingResult::I32(buf) => cast_all(buf),
        _ => {
            return Err(Error::UnsupportedDataType(
                "Unsupported TIFF pixel format".to_string(),
            ))
        }
    })
}

/// Write the bands of `bands` as float32 pages of one GeoTIFF, in band order.
///
/// NaN cells are replaced by `options.nodata` when it is set.
pub fn write_geotiff<P: AsRef<Path>>(
    bands: &BandSet,
    path: P,
    options: Option<GeoTiffOptions>,
) -> Result<()> {
    let options = options.unwrap_or_default();
    let file = BufWriter::new(File::create(path.as_ref())?);
    let mut encoder = TiffEncoder::new(file).map_err(|e| codec_err("TIFF encoder error", e))?;

    for (_, raster) in bands.iter() {
        let (rows, cols) = raster.shape();
        let data: Vec<f32> = raster
            .data()
            .iter()
            .map(|&v| match (v.is_nan(), options.nodata) {
                (true, Some(nd)) => nd as f32,
                _ => v as f32,
            })
            .collect();

        let mut image = encoder
            .new_image::<Gray32Float>(cols as u32, rows as u32)
            .map_err(|e| codec_err("cannot create TIFF image", e))?;
        write_georef(image.encoder(), raster.transform(), raster.crs(), options.nodata)?;
        image
            .write_data(&data)
            .map_err(|e| codec_err("cannot write image data", e))?;
    }

    Ok(())
}
