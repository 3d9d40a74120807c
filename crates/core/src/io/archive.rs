//! Archival multi-band rasters.
//!
//! One float64 TIFF page per band. The band name is stored in the page's
//! `ImageDescription`, georeferencing and the sentinel in GeoTIFF/GDAL tags,
//! so `read_archive(write_archive(x)) == x` bit for bit.

use super::geotiff::cast_samples;
use super::tags::{codec_err, read_crs, read_geotransform, read_nodata, write_georef};
use crate::error::{Error, Result};
use crate::raster::{BandSet, Raster};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tiff::decoder::Decoder;
use tiff::encoder::colortype::Gray64Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

/// Write every band of `bands` to `path`
pub fn write_archive<P: AsRef<Path>>(bands: &BandSet, path: P) -> Result<()> {
    if bands.is_empty() {
        return Err(Error::Codec("refusing to write an archive without bands".into()));
    }
    let file = BufWriter::new(File::create(path.as_ref())?);
    let mut encoder = TiffEncoder::new(file).map_err(|e| codec_err("TIFF encoder error", e))?;

    for (name, raster) in bands.iter() {
        let (rows, cols) = raster.shape();
        let data: Vec<f64> = raster.data().iter().copied().collect();

        let mut image = encoder
            .new_image::<Gray64Float>(cols as u32, rows as u32)
            .map_err(|e| codec_err("cannot create archive page", e))?;
        image
            .encoder()
            .write_tag(Tag::ImageDescription, name)
            .map_err(|e| codec_err("cannot write band name", e))?;
        write_georef(image.encoder(), raster.transform(), raster.crs(), raster.nodata())?;
        image
            .write_data(&data)
            .map_err(|e| codec_err("cannot write archive page", e))?;
    }
    Ok(())
}

/// Read every page of an archive written by [`write_archive`]
pub fn read_archive<P: AsRef<Path>>(path: P) -> Result<BandSet> {
    let file = BufReader::new(File::open(path.as_ref())?);
    let mut decoder = Decoder::new(file).map_err(|e| codec_err("TIFF decode error", e))?;
    let mut bands = BandSet::new();

    loop {
        let (width, height) = decoder
            .dimensions()
            .map_err(|e| codec_err("cannot read dimensions", e))?;
        let name = decoder
            .get_tag_ascii_string(Tag::ImageDescription)
            .map(|s| s.trim_end_matches('\0').to_string())
            .unwrap_or_else(|_| format!("band_{}", bands.len() + 1));
        let transform = read_geotransform(&mut decoder)?;
        let nodata = read_nodata(&mut decoder);
        let crs = read_crs(&mut decoder);

        let samples = decoder
            .read_image()
            .map_err(|e| codec_err("cannot read archive page", e))?;
        let mut raster: Raster<f64> =
            Raster::from_vec(cast_samples(samples)?, height as usize, width as usize)?;
        raster.set_transform(transform);
        raster.set_nodata(nodata);
        raster.set_crs(crs);
        bands.insert(name, raster)?;

        if !decoder.more_images() {
            break;
        }
        decoder
            .next_image()
            .map_err(|e| codec_err("cannot advance to next page", e))?;
    }

    Ok(bands)
}
