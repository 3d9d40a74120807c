//! GeoTIFF tag plumbing shared by the GeoTIFF and archive codecs

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::GeoTransform;
use std::io::{Read, Seek, Write};
use tiff::decoder::Decoder;
use tiff::encoder::{DirectoryEncoder, TiffKind};
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

pub(crate) fn codec_err(context: &str, e: impl std::fmt::Display) -> Error {
    Error::Codec(format!("{}: {}", context, e))
}

/// Write pixel scale and tiepoint, plus geokeys and the no-data tag when known
pub(crate) fn write_georef<W: Write + Seek, K: TiffKind>(
    dir: &mut DirectoryEncoder<'_, W, K>,
    transform: &GeoTransform,
    crs: Option<&CRS>,
    nodata: Option<f64>,
) -> Result<()> {
    let scale = [transform.pixel_width, transform.pixel_height.abs(), 0.0];
    dir.write_tag(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE), &scale[..])
        .map_err(|e| codec_err("cannot write scale tag", e))?;

    let tiepoint = [0.0, 0.0, 0.0, transform.origin_x, transform.origin_y, 0.0];
    dir.write_tag(Tag::from_u16_exhaustive(MODEL_TIEPOINT), &tiepoint[..])
        .map_err(|e| codec_err("cannot write tiepoint tag", e))?;

    // GTRasterTypeGeoKey = RasterPixelIsArea. No CRS means no geokeys, so an
    // unreferenced raster reads back unreferenced.
    let geokeys: Option<Vec<u16>> = match crs.and_then(|c| c.epsg()) {
        Some(4326) => Some(vec![
            1, 1, 0, 3,
            1024, 0, 1, 2,
            1025, 0, 1, 1,
            2048, 0, 1, 4326,
        ]),
        Some(code) if code <= u16::MAX as u32 => Some(vec![
            1, 1, 0, 3,
            1024, 0, 1, 1,
            1025, 0, 1, 1,
            3072, 0, 1, code as u16,
        ]),
        _ => None,
    };
    if let Some(keys) = geokeys {
        dir.write_tag(Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY), keys.as_slice())
            .map_err(|e| codec_err("cannot write geokey tag", e))?;
    }

    if let Some(nd) = nodata {
        let text = format!("{}", nd);
        dir.write_tag(Tag::from_u16_exhaustive(GDAL_NODATA), text.as_str())
            .map_err(|e| codec_err("cannot write nodata tag", e))?;
    }
    Ok(())
}

/// Geotransform from pixel scale + tiepoint tags of the current image
pub(crate) fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<GeoTransform> {
    let scale = decoder
        .get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE))
        .map_err(|_| Error::Codec("no pixel scale tag".into()))?;
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_TIEPOINT))
        .map_err(|_| Error::Codec("no tiepoint tag".into()))?;

    if scale.len() >= 2 && tiepoint.len() >= 6 {
        // tiepoint: [I, J, K, X, Y, Z]
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
        return Ok(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]));
    }

    Err(Error::Codec("cannot determine geotransform".into()))
}

/// GDAL-style ascii no-data value of the current image, if any
pub(crate) fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    decoder
        .get_tag_ascii_string(Tag::from_u16_exhaustive(GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim().trim_end_matches('\0').parse::<f64>().ok())
}

/// EPSG code from the projected or geographic CS geokey of the current image
pub(crate) fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let keys = decoder
        .get_tag_u16_vec(Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY))
        .ok()?;
    let count = *keys.get(3)? as usize;
    let entries = keys.get(4..4 + 4 * count)?;
    let code = |wanted: u16| {
        entries
            .chunks_exact(4)
            .find(|e| e[0] == wanted && e[1] == 0)
            .map(|e| e[3] as u32)
    };
    code(3072).or_else(|| code(2048)).map(CRS::from_epsg)
}
