//! Native GeoTIFF reading/writing on top of the `tiff` crate
//!
//! Reads decode only the tiles or strips that overlap the requested pixel
//! window, so a [`GeoTiffReader`] over an HTTP range source fetches a few
//! chunks of a Sentinel-2 COG instead of the whole 110 km tile.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::geometry::BBox;
use crate::raster::{GeoTransform, GridSpec, Raster, RasterElement};
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::{Gray32Float, RGBA8};
use tiff::encoder::{ImageEncoder, TiffEncoder, TiffKind};
use tiff::tags::Tag;

const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;

/// Rectangular block of pixels, in source pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub col_off: usize,
    pub row_off: usize,
    pub cols: usize,
    pub rows: usize,
}

impl PixelWindow {
    pub fn full(cols: usize, rows: usize) -> Self {
        Self {
            col_off: 0,
            row_off: 0,
            cols,
            rows,
        }
    }
}

/// GeoTIFF opened for windowed reads.
///
/// Georeferencing (tiepoint + pixel scale), EPSG code and GDAL nodata are
/// read from the first IFD, which for a COG is the full-resolution image.
pub struct GeoTiffReader<R: Read + Seek> {
    decoder: Decoder<R>,
    width: usize,
    height: usize,
    transform: GeoTransform,
    crs: Option<CRS>,
    nodata: Option<f64>,
}

impl<R: Read + Seek> GeoTiffReader<R> {
    pub fn new(reader: R) -> Result<Self> {
        let mut decoder = Decoder::new(reader)?;
        let (width, height) = decoder.dimensions()?;
        let transform = read_geotransform(&mut decoder).unwrap_or_default();
        let crs = read_epsg(&mut decoder).map(CRS::from_epsg);
        let nodata = decoder
            .get_tag_ascii_string(Tag::GdalNodata)
            .ok()
            .and_then(|s| s.trim_matches(char::from(0)).trim().parse::<f64>().ok());

        Ok(Self {
            decoder,
            width: width as usize,
            height: height as usize,
            transform,
            crs,
            nodata,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    /// Pixel window covering `bbox` (in the file's CRS), clipped to the
    /// image. `None` when the box misses the image entirely.
    pub fn window_for_bbox(&self, bbox: &BBox) -> Option<PixelWindow> {
        let (c0, r0) = self.transform.geo_to_pixel(bbox.min_x, bbox.max_y);
        let (c1, r1) = self.transform.geo_to_pixel(bbox.max_x, bbox.min_y);
        if ![c0, r0, c1, r1].iter().all(|v| v.is_finite()) {
            return None;
        }

        let col_start = c0.min(c1).floor().max(0.0) as usize;
        let row_start = r0.min(r1).floor().max(0.0) as usize;
        let col_end = (c0.max(c1).ceil().max(0.0) as usize).min(self.width);
        let row_end = (r0.max(r1).ceil().max(0.0) as usize).min(self.height);

        if col_start >= col_end || row_start >= row_end {
            return None;
        }
        Some(PixelWindow {
            col_off: col_start,
            row_off: row_start,
            cols: col_end - col_start,
            rows: row_end - row_start,
        })
    }

    /// Decode `window` as `f64`; cells equal to the file nodata become NaN.
    pub fn read_window(&mut self, window: PixelWindow) -> Result<Raster<f64>> {
        if window.cols == 0
            || window.rows == 0
            || window.col_off + window.cols > self.width
            || window.row_off + window.rows > self.height
        {
            return Err(Error::WindowOutside);
        }

        let (chunk_w, chunk_h) = self.decoder.chunk_dimensions();
        let (chunk_w, chunk_h) = (chunk_w as usize, chunk_h as usize);
        if chunk_w == 0 || chunk_h == 0 {
            return Err(Error::InvalidDimensions {
                width: chunk_w,
                height: chunk_h,
            });
        }
        let chunks_across = self.width.div_ceil(chunk_w);

        let mut out = vec![f64::NAN; window.rows * window.cols];
        let first_cx = window.col_off / chunk_w;
        let last_cx = (window.col_off + window.cols - 1) / chunk_w;
        let first_cy = window.row_off / chunk_h;
        let last_cy = (window.row_off + window.rows - 1) / chunk_h;

        for cy in first_cy..=last_cy {
            for cx in first_cx..=last_cx {
                let index = (cy * chunks_across + cx) as u32;
                let (data_w, data_h) = self.decoder.chunk_data_dimensions(index);
                let (data_w, data_h) = (data_w as usize, data_h as usize);
                let values = decoded_to_f64(self.decoder.read_chunk(index)?)?;
                // compressed tiles are padded to the full chunk width
                let stride = if values.len() >= chunk_w * data_h { chunk_w } else { data_w };

                let x0 = cx * chunk_w;
                let y0 = cy * chunk_h;
                let col_lo = window.col_off.max(x0);
                let col_hi = (window.col_off + window.cols).min(x0 + data_w);
                let row_lo = window.row_off.max(y0);
                let row_hi = (window.row_off + window.rows).min(y0 + data_h);

                for row in row_lo..row_hi {
                    let src = (row - y0) * stride;
                    let dst = (row - window.row_off) * window.cols;
                    for col in col_lo..col_hi {
                        if let Some(&v) = values.get(src + col - x0) {
                            out[dst + col - window.col_off] = v;
                        }
                    }
                }
            }
        }

        if let Some(nd) = self.nodata {
            for v in out.iter_mut().filter(|v| **v == nd) {
                *v = f64::NAN;
            }
        }

        let mut raster = Raster::from_vec(out, window.rows, window.cols)?;
        raster.set_transform(self.transform.window(window.col_off, window.row_off));
        raster.set_crs(self.crs.clone());
        raster.set_nodata(Some(f64::NAN));
        Ok(raster)
    }

    /// Decode the whole image
    pub fn read_all(&mut self) -> Result<Raster<f64>> {
        self.read_window(PixelWindow::full(self.width, self.height))
    }
}

/// Read a GeoTIFF file into a Raster, casting cells to `T`
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let mut reader = GeoTiffReader::new(File::open(path.as_ref())?)?;
    let raster = reader.read_all()?;
    let mut cast = raster.map(|v| num_traits::cast(v).unwrap_or(T::default_nodata()));
    if reader.nodata().is_some() {
        cast.set_nodata(Some(T::default_nodata()));
    }
    Ok(cast)
}

fn decoded_to_f64(result: DecodingResult) -> Result<Vec<f64>> {
    fn widen<V: Copy + Into<f64>>(buf: Vec<V>) -> Vec<f64> {
        buf.into_iter().map(Into::into).collect()
    }
    Ok(match result {
        DecodingResult::U8(buf) => widen(buf),
        DecodingResult::U16(buf) => widen(buf),
        DecodingResult::U32(buf) => widen(buf),
        DecodingResult::I8(buf) => widen(buf),
        DecodingResult::I16(buf) => widen(buf),
        DecodingResult::I32(buf) => widen(buf),
        DecodingResult::F32(buf) => widen(buf),
        DecodingResult::F64(buf) => buf,
        _ => {
            return Err(Error::UnsupportedDataType(
                "64-bit integer TIFF samples".to_string(),
            ))
        }
    })
}

fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }
    // tiepoint: [I, J, K, X, Y, Z]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

fn read_epsg<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<u32> {
    let keys = decoder.get_tag_u16_vec(Tag::GeoKeyDirectoryTag).ok()?;
    // header [version, rev, minor, count] then (key, location, count, value)
    let count = *keys.get(3)? as usize;
    keys.get(4..4 + count * 4)?
        .chunks_exact(4)
        .find(|e| (e[0] == PROJECTED_CS_TYPE_KEY || e[0] == GEOGRAPHIC_TYPE_KEY) && e[1] == 0)
        .map(|e| e[3] as u32)
}

fn geo_keys(crs: Option<&CRS>) -> Vec<u16> {
    let epsg = crs.and_then(CRS::epsg);
    let geographic = crs.map_or(true, CRS::is_geographic);
    let mut keys: Vec<u16> = vec![
        1, 1, 0, 0,
        1024, 0, 1, if geographic { 2 } else { 1 },
        1025, 0, 1, 1, // RasterPixelIsArea
    ];
    if let Some(code) = epsg.and_then(|c| u16::try_from(c).ok()) {
        let key = if geographic {
            GEOGRAPHIC_TYPE_KEY
        } else {
            PROJECTED_CS_TYPE_KEY
        };
        keys.extend_from_slice(&[key, 0, 1, code]);
    }
    keys[3] = ((keys.len() - 4) / 4) as u16;
    keys
}

fn write_georeferencing<W, K, C>(
    image: &mut ImageEncoder<'_, W, C, K>,
    transform: &GeoTransform,
    crs: Option<&CRS>,
) -> Result<()>
where
    W: Write + Seek,
    K: TiffKind,
    C: tiff::encoder::colortype::ColorType,
{
    let scale = [transform.pixel_width, transform.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelPixelScaleTag, &scale[..])?;

    let tiepoint = [0.0, 0.0, 0.0, transform.origin_x, transform.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelTiepointTag, &tiepoint[..])?;

    let keys = geo_keys(crs);
    image
        .encoder()
        .write_tag(Tag::GeoKeyDirectoryTag, &keys[..])?;
    Ok(())
}

/// Write a single-band raster as 32-bit float GeoTIFF; NaN marks nodata
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let mut encoder = TiffEncoder::new(File::create(path.as_ref())?)?;
    let (rows, cols) = raster.shape();

    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| {
            if raster.is_nodata(v) {
                f32::NAN
            } else {
                num_traits::cast(v).unwrap_or(f32::NAN)
            }
        })
        .collect();

    let mut image = encoder.new_image::<Gray32Float>(cols as u32, rows as u32)?;
    write_georeferencing(&mut image, raster.transform(), raster.crs())?;
    image
        .encoder()
        .write_tag(Tag::GdalNodata, "nan")?;
    image.write_data(&data)?;
    Ok(())
}

/// Write interleaved 8-bit RGBA pixels laid out on `grid` as a GeoTIFF
pub fn write_rgba_geotiff<P: AsRef<Path>>(path: P, grid: &GridSpec, pixels: &[u8]) -> Result<()> {
    if pixels.len() != grid.len() * 4 {
        return Err(Error::InvalidDimensions {
            width: grid.cols,
            height: grid.rows,
        });
    }
    let mut encoder = TiffEncoder::new(File::create(path.as_ref())?)?;
    let mut image = encoder.new_image::<RGBA8>(grid.cols as u32, grid.rows as u32)?;
    write_georeferencing(&mut image, &grid.transform, Some(&grid.crs))?;
    image.write_data(pixels)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn utm_raster() -> Raster<f64> {
        let data: Vec<f64> = (0..12).map(|v| v as f64 * 100.0).collect();
        let mut r = Raster::from_vec(data, 3, 4).unwrap();
        r.set_transform(GeoTransform::new(500_000.0, 1_200_000.0, 10.0, -10.0));
        r.set_crs(Some(CRS::from_epsg(32618)));
        r
    }

    #[test]
    fn write_then_read_keeps_georeferencing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b04.tif");
        write_geotiff(&utm_raster(), &path).unwrap();

        let mut reader = GeoTiffReader::new(File::open(&path).unwrap()).unwrap();
        assert_eq!((reader.width(), reader.height()), (4, 3));
        assert_eq!(reader.crs().and_then(|c| c.epsg()), Some(32618));
        assert_relative_eq!(reader.transform().origin_x, 500_000.0);
        assert_relative_eq!(reader.transform().pixel_height, -10.0);

        let full = reader.read_all().unwrap();
        assert_relative_eq!(full.get(2, 3).unwrap(), 1100.0);
    }

    #[test]
    fn window_read_shifts_transform() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b08.tif");
        write_geotiff(&utm_raster(), &path).unwrap();

        let mut reader = GeoTiffReader::new(File::open(&path).unwrap()).unwrap();
        let window = PixelWindow {
            col_off: 1,
            row_off: 1,
            cols: 2,
            rows: 2,
        };
        let part = reader.read_window(window).unwrap();
        assert_eq!(part.shape(), (2, 2));
        assert_relative_eq!(part.get(0, 0).unwrap(), 500.0);
        assert_relative_eq!(part.get(1, 1).unwrap(), 1000.0);
        assert_relative_eq!(part.transform().origin_x, 500_010.0);
        assert_relative_eq!(part.transform().origin_y, 1_199_990.0);

        let outside = PixelWindow {
            col_off: 3,
            row_off: 0,
            cols: 2,
            rows: 1,
        };
        assert!(reader.read_window(outside).is_err());
    }

    #[test]
    fn window_for_bbox_clips_to_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scl.tif");
        write_geotiff(&utm_raster(), &path).unwrap();
        let reader = GeoTiffReader::new(File::open(&path).unwrap()).unwrap();

        let w = reader
            .window_for_bbox(&BBox::new(500_015.0, 1_199_000.0, 600_000.0, 1_199_985.0))
            .unwrap();
        assert_eq!(w, PixelWindow { col_off: 1, row_off: 1, cols: 3, rows: 2 });
        assert!(reader
            .window_for_bbox(&BBox::new(0.0, 0.0, 10.0, 10.0))
            .is_none());
    }

    #[test]
    fn georeferencing_uses_geotiff_tags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tags.tif");
        write_geotiff(&utm_raster(), &path).unwrap();

        let mut decoder = Decoder::new(File::open(&path).unwrap()).unwrap();
        let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag).unwrap();
        assert_eq!(&scale[..2], &[10.0, 10.0]);
        let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag).unwrap();
        assert_eq!(&tiepoint[3..5], &[500_000.0, 1_200_000.0]);
        assert_eq!(read_epsg(&mut decoder), Some(32618));
        let transform = read_geotransform(&mut decoder).unwrap();
        assert_relative_eq!(transform.origin_y, 1_200_000.0);
        assert!(decoder.get_tag_ascii_string(Tag::GdalNodata).is_ok());
    }

    #[test]
    fn nan_cells_survive_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ndvi.tif");
        let mut r = utm_raster();
        r.set(0, 0, f64::NAN).unwrap();
        write_geotiff(&r, &path).unwrap();

        let back: Raster<f64> = read_geotiff(&path).unwrap();
        assert!(back.get(0, 0).unwrap().is_nan());
        assert_eq!(back.valid_count(), 11);
    }

    #[test]
    fn rgba_writer_checks_buffer_size() {
        let dir = tempfile::tempdir().unwrap();
        let grid = GridSpec::new(GeoTransform::new(-74.6, 10.85, 0.001, -0.001), 2, 3, CRS::wgs84());
        let path = dir.path().join("frame.tif");
        assert!(write_rgba_geotiff(&path, &grid, &[0u8; 10]).is_err());
        write_rgba_geotiff(&path, &grid, &[255u8; 24]).unwrap();

        let reader = GeoTiffReader::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(reader.crs().and_then(|c| c.epsg()), Some(4326));
        assert_eq!((reader.width(), reader.height()), (3, 2));
    }
}
