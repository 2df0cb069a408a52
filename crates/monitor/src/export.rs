//! Image export of rendered frames

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use vegmon_core::io::write_rgba_geotiff;

use crate::error::Result;
use crate::frames::ExportFrame;

/// Destination for rendered frames
pub trait ImageSink: Send + Sync {
    /// Store `frame` under its identifier; returns where it went
    fn write_image(&self, frame: &ExportFrame) -> Result<PathBuf>;
}

impl<K: ImageSink + ?Sized> ImageSink for &K {
    fn write_image(&self, frame: &ExportFrame) -> Result<PathBuf> {
        (**self).write_image(frame)
    }
}

/// Georeferenced RGBA GeoTIFF at `<dir>/<identifier>.tif`
#[derive(Debug, Clone)]
pub struct GeoTiffImageSink {
    dir: PathBuf,
}

impl GeoTiffImageSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ImageSink for GeoTiffImageSink {
    fn write_image(&self, frame: &ExportFrame) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{}.tif", frame.identifier));
        write_rgba_geotiff(&path, &frame.grid, frame.image.pixels())?;
        debug!(
            path = %path.display(),
            width = frame.image.width(),
            height = frame.image.height(),
            "frame image written"
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use vegmon_colormap::RgbaImage;
    use vegmon_core::io::GeoTiffReader;
    use vegmon_core::{GeoTransform, GridSpec, CRS};

    fn frame(grid: GridSpec, image: RgbaImage) -> ExportFrame {
        ExportFrame {
            month: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            area_ha: 153.4,
            n_scenes: 3,
            identifier: "Pajarales_2025-06_153ha".into(),
            image,
            grid,
        }
    }

    fn utm_grid() -> GridSpec {
        GridSpec::new(
            GeoTransform::new(500_000.0, 1_200_030.0, 10.0, -10.0),
            3,
            4,
            CRS::from_epsg(32618),
        )
    }

    #[test]
    fn writes_georeferenced_tiff_named_by_identifier() {
        let dir = tempfile::tempdir().unwrap();
        let grid = utm_grid();
        let image = RgbaImage::transparent(grid.cols, grid.rows);
        let sink = GeoTiffImageSink::new(dir.path().join("CGSM_ComplejoPajarales"));

        let path = sink.write_image(&frame(grid.clone(), image)).unwrap();
        assert!(path.ends_with("CGSM_ComplejoPajarales/Pajarales_2025-06_153ha.tif"));

        let reader = GeoTiffReader::new(std::fs::File::open(&path).unwrap()).unwrap();
        assert_eq!((reader.width(), reader.height()), (grid.cols, grid.rows));
        assert_eq!(reader.crs().and_then(|c| c.epsg()), Some(32618));
    }

    #[test]
    fn mismatched_pixels_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let sink = GeoTiffImageSink::new(dir.path());
        let bad = frame(utm_grid(), RgbaImage::transparent(1, 1));
        assert!(sink.write_image(&bad).is_err());
    }
}
