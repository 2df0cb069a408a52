//! Target grids for analysis and export
//!
//! A [`GridSpec`] is a raster layout without data: transform, shape and CRS.
//! Band reads are warped onto a grid spec so that every scene of a month
//! lines up pixel for pixel before compositing.

use crate::crs::{CRS, EARTH_RADIUS_M, METERS_PER_DEGREE};
use crate::error::{Error, Result};
use crate::geometry::BBox;
use crate::raster::GeoTransform;

/// Raster layout: georeferencing, dimensions and CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSpec {
    pub transform: GeoTransform,
    pub rows: usize,
    pub cols: usize,
    pub crs: CRS,
}

impl GridSpec {
    pub fn new(transform: GeoTransform, rows: usize, cols: usize, crs: CRS) -> Self {
        Self {
            transform,
            rows,
            cols,
            crs,
        }
    }

    /// WGS84 grid covering `bbox` (degrees) with cells of roughly `scale_m`
    /// metres on a side.
    ///
    /// The cell size in degrees is derived at the bbox's central latitude,
    /// so cells are square on the ground near the AOI.
    pub fn geographic(bbox: &BBox, scale_m: f64) -> Result<Self> {
        if !(scale_m.is_finite() && scale_m > 0.0) {
            return Err(Error::InvalidParameter {
                name: "scale_m",
                value: scale_m.to_string(),
                reason: "must be a positive number of metres".into(),
            });
        }
        if !bbox.is_valid() {
            return Err(Error::InvalidGeometry(format!("degenerate bbox {bbox:?}")));
        }

        let center_lat = (bbox.min_y + bbox.max_y) / 2.0;
        let cos_lat = center_lat.to_radians().cos().max(1e-6);

        let dy = scale_m / METERS_PER_DEGREE;
        let dx = scale_m / (METERS_PER_DEGREE * cos_lat);

        let cols = (bbox.width() / dx).ceil().max(1.0) as usize;
        let rows = (bbox.height() / dy).ceil().max(1.0) as usize;

        Ok(Self::new(
            GeoTransform::new(bbox.min_x, bbox.max_y, dx, -dy),
            rows,
            cols,
            CRS::wgs84(),
        ))
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Map extent of the grid
    pub fn bbox(&self) -> BBox {
        let (min_x, min_y, max_x, max_y) = self.transform.bounds(self.cols, self.rows);
        BBox::new(min_x, min_y, max_x, max_y)
    }

    /// Same extent, cells `factor` times larger (at least one cell)
    pub fn coarsened(&self, factor: usize) -> Self {
        let factor = factor.max(1);
        Self {
            transform: self.transform.scaled(factor as f64),
            rows: self.rows.div_ceil(factor).max(1),
            cols: self.cols.div_ceil(factor).max(1),
            crs: self.crs.clone(),
        }
    }

    /// Ground area of one cell in `row`, in square metres.
    ///
    /// Geographic grids use the area of the spherical quadrangle between the
    /// row's bounding parallels; projected grids use the cell footprint.
    pub fn pixel_area_m2(&self, row: usize) -> f64 {
        let gt = &self.transform;
        if self.crs.is_geographic() {
            let (_, top) = gt.pixel_to_geo_corner(0, row);
            let (_, bottom) = gt.pixel_to_geo_corner(0, row + 1);
            let dlon = gt.pixel_width.abs().to_radians();
            EARTH_RADIUS_M
                * EARTH_RADIUS_M
                * dlon
                * (top.to_radians().sin() - bottom.to_radians().sin()).abs()
        } else {
            (gt.pixel_width * gt.pixel_height).abs()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn geographic_grid_covers_bbox() {
        let bbox = BBox::new(-74.5924, 10.8193, -74.5435, 10.8400);
        let grid = GridSpec::geographic(&bbox, 30.0).unwrap();

        let covered = grid.bbox();
        assert!(covered.min_x <= bbox.min_x + 1e-12);
        assert!(covered.max_y >= bbox.max_y - 1e-12);
        assert!(covered.max_x >= bbox.max_x);
        assert!(covered.min_y <= bbox.min_y);
        // ~5.3 km x 2.3 km at 30 m
        assert!((170..=185).contains(&grid.cols), "cols = {}", grid.cols);
        assert!((75..=80).contains(&grid.rows), "rows = {}", grid.rows);
    }

    #[test]
    fn geographic_cells_are_close_to_requested_scale() {
        let bbox = BBox::new(-74.6, 10.8, -74.5, 10.9);
        let grid = GridSpec::geographic(&bbox, 30.0).unwrap();
        assert_relative_eq!(grid.pixel_area_m2(0), 900.0, max_relative = 0.01);
    }

    #[test]
    fn projected_pixel_area_is_footprint() {
        let grid = GridSpec::new(
            GeoTransform::new(500_000.0, 1_200_000.0, 20.0, -20.0),
            10,
            10,
            CRS::from_epsg(32618),
        );
        assert_relative_eq!(grid.pixel_area_m2(3), 400.0);
    }

    #[test]
    fn coarsened_grid_keeps_extent_covered() {
        let bbox = BBox::new(0.0, 0.0, 0.1, 0.1);
        let grid = GridSpec::geographic(&bbox, 10.0).unwrap();
        let coarse = grid.coarsened(4);
        assert_eq!(coarse.rows, grid.rows.div_ceil(4));
        assert_eq!(coarse.cols, grid.cols.div_ceil(4));
        assert!(coarse.bbox().max_x >= grid.bbox().max_x - 1e-12);
    }

    #[test]
    fn rejects_non_positive_scale() {
        let bbox = BBox::new(0.0, 0.0, 1.0, 1.0);
        assert!(GridSpec::geographic(&bbox, 0.0).is_err());
        assert!(GridSpec::geographic(&bbox, f64::NAN).is_err());
    }
}
