//! Warping source tiles onto an analysis grid
//!
//! Sentinel-2 tiles are in UTM while analysis grids are WGS84. Each
//! destination cell center is projected into the source CRS and takes the
//! value of the source cell it falls in (nearest neighbour).

use crate::maybe_rayon::*;
use ndarray::Array2;
use vegmon_core::crs::project_point;
use vegmon_core::raster::{GridSpec, Raster};
use vegmon_core::{Error, Result, CRS};

/// Nearest-neighbour warp of `src` onto `grid`.
///
/// Cells outside the source extent or on source nodata are NaN. `grid` must
/// be geographic or share the source CRS; a source without CRS is taken to
/// be on the grid's CRS.
pub fn warp_nearest(src: &Raster<f64>, grid: &GridSpec) -> Result<Raster<f64>> {
    let src_crs = src.crs().cloned().unwrap_or_else(|| grid.crs.clone());
    let same_crs = src_crs.is_equivalent(&grid.crs) || src_crs.epsg().is_none();

    let target_epsg = match (same_crs, grid.crs.is_geographic(), src_crs.epsg()) {
        (true, _, _) => None,
        (false, true, Some(code)) => Some(code),
        _ => {
            return Err(Error::UnsupportedCrs(format!(
                "cannot warp {} onto {}",
                src_crs, grid.crs
            )))
        }
    };

    let (src_rows, src_cols) = src.shape();
    let src_gt = *src.transform();
    let dst_gt = grid.transform;
    let cols = grid.cols;

    let data: Vec<f64> = (0..grid.rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let (x, y) = dst_gt.pixel_to_geo(col, row);
                let (sx, sy) = match target_epsg {
                    None => (x, y),
                    Some(code) => match project_point(x, y, code) {
                        Ok(p) => p,
                        Err(_) => continue,
                    },
                };
                let (fc, fr) = src_gt.geo_to_pixel(sx, sy);
                if !(fc >= 0.0 && fr >= 0.0) {
                    continue;
                }
                let (c, r) = (fc.floor() as usize, fr.floor() as usize);
                if r < src_rows && c < src_cols {
                    let v = src.data()[[r, c]];
                    if !src.is_nodata(v) {
                        *out = v;
                    }
                }
            }
            row_data
        })
        .collect();

    let mut out = Raster::on_grid(grid, f64::NAN);
    *out.data_mut() = Array2::from_shape_vec((grid.rows, grid.cols), data)
        .map_err(|e| Error::Other(e.to_string()))?;
    out.set_nodata(Some(f64::NAN));
    Ok(out)
}

/// Whether rasters in `from` can be warped onto a grid in `to`
pub fn can_warp(from: &CRS, to: &CRS) -> bool {
    from.is_equivalent(to)
        || (to.is_geographic()
            && from
                .epsg()
                .is_some_and(|c| c == 4326 || vegmon_core::crs::parse_utm_epsg(c).is_some()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use vegmon_core::crs::wgs84_to_utm;
    use vegmon_core::GeoTransform;

    #[test]
    fn same_crs_copies_matching_cells() {
        let grid = GridSpec::new(GeoTransform::new(0.0, 2.0, 1.0, -1.0), 2, 2, CRS::wgs84());
        let mut src = Raster::from_vec(vec![1.0, 2.0, 3.0, 4.0], 2, 2).unwrap();
        src.set_transform(grid.transform);
        src.set_crs(Some(CRS::wgs84()));

        let out = warp_nearest(&src, &grid).unwrap();
        assert_eq!(out.data(), src.data());
    }

    #[test]
    fn utm_tile_onto_geographic_grid() {
        // 10 m UTM 18N tile around the AOI, value = column index
        let (e, n) = wgs84_to_utm(-74.60, 10.85, 18, true);
        let origin = ((e / 10.0).floor() * 10.0, (n / 10.0).ceil() * 10.0);
        let (rows, cols) = (400, 800);
        let data: Vec<f64> = (0..rows * cols).map(|i| (i % cols) as f64).collect();
        let mut src = Raster::from_vec(data, rows, cols).unwrap();
        src.set_transform(GeoTransform::new(origin.0, origin.1, 10.0, -10.0));
        src.set_crs(Some(CRS::from_epsg(32618)));

        let grid = GridSpec::new(
            GeoTransform::new(-74.598, 10.848, 0.0003, -0.0003),
            10,
            10,
            CRS::wgs84(),
        );
        let out = warp_nearest(&src, &grid).unwrap();
        assert_eq!(out.valid_count(), 100);

        // columns increase eastward by roughly 0.0003 deg ~ 3.3 cells
        let step = out.get(0, 1).unwrap() - out.get(0, 0).unwrap();
        assert!((2.0..=5.0).contains(&step), "step {step}");

        let (fe, _) = wgs84_to_utm(-74.598 + 0.00015, 10.848 - 0.00015, 18, true);
        assert_relative_eq!(out.get(0, 0).unwrap(), ((fe - origin.0) / 10.0).floor());
    }

    #[test]
    fn outside_source_is_nan() {
        let grid = GridSpec::new(GeoTransform::new(10.0, 10.0, 1.0, -1.0), 2, 2, CRS::wgs84());
        let src = Raster::filled(2, 2, 1.0);
        let out = warp_nearest(&src, &grid).unwrap();
        assert_eq!(out.valid_count(), 0);
    }

    #[test]
    fn projected_grid_needs_same_crs() {
        let grid = GridSpec::new(GeoTransform::default(), 2, 2, CRS::from_epsg(32618));
        let mut src = Raster::filled(2, 2, 1.0);
        src.set_crs(Some(CRS::from_epsg(32619)));
        assert!(warp_nearest(&src, &grid).is_err());
        assert!(!can_warp(&CRS::from_epsg(32619), &CRS::from_epsg(32618)));
        assert!(can_warp(&CRS::from_epsg(32618), &CRS::wgs84()));
    }
}
