//! Region reduction
//!
//! Reduces an index raster over a region mask to two scalars: the ground
//! area of pixels at or above a threshold, and the area-weighted fraction
//! of region pixels that carry a defined index value.

use crate::maybe_rayon::*;
use serde::{Deserialize, Serialize};
use vegmon_core::geometry::BBox;
use vegmon_core::raster::{GridSpec, Raster};
use vegmon_core::{Error, Result};

/// Resolution and resource limits for a reduction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReductionOptions {
    /// Nominal cell size of the analysis grid, metres
    pub scale_m: f64,
    /// Number of row bands the reduction is split into
    pub tile_scale: usize,
    /// Coarsen the grid instead of failing when it exceeds `max_pixels`
    pub best_effort: bool,
    /// Ceiling on analysis grid cells
    pub max_pixels: u64,
}

impl Default for ReductionOptions {
    fn default() -> Self {
        Self {
            scale_m: 30.0,
            tile_scale: 4,
            best_effort: true,
            max_pixels: 10_000_000_000_000,
        }
    }
}

/// Analysis grid chosen for a region
#[derive(Debug, Clone, PartialEq)]
pub struct RegionPlan {
    pub grid: GridSpec,
    /// Effective cell size, metres
    pub scale_m: f64,
    /// Factor applied to the requested scale (1 when it fit as requested)
    pub coarsening: usize,
}

/// Plan the WGS84 analysis grid covering `bbox`.
///
/// When the requested scale needs more than `max_pixels` cells and best
/// effort is on, the scale grows by the smallest integer factor that fits.
pub fn plan_region_grid(bbox: &BBox, options: &ReductionOptions) -> Result<RegionPlan> {
    if options.max_pixels == 0 {
        return Err(Error::InvalidParameter {
            name: "max_pixels",
            value: "0".into(),
            reason: "must be positive".into(),
        });
    }

    let grid = GridSpec::geographic(bbox, options.scale_m)?;
    let pixels = grid.len() as u64;
    if pixels <= options.max_pixels {
        return Ok(RegionPlan {
            grid,
            scale_m: options.scale_m,
            coarsening: 1,
        });
    }
    if !options.best_effort {
        return Err(Error::InvalidParameter {
            name: "max_pixels",
            value: options.max_pixels.to_string(),
            reason: format!("region needs {pixels} pixels at {} m", options.scale_m),
        });
    }

    let mut factor = ((pixels as f64 / options.max_pixels as f64).sqrt().ceil() as usize).max(2);
    loop {
        let coarse = grid.coarsened(factor);
        if coarse.len() as u64 <= options.max_pixels {
            return Ok(RegionPlan {
                grid: coarse,
                scale_m: options.scale_m * factor as f64,
                coarsening: factor,
            });
        }
        factor += 1;
    }
}

/// Outcome of a region reduction.
///
/// `None` means the reducer had nothing to reduce: no defined pixel for the
/// area, no region pixel for the fraction.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RegionStats {
    /// Ground area of region pixels with index >= threshold, m²
    pub area_m2: Option<f64>,
    /// Area-weighted mean of the valid flag over the region, in [0, 1]
    pub valid_frac: Option<f64>,
    pub region_pixels: usize,
    pub valid_pixels: usize,
    pub above_pixels: usize,
}

#[derive(Default, Clone, Copy)]
struct Partial {
    region_area: f64,
    valid_area: f64,
    above_area: f64,
    region_pixels: usize,
    valid_pixels: usize,
    above_pixels: usize,
}

impl Partial {
    fn merge(self, other: Partial) -> Partial {
        Partial {
            region_area: self.region_area + other.region_area,
            valid_area: self.valid_area + other.valid_area,
            above_area: self.above_area + other.above_area,
            region_pixels: self.region_pixels + other.region_pixels,
            valid_pixels: self.valid_pixels + other.valid_pixels,
            above_pixels: self.above_pixels + other.above_pixels,
        }
    }
}

/// Reduce `index` over the cells where `region` is 1.
///
/// The rows are split into `tile_scale` bands which may run in parallel;
/// band partials are combined in row order so the result does not depend on
/// scheduling.
pub fn reduce_region(
    index: &Raster<f64>,
    region: &Raster<u8>,
    grid: &GridSpec,
    threshold: f64,
    tile_scale: usize,
) -> Result<RegionStats> {
    index.ensure_same_shape(region)?;
    if index.shape() != (grid.rows, grid.cols) {
        return Err(Error::SizeMismatch {
            er: grid.rows,
            ec: grid.cols,
            ar: index.rows(),
            ac: index.cols(),
        });
    }

    let rows = grid.rows;
    let band_rows = rows.div_ceil(tile_scale.max(1)).max(1);
    let bands: Vec<(usize, usize)> = (0..rows)
        .step_by(band_rows)
        .map(|start| (start, (start + band_rows).min(rows)))
        .collect();

    let partials: Vec<Partial> = bands
        .into_par_iter()
        .map(|(start, end)| {
            let mut p = Partial::default();
            for row in start..end {
                let cell_area = grid.pixel_area_m2(row);
                for col in 0..grid.cols {
                    if region.data()[[row, col]] == 0 {
                        continue;
                    }
                    p.region_pixels += 1;
                    p.region_area += cell_area;

                    let v = index.data()[[row, col]];
                    if index.is_nodata(v) {
                        continue;
                    }
                    p.valid_pixels += 1;
                    p.valid_area += cell_area;
                    if v >= threshold {
                        p.above_pixels += 1;
                        p.above_area += cell_area;
                    }
                }
            }
            p
        })
        .collect();

    let total = partials
        .into_iter()
        .fold(Partial::default(), Partial::merge);

    Ok(RegionStats {
        area_m2: (total.valid_pixels > 0).then_some(total.above_area),
        valid_frac: (total.region_area > 0.0)
            .then(|| (total.valid_area / total.region_area).clamp(0.0, 1.0)),
        region_pixels: total.region_pixels,
        valid_pixels: total.valid_pixels,
        above_pixels: total.above_pixels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use vegmon_core::{GeoTransform, CRS};

    fn utm_grid(rows: usize, cols: usize) -> GridSpec {
        GridSpec::new(
            GeoTransform::new(500_000.0, 1_200_000.0, 10.0, -10.0),
            rows,
            cols,
            CRS::from_epsg(32618),
        )
    }

    #[test]
    fn area_and_valid_fraction() {
        let grid = utm_grid(2, 2);
        let ndvi = Raster::from_vec(vec![0.5, 0.2, f64::NAN, 0.4], 2, 2).unwrap();
        let region = Raster::filled(2, 2, 1u8);

        let stats = reduce_region(&ndvi, &region, &grid, 0.4, 1).unwrap();
        assert_relative_eq!(stats.area_m2.unwrap(), 200.0);
        assert_relative_eq!(stats.valid_frac.unwrap(), 0.75);
        assert_eq!(stats.above_pixels, 2);
    }

    #[test]
    fn cells_outside_region_are_ignored() {
        let grid = utm_grid(2, 2);
        let ndvi = Raster::filled(2, 2, 0.9);
        let region = Raster::from_vec(vec![1u8, 0, 0, 0], 2, 2).unwrap();

        let stats = reduce_region(&ndvi, &region, &grid, 0.4, 4).unwrap();
        assert_relative_eq!(stats.area_m2.unwrap(), 100.0);
        assert_eq!(stats.region_pixels, 1);
    }

    #[test]
    fn fully_masked_index_has_no_area() {
        let grid = utm_grid(3, 3);
        let ndvi = Raster::filled(3, 3, f64::NAN);
        let region = Raster::filled(3, 3, 1u8);

        let stats = reduce_region(&ndvi, &region, &grid, 0.4, 2).unwrap();
        assert_eq!(stats.area_m2, None);
        assert_eq!(stats.valid_frac, Some(0.0));
    }

    #[test]
    fn tile_scale_does_not_change_result() {
        let grid = GridSpec::geographic(&BBox::new(-74.6, 10.8, -74.5, 10.85), 30.0).unwrap();
        let mut ndvi = Raster::on_grid(&grid, 0.0);
        for ((r, c), v) in ndvi.data_mut().indexed_iter_mut() {
            *v = ((r * 31 + c * 17) % 100) as f64 / 100.0;
        }
        let region = Raster::on_grid(&grid, 1u8);

        let one = reduce_region(&ndvi, &region, &grid, 0.4, 1).unwrap();
        let many = reduce_region(&ndvi, &region, &grid, 0.4, 8).unwrap();
        assert_eq!(one.above_pixels, many.above_pixels);
        assert_relative_eq!(
            one.area_m2.unwrap(),
            many.area_m2.unwrap(),
            max_relative = 1e-12
        );

        // same band layout, same bits
        let again = reduce_region(&ndvi, &region, &grid, 0.4, 8).unwrap();
        assert_eq!(many, again);
    }

    #[test]
    fn plan_coarsens_when_over_budget() {
        let bbox = BBox::new(-74.6, 10.8, -74.5, 10.9);
        let opts = ReductionOptions {
            max_pixels: 1_000,
            ..Default::default()
        };
        let plan = plan_region_grid(&bbox, &opts).unwrap();
        assert!(plan.grid.len() <= 1_000);
        assert!(plan.coarsening >= 2);
        assert_relative_eq!(plan.scale_m, 30.0 * plan.coarsening as f64);

        let strict = ReductionOptions {
            best_effort: false,
            ..opts
        };
        assert!(plan_region_grid(&bbox, &strict).is_err());
    }

    #[test]
    fn plan_keeps_requested_scale_when_it_fits() {
        let bbox = BBox::new(-74.6, 10.8, -74.5, 10.9);
        let plan = plan_region_grid(&bbox, &ReductionOptions::default()).unwrap();
        assert_eq!(plan.coarsening, 1);
        assert_relative_eq!(plan.scale_m, 30.0);
    }
}
