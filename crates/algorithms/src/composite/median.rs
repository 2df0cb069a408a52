//! Median composite

use crate::maybe_rayon::*;
use ndarray::Array2;
use vegmon_core::raster::{GridSpec, Raster};
use vegmon_core::{Error, Result};

/// Per-pixel median of `layers`, all laid out on `grid`.
///
/// Nodata cells are skipped. With an even number of defined values the two
/// middle values are averaged. Pixels with no defined value, and every
/// pixel when `layers` is empty, are NaN.
pub fn median_composite(layers: &[Raster<f64>], grid: &GridSpec) -> Result<Raster<f64>> {
    let (rows, cols) = (grid.rows, grid.cols);
    for layer in layers {
        if layer.shape() != (rows, cols) {
            return Err(Error::SizeMismatch {
                er: rows,
                ec: cols,
                ar: layer.rows(),
                ac: layer.cols(),
            });
        }
    }

    let mut composite = Raster::on_grid(grid, f64::NAN);
    composite.set_nodata(Some(f64::NAN));
    if layers.is_empty() {
        return Ok(composite);
    }

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut stack = Vec::with_capacity(layers.len());
            let mut row_data = vec![f64::NAN; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                stack.clear();
                stack.extend(
                    layers
                        .iter()
                        .map(|l| l.data()[[row, col]])
                        .filter(|v| !v.is_nan()),
                );
                *out = median_of(&mut stack);
            }
            row_data
        })
        .collect();

    *composite.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(composite)
}

fn median_of(values: &mut [f64]) -> f64 {
    let n = values.len();
    if n == 0 {
        return f64::NAN;
    }
    values.sort_unstable_by(f64::total_cmp);
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}
