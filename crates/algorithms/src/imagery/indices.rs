//! Spectral vegetation indices
//!
//! All indices operate on single-band rasters (one band per raster) that
//! share a grid.

use crate::maybe_rayon::*;
use ndarray::Array2;
use vegmon_core::raster::Raster;
use vegmon_core::{Error, Result};

/// Compute the normalized difference between two bands:
///
/// `(band_a - band_b) / (band_a + band_b)`
///
/// Result is in the range [-1, 1]. Pixels where the bands sum to zero
/// or either is nodata are set to NaN.
pub fn normalized_difference(band_a: &Raster<f64>, band_b: &Raster<f64>) -> Result<Raster<f64>> {
    band_a.ensure_same_shape(band_b)?;

    let (rows, cols) = band_a.shape();
    let a_view = band_a.data();
    let b_view = band_b.data();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let a = a_view[[row, col]];
                let b = b_view[[row, col]];

                if band_a.is_nodata(a) || band_b.is_nodata(b) {
                    continue;
                }

                let sum = a + b;
                if sum.abs() < 1e-10 {
                    continue;
                }

                *out = (a - b) / sum;
            }
            row_data
        })
        .collect();

    let array = Array2::from_shape_vec((rows, cols), data)
        .map_err(|e| Error::Other(e.to_string()))?;

    let mut output = band_a.with_data(array)?;
    output.set_nodata(Some(f64::NAN));
    Ok(output)
}

/// Normalized Difference Vegetation Index
///
/// `NDVI = (NIR - Red) / (NIR + Red)`
///
/// Values range from -1 to 1:
/// - Dense vegetation (mangrove canopy): 0.6 to 0.9
/// - Sparse vegetation: 0.2 to 0.5
/// - Bare soil, mudflats: 0.1 to 0.2
/// - Water/clouds: -1.0 to 0.0
pub fn ndvi(nir: &Raster<f64>, red: &Raster<f64>) -> Result<Raster<f64>> {
    normalized_difference(nir, red)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use vegmon_core::{GeoTransform, CRS};

    fn band(values: &[f64]) -> Raster<f64> {
        let mut r = Raster::from_vec(values.to_vec(), 1, values.len()).unwrap();
        r.set_transform(GeoTransform::new(-74.6, 10.85, 0.0003, -0.0003));
        r.set_crs(Some(CRS::wgs84()));
        r
    }

    #[test]
    fn ndvi_of_vegetation_and_water() {
        let nir = band(&[3000.0, 500.0, 0.0, f64::NAN]);
        let red = band(&[600.0, 1500.0, 0.0, 400.0]);
        let out = ndvi(&nir, &red).unwrap();

        assert_relative_eq!(out.get(0, 0).unwrap(), 2400.0 / 3600.0, epsilon = 1e-12);
        assert_relative_eq!(out.get(0, 1).unwrap(), -0.5, epsilon = 1e-12);
        assert!(out.get(0, 2).unwrap().is_nan());
        assert!(out.get(0, 3).unwrap().is_nan());
        assert_eq!(out.crs(), Some(&CRS::wgs84()));
    }

    #[test]
    fn mismatched_bands_are_rejected() {
        assert!(normalized_difference(&band(&[1.0, 2.0]), &band(&[1.0])).is_err());
    }
}
