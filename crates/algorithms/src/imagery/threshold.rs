//! Threshold masks over an index raster

use vegmon_core::raster::Raster;
use vegmon_core::Result;

/// 1 where the index is defined and `>= threshold`, else 0
pub fn threshold_mask(index: &Raster<f64>, threshold: f64) -> Result<Raster<u8>> {
    index.with_data(
        index
            .data()
            .mapv(|v| u8::from(!index.is_nodata(v) && v >= threshold)),
    )
}
