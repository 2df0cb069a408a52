//! Pixel quality masks
//!
//! Masks are `Raster<u8>` with 1 for usable pixels and 0 otherwise.

use ndarray::Zip;
use serde::{Deserialize, Serialize};
use vegmon_core::raster::Raster;
use vegmon_core::{Error, Result};

/// Rule deciding whether a quality-band pixel is clear.
///
/// Sentinel-2 carries two kinds of quality band: the legacy `QA60` bit mask
/// (bit 10 opaque cloud, bit 11 cirrus) and the L2A scene classification
/// layer, where classes 8/9 are cloud probability medium/high and 10 is
/// thin cirrus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QualityRule {
    /// Clear when none of `bits` is set
    Qa60 { bits: Vec<u8> },
    /// Clear when the class is not in `classes`
    Scl { classes: Vec<u8> },
}

impl QualityRule {
    pub fn qa60() -> Self {
        Self::Qa60 { bits: vec![10, 11] }
    }

    pub fn scl() -> Self {
        Self::Scl {
            classes: vec![8, 9, 10],
        }
    }

    /// Whether a quality value passes. Nodata (NaN) never passes.
    pub fn is_clear(&self, value: f64) -> bool {
        if !value.is_finite() || value < 0.0 {
            return false;
        }
        let v = value as u32;
        match self {
            Self::Qa60 { bits } => bits.iter().all(|&b| b >= 32 || v & (1u32 << b) == 0),
            Self::Scl { classes } => !classes.iter().any(|&c| c as u32 == v),
        }
    }
}

/// SCL: L2A items on Earth Search and Planetary Computer carry it, QA60
/// only survives in some harmonized collections
impl Default for QualityRule {
    fn default() -> Self {
        Self::scl()
    }
}

/// Mask of pixels whose quality value passes `rule`
pub fn clear_mask(qa: &Raster<f64>, rule: &QualityRule) -> Result<Raster<u8>> {
    qa.with_data(qa.data().mapv(|v| u8::from(rule.is_clear(v))))
}

/// Mask of pixels where every band is strictly positive
pub fn positive_mask(bands: &[&Raster<f64>]) -> Result<Raster<u8>> {
    let first = bands.first().ok_or_else(|| Error::InvalidParameter {
        name: "bands",
        value: "[]".into(),
        reason: "at least one band is required".into(),
    })?;
    let mut mask = first.with_data(first.data().mapv(|_| 1u8))?;
    for band in bands {
        mask.ensure_same_shape(band)?;
        Zip::from(mask.data_mut())
            .and(band.data())
            .for_each(|m, &v| {
                if v.is_nan() || v <= 0.0 {
                    *m = 0;
                }
            });
    }
    Ok(mask)
}

/// Set `raster` to NaN wherever `mask` is 0
pub fn apply_mask(raster: &mut Raster<f64>, mask: &Raster<u8>) -> Result<()> {
    raster.ensure_same_shape(mask)?;
    Zip::from(raster.data_mut())
        .and(mask.data())
        .for_each(|v, &m| {
            if m == 0 {
                *v = f64::NAN;
            }
        });
    raster.set_nodata(Some(f64::NAN));
    Ok(())
}
