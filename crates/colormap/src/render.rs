//! Raster-to-RGBA rendering of composites and masks

use crate::color::{ColorError, Rgb};
use crate::image::RgbaImage;
use vegmon_core::raster::Raster;
use vegmon_core::Result;

/// Linear stretch applied to each channel of a true-colour composite
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StretchParams {
    /// Value mapped to 0
    pub min: f64,
    /// Value mapped to 255
    pub max: f64,
}

impl StretchParams {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    fn scale(&self, v: f64) -> u8 {
        let range = self.max - self.min;
        let t = if range.abs() > f64::EPSILON {
            (v - self.min) / range
        } else {
            0.0
        };
        (t * 255.0).round().clamp(0.0, 255.0) as u8
    }
}

impl Default for StretchParams {
    fn default() -> Self {
        Self::new(0.0, 3000.0)
    }
}

/// Stretch three co-registered bands into an opaque RGBA image.
///
/// A pixel missing in any band is transparent.
pub fn stretch_rgb(
    red: &Raster<f64>,
    green: &Raster<f64>,
    blue: &Raster<f64>,
    params: &StretchParams,
) -> Result<RgbaImage> {
    red.ensure_same_shape(green)?;
    red.ensure_same_shape(blue)?;

    let mut img = RgbaImage::transparent(red.cols(), red.rows());
    let bands = red.data().iter().zip(green.data().iter()).zip(blue.data().iter());
    for (i, ((&r, &g), &b)) in bands.enumerate() {
        if red.is_nodata(r) || green.is_nodata(g) || blue.is_nodata(b) {
            continue;
        }
        let color = Rgb::new(params.scale(r), params.scale(g), params.scale(b));
        img.put(i, color, 255);
    }
    Ok(img)
}

/// Paint cells where `mask` is non-zero in `color` at `opacity`; the rest
/// is transparent.
pub fn render_mask(
    mask: &Raster<u8>,
    color: Rgb,
    opacity: f64,
) -> std::result::Result<RgbaImage, ColorError> {
    if !(0.0..=1.0).contains(&opacity) {
        return Err(ColorError::InvalidOpacity(opacity));
    }
    let alpha = (opacity * 255.0).round() as u8;
    let mut img = RgbaImage::transparent(mask.cols(), mask.rows());
    for (i, _) in mask.data().iter().enumerate().filter(|(_, &m)| m != 0) {
        img.put(i, color, alpha);
    }
    Ok(img)
}
