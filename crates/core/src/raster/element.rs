//! Cell value trait for rasters

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// Types that can be stored in a raster cell.
///
/// Band rasters come off disk as integers (`u16` reflectance, `u8` scene
/// classes) and are promoted to `f64` for index math, so the trait only
/// needs cheap numeric casts and a nodata check.
pub trait RasterElement:
    Copy + Clone + Debug + PartialOrd + PartialEq + NumCast + Zero + Send + Sync + 'static
{
    /// Default no-data value for this type
    fn default_nodata() -> Self;

    /// Check if this value represents no-data
    fn is_nodata(&self, nodata: Option<Self>) -> bool;

    /// Convert to `f64`, if representable
    fn to_f64(self) -> Option<f64> {
        NumCast::from(self)
    }
}

macro_rules! impl_raster_element_int {
    ($($t:ty),*) => {
        $(
            impl RasterElement for $t {
                fn default_nodata() -> Self {
                    <$t>::MIN
                }

                fn is_nodata(&self, nodata: Option<Self>) -> bool {
                    nodata.is_some_and(|nd| *self == nd)
                }
            }
        )*
    };
}

macro_rules! impl_raster_element_float {
    ($($t:ty),*) => {
        $(
            impl RasterElement for $t {
                fn default_nodata() -> Self {
                    <$t>::NAN
                }

                fn is_nodata(&self, nodata: Option<Self>) -> bool {
                    if self.is_nan() {
                        return true;
                    }
                    nodata.is_some_and(|nd| (self - nd).abs() < <$t>::EPSILON * 100.0)
                }
            }
        )*
    };
}

impl_raster_element_int!(i8, i16, i32, u8, u16, u32);
impl_raster_element_float!(f32, f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_nan_is_always_nodata() {
        assert!(f64::NAN.is_nodata(None));
        assert!(!1.0_f64.is_nodata(None));
        assert!(0.0_f32.is_nodata(Some(0.0)));
    }

    #[test]
    fn int_nodata_needs_explicit_value() {
        assert!(!0_u16.is_nodata(None));
        assert!(0_u16.is_nodata(Some(0)));
        assert_eq!(u8::default_nodata(), 0);
    }
}
