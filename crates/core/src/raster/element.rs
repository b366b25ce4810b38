//! Cell value trait for generic rasters

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// Trait for types that can be stored in a raster cell.
///
/// Bounds the numeric operations the grid and the classification
/// algorithms rely on: copyable, comparable, castable and zero-initializable.
pub trait RasterElement:
    Copy + Clone + Debug + PartialOrd + PartialEq + NumCast + Zero + Send + Sync + 'static
{
    /// Check if this value represents no-data.
    ///
    /// Floats treat NaN as no-data unconditionally; an explicit sentinel
    /// (e.g. -9999 in survey rasters) is matched in addition when set.
    fn is_nodata(&self, nodata: Option<Self>) -> bool;
}

macro_rules! impl_raster_element_int {
    ($t:ty) => {
        impl RasterElement for $t {
            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                match nodata {
                    Some(nd) => *self == nd,
                    None => false,
                }
            }
        }
    };
}

macro_rules! impl_raster_element_float {
    ($t:ty) => {
        impl RasterElement for $t {
            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                if self.is_nan() {
                    return true;
                }
                match nodata {
                    Some(nd) => (self - nd).abs() < <$t>::EPSILON * 100.0,
                    None => false,
                }
            }
        }
    };
}

impl_raster_element_int!(i16);
impl_raster_element_int!(i32);
impl_raster_element_int!(i64);
impl_raster_element_int!(u8);
impl_raster_element_int!(u16);
impl_raster_element_int!(u32);
impl_raster_element_float!(f32);
impl_raster_element_float!(f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_nodata_is_nan() {
        let v = f64::NAN;
        assert!(v.is_nodata(None));
        assert!(!1.0_f64.is_nodata(None));
        assert!((-9999.0_f64).is_nodata(Some(-9999.0)));
    }

    #[test]
    fn test_int_nodata_needs_explicit_value() {
        assert!(!0_u8.is_nodata(None));
        assert!(255_u8.is_nodata(Some(255)));
    }
}
