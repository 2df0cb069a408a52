//! GeoTIFF reading and writing

mod native;

pub use native::{
    read_geotiff, write_geotiff, write_rgba_geotiff, GeoTiffReader, PixelWindow,
};
