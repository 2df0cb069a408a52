//! # vegmon core
//!
//! Core types and I/O shared by the vegmon crates.
//!
//! This crate provides:
//! - `Raster<T>`: generic georeferenced grid backed by `ndarray`
//! - `GeoTransform` and `GridSpec`: georeferencing and target grids
//! - `CRS` and a pure-Rust WGS84 ↔ UTM projection
//! - `Aoi` and `BBox`: the area of interest and its extents
//! - Native GeoTIFF I/O, including windowed reads and RGBA export

pub mod crs;
pub mod error;
pub mod geometry;
pub mod io;
pub mod raster;

pub use crs::CRS;
pub use error::{Error, Result};
pub use geometry::{Aoi, BBox};
pub use raster::{GeoTransform, GridSpec, Raster, RasterElement};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::geometry::{Aoi, BBox};
    pub use crate::raster::{GeoTransform, GridSpec, Raster, RasterElement};
}
