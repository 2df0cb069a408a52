//! # vegmon colormap
//!
//! Raster-to-RGBA rendering for the monthly overlay frames.
//!
//! A frame is built bottom-up: a true-colour composite stretched with
//! [`stretch_rgb`], a translucent vegetation layer from [`render_mask`],
//! and the AOI outline, each blended over the previous with
//! [`RgbaImage::blend_over`].
//!
//! ## Usage
//!
//! ```ignore
//! use vegmon_colormap::{render_mask, stretch_rgb, Rgb, StretchParams};
//!
//! let mut frame = stretch_rgb(&b4, &b3, &b2, &StretchParams::new(0.0, 3000.0))?;
//! frame.blend_over(&render_mask(&veg, Rgb::from_hex("#ff0000")?, 0.6)?)?;
//! ```

mod color;
mod image;
mod render;

pub use color::{ColorError, Rgb};
pub use image::RgbaImage;
pub use render::{render_mask, stretch_rgb, StretchParams};
