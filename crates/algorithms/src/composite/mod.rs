//! Per-pixel compositing across acquisitions
//!
//! - **median**: NaN-aware median of a stack of co-registered layers

mod median;

pub use median::median_composite;
