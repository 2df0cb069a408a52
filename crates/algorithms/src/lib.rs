//! # vegmon algorithms
//!
//! Raster algorithms behind the monthly vegetation statistics.
//!
//! ## Available Algorithm Categories
//!
//! - **imagery**: normalized difference / NDVI, quality masks, thresholds
//! - **composite**: NaN-aware per-pixel median across acquisitions
//! - **resample**: nearest-neighbour warp of UTM tiles onto a WGS84 grid
//! - **statistics**: region reduction (area under mask, valid fraction)
//!   with best-effort grid coarsening

pub mod composite;
pub mod imagery;
pub mod maybe_rayon;
pub mod resample;
pub mod statistics;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::composite::median_composite;
    pub use crate::imagery::{
        apply_mask, clear_mask, ndvi, normalized_difference, positive_mask, threshold_mask,
        QualityRule,
    };
    pub use crate::resample::warp_nearest;
    pub use crate::statistics::{
        plan_region_grid, reduce_region, ReductionOptions, RegionPlan, RegionStats,
    };
    pub use vegmon_core::prelude::*;
}
