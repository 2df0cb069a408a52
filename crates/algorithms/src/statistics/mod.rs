//! Statistical reductions over raster regions
//!
//! - **region**: area under a mask and valid-data fraction within a region,
//!   with best-effort coarsening of the analysis grid

mod region;

pub use region::{plan_region_grid, reduce_region, ReductionOptions, RegionPlan, RegionStats};
