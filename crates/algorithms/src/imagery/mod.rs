//! Imagery analysis algorithms
//!
//! - Spectral indices: generic normalized difference and NDVI
//! - Quality masks: QA60 bit flags or scene-classification classes
//! - Threshold masks: vegetation (index >= t) and valid-data masks

mod indices;
mod quality;
mod threshold;

pub use indices::{ndvi, normalized_difference};
pub use quality::{apply_mask, clear_mask, positive_mask, QualityRule};
pub use threshold::threshold_mask;
