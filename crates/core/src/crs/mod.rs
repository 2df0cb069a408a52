//! Coordinate Reference System handling

mod utm;

pub use utm::{parse_utm_epsg, project_bbox, project_point, wgs84_to_utm};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Mean Earth radius (IUGG), metres
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Length of one degree of arc on the mean-radius sphere, metres
pub const METERS_PER_DEGREE: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

/// Coordinate Reference System, identified by EPSG code.
///
/// Imagery from the STAC catalogs always carries `proj:epsg`, so vegmon
/// only tracks the code. Projection math is available for WGS84 and the
/// UTM zones (see [`project_point`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CRS {
    epsg: Option<u32>,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self { epsg: Some(code) }
    }

    /// CRS with no known code
    pub fn unknown() -> Self {
        Self { epsg: None }
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Whether coordinates are longitude/latitude degrees
    pub fn is_geographic(&self) -> bool {
        matches!(self.epsg, Some(4326) | None)
    }

    /// Check if two CRS are equivalent
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        match (self.epsg, other.epsg) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        match self.epsg {
            Some(code) => format!("EPSG:{code}"),
            None => "Unknown".to_string(),
        }
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

impl Default for CRS {
    fn default() -> Self {
        Self::wgs84()
    }
}
