//! Pure-Rust WGS84 → UTM projection (Snyder 1987, USGS formulas).
//!
//! Covers EPSG 326xx (UTM North) and 327xx (UTM South), which is what
//! Sentinel-2 L2A tiles are delivered in.

use crate::error::{Error, Result};
use crate::geometry::BBox;

// WGS84 ellipsoid
const A: f64 = 6_378_137.0;
const F: f64 = 1.0 / 298.257_223_563;
const E2: f64 = 2.0 * F - F * F;
const E_PRIME2: f64 = E2 / (1.0 - E2);
const K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Parse an EPSG code into UTM zone info: `Some((zone, is_north))`.
///
/// - EPSG 326xx → zone xx, North hemisphere
/// - EPSG 327xx → zone xx, South hemisphere
pub fn parse_utm_epsg(epsg: u32) -> Option<(u32, bool)> {
    if (32601..=32660).contains(&epsg) {
        Some((epsg - 32600, true))
    } else if (32701..=32760).contains(&epsg) {
        Some((epsg - 32700, false))
    } else {
        None
    }
}

/// Project a WGS84 (lon, lat) point into `target_epsg`.
///
/// EPSG:4326 is the identity; UTM zones use [`wgs84_to_utm`]. Any other
/// code is rejected.
pub fn project_point(lon: f64, lat: f64, target_epsg: u32) -> Result<(f64, f64)> {
    if target_epsg == 4326 {
        return Ok((lon, lat));
    }
    let (zone, north) = parse_utm_epsg(target_epsg)
        .ok_or_else(|| Error::UnsupportedCrs(format!("EPSG:{target_epsg}")))?;
    Ok(wgs84_to_utm(lon, lat, zone, north))
}

/// Envelope of a WGS84 bbox in `target_epsg`.
///
/// Corners and edge midpoints are projected since UTM is not linear in
/// longitude away from the central meridian.
pub fn project_bbox(bbox: &BBox, target_epsg: u32) -> Result<BBox> {
    let mid_x = (bbox.min_x + bbox.max_x) / 2.0;
    let mid_y = (bbox.min_y + bbox.max_y) / 2.0;
    let samples = [
        (bbox.min_x, bbox.min_y),
        (bbox.min_x, bbox.max_y),
        (bbox.max_x, bbox.min_y),
        (bbox.max_x, bbox.max_y),
        (mid_x, bbox.min_y),
        (mid_x, bbox.max_y),
        (bbox.min_x, mid_y),
        (bbox.max_x, mid_y),
    ];

    let mut out = BBox::empty();
    for (lon, lat) in samples {
        let (x, y) = project_point(lon, lat, target_epsg)?;
        out.expand(x, y);
    }
    Ok(out)
}

/// Convert WGS84 (longitude, latitude) in degrees to UTM (easting, northing)
/// in metres for the given zone and hemisphere.
pub fn wgs84_to_utm(lon_deg: f64, lat_deg: f64, zone: u32, north: bool) -> (f64, f64) {
    let lat = lat_deg.to_radians();
    let lon = lon_deg.to_radians();

    let lon0 = ((zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians();

    let sin_lat = lat.sin();
    let cos_lat = lat.cos();
    let tan_lat = lat.tan();

    let n = A / (1.0 - E2 * sin_lat * sin_lat).sqrt();
    let t = tan_lat * tan_lat;
    let c = E_PRIME2 * cos_lat * cos_lat;
    let a = cos_lat * (lon - lon0);
    let m = meridional_arc(lat);

    let a2 = a * a;
    let a4 = a2 * a2;
    let a6 = a4 * a2;

    // Snyder eq. 8-9
    let easting = K0
        * n
        * (a + (1.0 - t + c) * a2 * a / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * E_PRIME2) * a4 * a / 120.0)
        + FALSE_EASTING;

    // Snyder eq. 8-10
    let northing = K0
        * (m + n
            * tan_lat
            * (a2 / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * E_PRIME2) * a6 / 720.0));

    if north {
        (easting, northing)
    } else {
        (easting, northing + FALSE_NORTHING_SOUTH)
    }
}

/// Meridional arc from equator to latitude `lat` (radians), Snyder eq. 3-21.
fn meridional_arc(lat: f64) -> f64 {
    let e4 = E2 * E2;
    let e6 = e4 * E2;

    A * ((1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat
        - (3.0 * E2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat).sin()
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat).sin()
        - (35.0 * e6 / 3072.0) * (6.0 * lat).sin())
}
