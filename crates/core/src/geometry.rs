//! Area of interest and bounding boxes
//!
//! The AOI is a WGS84 polygon. Statistics, frames and catalog searches are
//! all driven from it: its bbox selects scenes, its rasterized mask selects
//! pixels, and its outline is painted onto exported frames.

use crate::crs::METERS_PER_DEGREE;
use crate::error::{Error, Result};
use crate::raster::{GridSpec, Raster};
use geo::{BoundingRect, ChamberlainDuquetteArea, Contains};
use geo_types::{Coord, LineString, Point, Polygon};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Axis-aligned extent `(min_x, min_y, max_x, max_y)` in CRS units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Inverted box that any call to [`BBox::expand`] will replace
    pub fn empty() -> Self {
        Self::new(f64::MAX, f64::MAX, f64::MIN, f64::MIN)
    }

    /// Grow to include `(x, y)`
    pub fn expand(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// Finite with strictly positive width and height
    pub fn is_valid(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
            && self.max_x > self.min_x
            && self.max_y > self.min_y
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Boxes overlap (touching edges count)
    pub fn intersects(&self, other: &BBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// As `[min_x, min_y, max_x, max_y]`, the STAC `bbox` layout
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }

    /// From a STAC `bbox` array; 3D boxes use indices 0, 1, 3, 4
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        match values.len() {
            4 => Some(Self::new(values[0], values[1], values[2], values[3])),
            6 => Some(Self::new(values[0], values[1], values[3], values[4])),
            _ => None,
        }
    }
}

/// WGS84 area of interest
#[derive(Debug, Clone, PartialEq)]
pub struct Aoi {
    polygon: Polygon<f64>,
}

impl Aoi {
    /// Build from an exterior ring of `(lon, lat)` vertices.
    ///
    /// The ring is closed if the last vertex differs from the first.
    pub fn from_ring(ring: &[(f64, f64)]) -> Result<Self> {
        Self::from_rings(ring, &[])
    }

    fn from_rings(exterior: &[(f64, f64)], holes: &[Vec<(f64, f64)>]) -> Result<Self> {
        let exterior = closed_ring(exterior)?;
        let interiors = holes
            .iter()
            .map(|h| closed_ring(h))
            .collect::<Result<Vec<_>>>()?;
        let aoi = Self {
            polygon: Polygon::new(exterior, interiors),
        };
        if !aoi.bbox().is_valid() {
            return Err(Error::InvalidGeometry("AOI has zero extent".into()));
        }
        Ok(aoi)
    }

    /// Parse a GeoJSON `Polygon`, or a `Feature`/`FeatureCollection` whose
    /// first geometry is a polygon.
    pub fn from_geojson(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::InvalidGeometry(format!("invalid GeoJSON: {e}")))?;
        Self::from_geojson_value(&value)
    }

    pub fn from_geojson_value(value: &Value) -> Result<Self> {
        match value.get("type").and_then(Value::as_str) {
            Some("Polygon") => {
                let rings = value
                    .get("coordinates")
                    .and_then(Value::as_array)
                    .ok_or_else(|| Error::InvalidGeometry("Polygon without coordinates".into()))?;
                let mut parsed = rings.iter().map(parse_ring).collect::<Result<Vec<_>>>()?;
                if parsed.is_empty() {
                    return Err(Error::InvalidGeometry("Polygon without rings".into()));
                }
                let exterior = parsed.remove(0);
                Self::from_rings(&exterior, &parsed)
            }
            Some("Feature") => {
                let geometry = value
                    .get("geometry")
                    .ok_or_else(|| Error::InvalidGeometry("Feature without geometry".into()))?;
                Self::from_geojson_value(geometry)
            }
            Some("FeatureCollection") => {
                let first = value
                    .get("features")
                    .and_then(Value::as_array)
                    .and_then(|f| f.first())
                    .ok_or_else(|| Error::InvalidGeometry("empty FeatureCollection".into()))?;
                Self::from_geojson_value(first)
            }
            other => Err(Error::InvalidGeometry(format!(
                "expected a Polygon, got {}",
                other.unwrap_or("untyped object")
            ))),
        }
    }

    /// GeoJSON geometry object for this AOI
    pub fn to_geojson(&self) -> Value {
        let ring = |ls: &LineString<f64>| -> Value {
            Value::Array(
                ls.coords()
                    .map(|c| Value::from(vec![c.x, c.y]))
                    .collect(),
            )
        };
        let mut rings = vec![ring(self.polygon.exterior())];
        rings.extend(self.polygon.interiors().iter().map(ring));
        serde_json::json!({ "type": "Polygon", "coordinates": rings })
    }

    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    /// Lon/lat extent
    pub fn bbox(&self) -> BBox {
        match self.polygon.bounding_rect() {
            Some(r) => BBox::new(r.min().x, r.min().y, r.max().x, r.max().y),
            None => BBox::empty(),
        }
    }

    /// Geodesic area on the sphere, square metres
    pub fn area_m2(&self) -> f64 {
        self.polygon.chamberlain_duquette_unsigned_area()
    }

    pub fn area_ha(&self) -> f64 {
        self.area_m2() / 10_000.0
    }

    /// Point strictly inside the polygon (boundary excluded)
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        self.polygon.contains(&Point::new(lon, lat))
    }

    /// Bounds of the AOI grown by `distance_m` metres on every side.
    ///
    /// Longitude growth uses the latitude furthest from the equator so the
    /// margin is never narrower than requested.
    pub fn buffered_bounds(&self, distance_m: f64) -> BBox {
        let b = self.bbox();
        let worst_lat = b.min_y.abs().max(b.max_y.abs()).min(89.0);
        let dy = distance_m / METERS_PER_DEGREE;
        let dx = distance_m / (METERS_PER_DEGREE * worst_lat.to_radians().cos());
        BBox::new(
            b.min_x - dx,
            (b.min_y - dy).max(-90.0),
            b.max_x + dx,
            (b.max_y + dy).min(90.0),
        )
    }

    /// Mask of grid cells whose centers fall inside the AOI (1 inside, 0 outside)
    pub fn rasterize(&self, grid: &GridSpec) -> Result<Raster<u8>> {
        ensure_geographic(grid)?;
        let mut mask = Raster::on_grid(grid, 0u8);
        let bbox = self.bbox();

        for ((row, col), cell) in mask.data_mut().indexed_iter_mut() {
            let (lon, lat) = grid.transform.pixel_to_geo(col, row);
            if lon < bbox.min_x || lon > bbox.max_x || lat < bbox.min_y || lat > bbox.max_y {
                continue;
            }
            if self.contains(lon, lat) {
                *cell = 1;
            }
        }
        Ok(mask)
    }

    /// Mask of cells within `width_px / 2` pixels of the AOI boundary.
    ///
    /// Distances are measured in pixel space, so the stroke has the same
    /// apparent width at any grid resolution.
    pub fn outline(&self, grid: &GridSpec, width_px: f64) -> Result<Raster<u8>> {
        ensure_geographic(grid)?;
        let half = (width_px / 2.0).max(0.5);
        let mut mask = Raster::on_grid(grid, 0u8);

        let mut rings = vec![self.polygon.exterior()];
        rings.extend(self.polygon.interiors());

        for ring in rings {
            let pts: Vec<(f64, f64)> = ring
                .coords()
                .map(|c| grid.transform.geo_to_pixel(c.x, c.y))
                .collect();

            for seg in pts.windows(2) {
                let (a, b) = (seg[0], seg[1]);
                let c0 = (a.0.min(b.0) - half).floor().max(0.0) as usize;
                let c1 = ((a.0.max(b.0) + half).ceil().max(0.0) as usize).min(grid.cols);
                let r0 = (a.1.min(b.1) - half).floor().max(0.0) as usize;
                let r1 = ((a.1.max(b.1) + half).ceil().max(0.0) as usize).min(grid.rows);

                for row in r0..r1 {
                    for col in c0..c1 {
                        let p = (col as f64 + 0.5, row as f64 + 0.5);
                        if segment_distance(p, a, b) <= half {
                            mask.data_mut()[[row, col]] = 1;
                        }
                    }
                }
            }
        }
        Ok(mask)
    }
}

fn ensure_geographic(grid: &GridSpec) -> Result<()> {
    if grid.crs.is_geographic() {
        Ok(())
    } else {
        Err(Error::UnsupportedCrs(format!(
            "AOI masks need a geographic grid, got {}",
            grid.crs
        )))
    }
}

fn closed_ring(vertices: &[(f64, f64)]) -> Result<LineString<f64>> {
    let mut coords: Vec<Coord<f64>> = vertices.iter().map(|&(x, y)| Coord { x, y }).collect();
    if coords.iter().any(|c| !(c.x.is_finite() && c.y.is_finite())) {
        return Err(Error::InvalidGeometry("non-finite coordinate in ring".into()));
    }
    if coords.first() != coords.last() {
        if let Some(&first) = coords.first() {
            coords.push(first);
        }
    }
    // closed triangle is the smallest valid ring
    if coords.len() < 4 {
        return Err(Error::InvalidGeometry(format!(
            "ring needs at least 3 distinct vertices, got {}",
            coords.len().saturating_sub(1)
        )));
    }
    Ok(LineString::from(coords))
}

fn parse_ring(value: &Value) -> Result<Vec<(f64, f64)>> {
    let points = value
        .as_array()
        .ok_or_else(|| Error::InvalidGeometry("ring is not an array".into()))?;
    points
        .iter()
        .map(|p| {
            let xy = p.as_array().filter(|a| a.len() >= 2);
            match xy.map(|a| (a[0].as_f64(), a[1].as_f64())) {
                Some((Some(x), Some(y))) => Ok((x, y)),
                _ => Err(Error::InvalidGeometry(format!("bad position {p}"))),
            }
        })
        .collect()
}

fn segment_distance(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len2 = dx * dx + dy * dy;
    let t = if len2 > 0.0 {
        (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len2).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let (qx, qy) = (a.0 + t * dx, a.1 + t * dy);
    ((p.0 - qx).powi(2) + (p.1 - qy).powi(2)).sqrt()
}
