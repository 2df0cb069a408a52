//! STAC (SpatioTemporal Asset Catalog) data types.
//!
//! Lightweight serde models for STAC Item Search (POST /search) responses,
//! covering the subset vegmon needs: bbox, datetime and cloud-cover
//! filtering, pagination via `links`, asset access and the Sentinel-2
//! (`s2:*`) identity properties used to de-duplicate acquisitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use vegmon_core::BBox;

// ---------------------------------------------------------------------------
// Search request
// ---------------------------------------------------------------------------

/// Body for `POST /search` (STAC API – Item Search).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StacSearchParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub collections: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,

    /// STAC API query extension, e.g. `{"eo:cloud_cover": {"lt": 80}}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,

    /// Sort extension fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sortby: Option<Vec<SortBy>>,

    /// Pagination token (next page).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// One `sortby` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortBy {
    pub field: String,
    pub direction: String,
}

impl StacSearchParams {
    /// Create empty search params.
    pub fn new() -> Self {
        Self {
            bbox: None,
            datetime: None,
            collections: None,
            limit: None,
            query: None,
            sortby: None,
            token: None,
        }
    }

    /// Set the bounding box `[west, south, east, north]`.
    pub fn bbox(mut self, west: f64, south: f64, east: f64, north: f64) -> Self {
        self.bbox = Some(vec![west, south, east, north]);
        self
    }

    /// Set datetime or datetime range (e.g. `"2024-06-01/2024-06-30"`).
    pub fn datetime(mut self, dt: &str) -> Self {
        self.datetime = Some(dt.to_string());
        self
    }

    /// Half-open interval `[start, end)` as an RFC 3339 range.
    ///
    /// STAC ranges are closed, so the end is pulled back by one second.
    pub fn interval(self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let end = end - chrono::Duration::seconds(1);
        let fmt = "%Y-%m-%dT%H:%M:%SZ";
        self.datetime(&format!("{}/{}", start.format(fmt), end.format(fmt)))
    }

    /// Keep items with `eo:cloud_cover` strictly below `max_percent`.
    pub fn max_cloud_cover(mut self, max_percent: f64) -> Self {
        let mut query = self.query.take().unwrap_or_else(|| json!({}));
        if let Some(obj) = query.as_object_mut() {
            obj.insert("eo:cloud_cover".into(), json!({ "lt": max_percent }));
        }
        self.query = Some(query);
        self
    }

    /// Sort ascending by acquisition time.
    pub fn sort_by_datetime(mut self) -> Self {
        self.sortby = Some(vec![SortBy {
            field: "properties.datetime".into(),
            direction: "asc".into(),
        }]);
        self
    }

    /// Set collection filter.
    pub fn collections(mut self, cols: &[&str]) -> Self {
        self.collections = Some(cols.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Set maximum items per page.
    pub fn limit(mut self, n: u32) -> Self {
        self.limit = Some(n);
        self
    }

    /// Set pagination token.
    pub fn token(mut self, tok: &str) -> Self {
        self.token = Some(tok.to_string());
        self
    }
}

impl Default for StacSearchParams {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// A STAC Item Collection (GeoJSON FeatureCollection).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItemCollection {
    #[serde(rename = "type")]
    pub type_: String,

    pub features: Vec<StacItem>,

    #[serde(default)]
    pub links: Vec<StacLink>,

    /// Some catalogs return `numberMatched` or `context.matched`.
    #[serde(rename = "numberMatched", skip_serializing_if = "Option::is_none")]
    pub number_matched: Option<u64>,

    /// Some catalogs return `numberReturned` or `context.returned`.
    #[serde(rename = "numberReturned", skip_serializing_if = "Option::is_none")]
    pub number_returned: Option<u64>,

    /// Earth Search / some catalogs use `context` instead of numberMatched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl StacItemCollection {
    /// Find the `"next"` pagination link, if any.
    pub fn next_link(&self) -> Option<&StacLink> {
        self.links.iter().find(|l| l.rel == "next")
    }

    /// Whether there is a next page.
    pub fn has_next(&self) -> bool {
        self.next_link().is_some()
    }

    /// Total number of items in this page.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// A single STAC Item (GeoJSON Feature).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItem {
    #[serde(rename = "type")]
    pub type_: String,

    /// Unique item identifier.
    pub id: String,

    /// Geometry as raw JSON (we don't need to parse it).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<serde_json::Value>,

    /// Bounding box `[west, south, east, north]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,

    pub properties: StacItemProperties,

    pub assets: HashMap<String, StacAsset>,

    /// Collection this item belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,

    #[serde(default)]
    pub links: Vec<StacLink>,
}

impl StacItem {
    /// Get an asset by key.
    pub fn asset(&self, key: &str) -> Option<&StacAsset> {
        self.assets.get(key)
    }

    /// Get the EPSG code from the `proj:epsg` property, if available.
    ///
    /// Most STAC items from Sentinel-2 / Landsat include this via the
    /// [projection extension](https://github.com/stac-extensions/projection).
    pub fn epsg(&self) -> Option<u32> {
        let extra = &self.properties.extra;
        extra
            .get("proj:epsg")
            .and_then(Value::as_u64)
            .map(|v| v as u32)
            .or_else(|| {
                // projection extension v2 uses "proj:code": "EPSG:32618"
                extra
                    .get("proj:code")
                    .and_then(Value::as_str)
                    .and_then(|c| c.strip_prefix("EPSG:"))
                    .and_then(|c| c.parse().ok())
            })
    }

    fn string_property(&self, key: &str) -> Option<&str> {
        self.properties
            .extra
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Sentinel-2 product identifier.
    ///
    /// Taken from `s2:product_uri` without the `.SAFE` suffix; falls back to
    /// the item id, which is unique per product in every catalog we read.
    pub fn product_id(&self) -> &str {
        self.string_property("s2:product_uri")
            .map(|uri| uri.trim_end_matches(".SAFE"))
            .unwrap_or(&self.id)
    }

    /// Datatake (acquisition group) identifier, `s2:datatake_id`.
    pub fn datatake_id(&self) -> Option<&str> {
        self.string_property("s2:datatake_id")
    }

    /// Acquisition instant from `datetime` (or `start_datetime`).
    pub fn acquired(&self) -> Option<DateTime<Utc>> {
        self.properties
            .datetime
            .as_deref()
            .or_else(|| self.string_property("start_datetime"))
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Scene cloud percentage (`eo:cloud_cover`).
    pub fn cloud_cover(&self) -> Option<f64> {
        self.properties.eo_cloud_cover
    }

    /// Item footprint bbox, from `bbox` or derived from the geometry.
    pub fn footprint(&self) -> Option<BBox> {
        if let Some(b) = self.bbox.as_deref().and_then(BBox::from_slice) {
            return Some(b);
        }
        let geometry = self.geometry.as_ref()?;
        let mut bbox = BBox::empty();
        collect_positions(geometry.get("coordinates")?, &mut bbox);
        bbox.is_valid().then_some(bbox)
    }
}

fn collect_positions(value: &Value, bbox: &mut BBox) {
    let Some(items) = value.as_array() else {
        return;
    };
    match (items.first().and_then(Value::as_f64), items.get(1).and_then(Value::as_f64)) {
        (Some(x), Some(y)) => bbox.expand(x, y),
        _ => items.iter().for_each(|v| collect_positions(v, bbox)),
    }
}

/// STAC Item properties.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItemProperties {
    /// ISO 8601 datetime.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,

    /// Cloud cover percentage (EO extension).
    #[serde(rename = "eo:cloud_cover", skip_serializing_if = "Option::is_none")]
    pub eo_cloud_cover: Option<f64>,

    /// Platform name (e.g., "sentinel-2a").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    /// Constellation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constellation: Option<String>,

    /// GSD (ground sample distance).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gsd: Option<f64>,

    /// All other properties we don't model explicitly.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// A single STAC Asset (file reference).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacAsset {
    /// URL to the asset file.
    pub href: String,

    /// Media type (e.g., `"image/tiff; application=geotiff; profile=cloud-optimized"`).
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    /// Human-readable title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Roles: `["data"]`, `["thumbnail"]`, `["overview"]`, etc.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,

    /// All other asset fields.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// A STAC Link (used for pagination and related resources).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacLink {
    /// Relationship: `"self"`, `"root"`, `"next"`, `"prev"`, etc.
    pub rel: String,

    /// Target URL.
    pub href: String,

    /// HTTP method for the link (default GET, but `"next"` often uses POST).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Request body for POST-based pagination.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,

    /// Merge mode: if true, merge body with previous request body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge: Option<bool>,

    /// Media type of the linked resource.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
