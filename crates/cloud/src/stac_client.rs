//! Async STAC client for searching spatio-temporal asset catalogs.
//!
//! Supports Planetary Computer and Earth Search out of the box, plus
//! arbitrary STAC API endpoints via [`StacCatalog::Custom`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{CloudError, Result};
use crate::http::HttpClient;
use crate::stac_models::{StacItem, StacItemCollection, StacLink, StacSearchParams};

const PC_TOKEN_URL: &str = "https://planetarycomputer.microsoft.com/api/sas/v1/token";

// ---------------------------------------------------------------------------
// Catalog enum
// ---------------------------------------------------------------------------

/// Well-known STAC catalogs plus custom endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StacCatalog {
    /// Microsoft Planetary Computer STAC API.
    PlanetaryComputer,
    /// AWS Earth Search (Element 84).
    EarthSearch,
    /// Any STAC API endpoint (provide the root URL, e.g.
    /// `"https://my-stac.example.com/api/v1"`).
    Custom(String),
}

impl StacCatalog {
    /// Return the full POST `/search` URL for this catalog.
    pub fn search_url(&self) -> String {
        match self {
            Self::PlanetaryComputer => {
                "https://planetarycomputer.microsoft.com/api/stac/v1/search".to_string()
            }
            Self::EarthSearch => "https://earth-search.aws.element84.com/v1/search".to_string(),
            Self::Custom(base) => {
                let base = base.trim_end_matches('/');
                if base.ends_with("/search") {
                    base.to_string()
                } else {
                    format!("{}/search", base)
                }
            }
        }
    }

    /// Parse a shorthand string into a catalog.
    ///
    /// Recognized shorthands: `"pc"`, `"planetary-computer"`, `"es"`,
    /// `"earth-search"`. Anything else is treated as a custom URL.
    pub fn from_str_or_url(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pc" | "planetary-computer" | "planetarycomputer" => Self::PlanetaryComputer,
            "es" | "earth-search" | "earthsearch" => Self::EarthSearch,
            _ => Self::Custom(s.to_string()),
        }
    }

    /// Whether this catalog requires SAS token signing for asset access.
    pub fn needs_signing(&self) -> bool {
        matches!(self, Self::PlanetaryComputer)
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for [`StacClient`].
#[derive(Debug, Clone)]
pub struct StacClientOptions {
    /// Per-request timeout (default 30 s).
    pub request_timeout: Duration,
    /// Maximum retries on transient failures (default 3).
    pub max_retries: u32,
    /// Maximum total items to fetch across pages (default 1000).
    pub max_items: usize,
}

impl Default for StacClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            max_items: 1000,
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct SasToken {
    token: String,
    #[serde(rename = "msft:expiry")]
    expiry: Option<DateTime<Utc>>,
}

impl SasToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        // refresh a minute early
        self.expiry
            .map_or(true, |exp| exp - chrono::Duration::seconds(60) > now)
    }
}

/// Async client for STAC Item Search.
pub struct StacClient {
    catalog: StacCatalog,
    http: HttpClient,
    options: StacClientOptions,
    tokens: Mutex<HashMap<String, SasToken>>,
}

impl StacClient {
    /// Create a new STAC client.
    pub fn new(catalog: StacCatalog, options: StacClientOptions) -> Result<Self> {
        let http = HttpClient::new(options.request_timeout, options.max_retries)?;
        Ok(Self {
            catalog,
            http,
            options,
            tokens: Mutex::new(HashMap::new()),
        })
    }

    /// The catalog this client is configured for.
    pub fn catalog(&self) -> &StacCatalog {
        &self.catalog
    }

    // ── Single-page search ──────────────────────────────────────────

    /// Execute a single search request and return one page of results.
    pub async fn search(&self, params: &StacSearchParams) -> Result<StacItemCollection> {
        let url = self.catalog.search_url();
        self.post_search(&url, params).await
    }

    // ── Paginated search ────────────────────────────────────────────

    /// Search with automatic pagination, collecting up to `max_items` items.
    pub async fn search_all(&self, params: &StacSearchParams) -> Result<Vec<StacItem>> {
        let mut all_items: Vec<StacItem> = Vec::new();
        let max = self.options.max_items;
        let mut pages = 1usize;

        let mut page = self.search(params).await?;

        loop {
            let next = page.next_link().cloned();
            all_items.append(&mut page.features);

            if all_items.len() >= max {
                break;
            }

            match next {
                Some(link) => {
                    page = self.follow_next(&link, params).await?;
                    pages += 1;
                    if page.is_empty() {
                        break;
                    }
                }
                None => break,
            }
        }

        all_items.truncate(max);
        info!(
            items = all_items.len(),
            pages,
            datetime = params.datetime.as_deref().unwrap_or(""),
            "STAC search complete"
        );
        Ok(all_items)
    }

    // ── Planetary Computer SAS token signing ────────────────────────

    /// Sign an asset href for Planetary Computer.
    ///
    /// Tokens are requested once per collection and reused until shortly
    /// before they expire. For non-PC catalogs the href is returned
    /// unchanged.
    pub async fn sign_asset_href(&self, href: &str, collection: &str) -> Result<String> {
        if !self.catalog.needs_signing() {
            return Ok(href.to_string());
        }
        let token = self.collection_token(collection).await?;
        let sep = if href.contains('?') { '&' } else { '?' };
        Ok(format!("{href}{sep}{token}"))
    }

    // ── Private helpers ─────────────────────────────────────────────

    async fn post_search(&self, url: &str, params: &StacSearchParams) -> Result<StacItemCollection> {
        debug!(url, "STAC search page");
        let body = self.http.post_json(url, params).await?;
        parse_collection(&body)
    }

    /// Follow a pagination link. Handles both POST (body/merge) and GET links.
    async fn follow_next(
        &self,
        link: &StacLink,
        original_params: &StacSearchParams,
    ) -> Result<StacItemCollection> {
        let method = link.method.as_deref().unwrap_or("GET").to_uppercase();

        if method != "POST" {
            let body = self.http.get_text(&link.href).await?;
            return parse_collection(&body);
        }

        let body = match (&link.body, link.merge.unwrap_or(false)) {
            (Some(link_body), true) => {
                let mut base = serde_json::to_value(original_params)
                    .map_err(|e| CloudError::InvalidStac(format!("serializing params: {e}")))?;
                if let (Some(base_obj), Some(link_obj)) =
                    (base.as_object_mut(), link_body.as_object())
                {
                    for (k, v) in link_obj {
                        base_obj.insert(k.clone(), v.clone());
                    }
                }
                base
            }
            (Some(link_body), false) => link_body.clone(),
            (None, _) => serde_json::to_value(original_params)
                .map_err(|e| CloudError::InvalidStac(format!("serializing params: {e}")))?,
        };

        debug!(url = %link.href, "STAC search page");
        let text = self.http.post_json(&link.href, &body).await?;
        parse_collection(&text)
    }

    async fn collection_token(&self, collection: &str) -> Result<String> {
        let now = Utc::now();
        if let Some(tok) = self.cached_token(collection, now) {
            return Ok(tok);
        }

        let url = format!("{PC_TOKEN_URL}/{collection}");
        let body = self.http.get_text(&url).await.map_err(|e| match e {
            CloudError::Status { status, url } => {
                CloudError::Auth(format!("token request returned HTTP {status} for {url}"))
            }
            other => other,
        })?;
        let token: SasToken = serde_json::from_str(&body)
            .map_err(|e| CloudError::Auth(format!("parsing PC token response: {e}")))?;
        debug!(collection, expiry = ?token.expiry, "fetched SAS token");

        let value = token.token.clone();
        if let Ok(mut cache) = self.tokens.lock() {
            cache.insert(collection.to_string(), token);
        }
        Ok(value)
    }

    fn cached_token(&self, collection: &str, now: DateTime<Utc>) -> Option<String> {
        let cache = self.tokens.lock().ok()?;
        cache
            .get(collection)
            .filter(|t| t.is_fresh(now))
            .map(|t| t.token.clone())
    }
}

fn parse_collection(body: &str) -> Result<StacItemCollection> {
    serde_json::from_str(body).map_err(|e| {
        CloudError::InvalidStac(format!(
            "{e}: {}",
            body.chars().take(200).collect::<String>()
        ))
    })
}

/// Load a static ItemCollection (e.g. a saved search response) from disk.
pub fn load_item_collection(path: impl AsRef<Path>) -> Result<StacItemCollection> {
    let text = std::fs::read_to_string(path.as_ref())?;
    parse_collection(&text)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn catalog_search_urls() {
        assert_eq!(
            StacCatalog::PlanetaryComputer.search_url(),
            "https://planetarycomputer.microsoft.com/api/stac/v1/search"
        );
        assert_eq!(
            StacCatalog::EarthSearch.search_url(),
            "https://earth-search.aws.element84.com/v1/search"
        );
        assert_eq!(
            StacCatalog::Custom("https://example.com/stac".into()).search_url(),
            "https://example.com/stac/search"
        );
        assert_eq!(
            StacCatalog::Custom("https://example.com/stac/search".into()).search_url(),
            "https://example.com/stac/search"
        );
        assert_eq!(
            StacCatalog::Custom("https://example.com/stac/".into()).search_url(),
            "https://example.com/stac/search"
        );
    }

    #[test]
    fn catalog_from_str_or_url() {
        assert_eq!(
            StacCatalog::from_str_or_url("pc"),
            StacCatalog::PlanetaryComputer
        );
        assert_eq!(StacCatalog::from_str_or_url("ES"), StacCatalog::EarthSearch);
        // custom URLs keep their case
        assert_eq!(
            StacCatalog::from_str_or_url("https://My-Stac.com/v1"),
            StacCatalog::Custom("https://My-Stac.com/v1".into())
        );
    }

    #[test]
    fn needs_signing() {
        assert!(StacCatalog::PlanetaryComputer.needs_signing());
        assert!(!StacCatalog::EarthSearch.needs_signing());
        assert!(!StacCatalog::Custom("https://x.com".into()).needs_signing());
    }

    #[test]
    fn sas_token_freshness() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let token = |expiry| SasToken {
            token: "st=x&se=y&sig=z".into(),
            expiry,
        };
        assert!(token(Some(now + chrono::Duration::minutes(30))).is_fresh(now));
        assert!(!token(Some(now + chrono::Duration::seconds(30))).is_fresh(now));
        assert!(token(None).is_fresh(now));
    }

    #[test]
    fn parses_pc_token_response() {
        let body = r#"{"msft:expiry": "2025-06-01T13:00:00Z", "token": "st=a&se=b&sig=c"}"#;
        let token: SasToken = serde_json::from_str(body).unwrap();
        assert_eq!(token.token, "st=a&se=b&sig=c");
        assert!(token.expiry.is_some());
    }

    #[test]
    fn load_item_collection_reports_bad_documents() {
        let dir = tempfile::tempdir().unwrap();

        let good = dir.path().join("items.json");
        std::fs::write(
            &good,
            r#"{"type": "FeatureCollection", "features": [], "links": []}"#,
        )
        .unwrap();
        assert!(load_item_collection(&good).unwrap().is_empty());

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{not json").unwrap();
        assert!(matches!(
            load_item_collection(&bad),
            Err(CloudError::InvalidStac(_))
        ));
    }
}
