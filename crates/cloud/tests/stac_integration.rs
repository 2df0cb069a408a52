//! Integration tests against live STAC catalogs.
//!
//! Tests marked `#[ignore]` require network access.
//! Run with: `cargo test -p vegmon-cloud -- --ignored stac`

use std::collections::HashSet;
use std::io::Read;

use chrono::{TimeZone, Utc};
use vegmon_cloud::blocking::StacClientBlocking;
use vegmon_cloud::stac_client::{StacCatalog, StacClient, StacClientOptions};
use vegmon_cloud::stac_models::StacSearchParams;
use vegmon_cloud::RangeReaderOptions;

// Complejo Pajarales, Cienaga Grande de Santa Marta
const AOI_BBOX: [f64; 4] = [-74.5924, 10.8193, -74.5435, 10.8400];

fn june_2025() -> StacSearchParams {
    let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap();
    StacSearchParams::new()
        .bbox(AOI_BBOX[0], AOI_BBOX[1], AOI_BBOX[2], AOI_BBOX[3])
        .interval(start, end)
        .max_cloud_cover(80.0)
        .collections(&["sentinel-2-l2a"])
        .limit(50)
}

#[tokio::test]
#[ignore]
async fn stac_earth_search_month_window() {
    let client = StacClient::new(StacCatalog::EarthSearch, StacClientOptions::default())
        .expect("failed to create client");

    let items = client.search_all(&june_2025()).await.expect("search failed");
    assert!(!items.is_empty(), "should find at least one item");

    let mut products = HashSet::new();
    for item in &items {
        let acquired = item.acquired().expect("item without datetime");
        assert_eq!(acquired.format("%Y-%m").to_string(), "2025-06");
        assert!(item.cloud_cover().is_some_and(|cc| cc < 80.0));
        assert!(item.epsg().is_some_and(|e| (32601..=32660).contains(&e)));
        products.insert(item.product_id().to_string());
    }
    assert_eq!(products.len(), items.len(), "product ids should be unique");
}

#[tokio::test]
#[ignore]
async fn stac_planetary_computer_month_window() {
    let client = StacClient::new(StacCatalog::PlanetaryComputer, StacClientOptions::default())
        .expect("failed to create client");

    let page = client.search(&june_2025()).await.expect("search failed");
    assert!(!page.is_empty(), "should find at least one item");

    let item = &page.features[0];
    assert!(item.asset("B04").is_some() && item.asset("B08").is_some());
    assert!(item.datatake_id().is_some());
}

#[test]
#[ignore]
fn stac_pc_signed_range_read() {
    let client = StacClientBlocking::new(StacCatalog::PlanetaryComputer, StacClientOptions::default())
        .expect("failed to create client");

    let items = client.search_all(&june_2025().limit(1)).expect("search failed");
    let item = items.first().expect("no items");
    let href = &item.asset("B04").expect("no red band").href;

    let mut file = client
        .open_asset(href, "sentinel-2-l2a", &RangeReaderOptions::default())
        .expect("open failed");
    assert!(file.len() > 1024);

    let mut magic = [0u8; 4];
    file.read_exact(&mut magic).expect("read failed");
    // little-endian classic TIFF
    assert_eq!(&magic, b"II*\0");
}
