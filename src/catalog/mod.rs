pub mod api;
pub mod card;
pub mod listing;

use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use rusqlite::Connection;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::db::{self, NewProduct, PendingProduct};
use crate::document::Document;
use crate::fetcher::{self, FetchStats};
use crate::settings::{CatalogSource, Settings};
pub use api::ProductKind;

pub struct ScanStats {
    pub pages: usize,
    pub failed_pages: usize,
    pub listed: usize,
    pub new: usize,
}

/// Fetch each listing page and queue the products found on it. A page that
/// fails to load or has no grid is logged and skipped.
pub async fn scan_sources(
    conn: &Connection,
    client: &Client,
    sources: &[CatalogSource],
    delay: Duration,
) -> Result<ScanStats> {
    let mut stats = ScanStats {
        pages: sources.len(),
        failed_pages: 0,
        listed: 0,
        new: 0,
    };

    for (i, source) in sources.iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let page = match fetcher::fetch_page(client, &source.url).await {
            Ok(page) => page,
            Err(e) => {
                warn!("Listing fetch failed for {}: {}", source.url, e);
                stats.failed_pages += 1;
                continue;
            }
        };

        let listings = listing::listings_from_html(&page.html);
        if listings.is_empty() {
            warn!("No product grid on {}", source.url);
            continue;
        }

        let kind = source.kind();
        let rows: Vec<NewProduct> = listings
            .into_iter()
            .map(|l| NewProduct {
                product_id: l.id,
                service_type: source.service_type.clone(),
                kind,
                name: l.name,
                source_url: source.url.clone(),
            })
            .collect();
        let new = db::insert_products(conn, &rows)?;
        info!("{}: {} products ({} new, {})", source.url, rows.len(), new, kind.as_str());
        stats.listed += rows.len();
        stats.new += new;
    }

    Ok(stats)
}

/// Look up queued products one at a time, storing each answer or failure.
pub async fn fetch_details(
    conn: &Connection,
    client: &Client,
    settings: &Settings,
    pending: Vec<PendingProduct>,
) -> Result<FetchStats> {
    let total = pending.len();
    let delay = settings.catalog_delay();
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let mut ok = 0usize;
    let mut errors = 0usize;

    for (i, product) in pending.into_iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = api::fetch_product(
            client,
            &settings.catalog_api_url,
            &settings.catalog_origin,
            product.kind,
            &product.product_id,
        )
        .await;
        match result {
            Ok(body) => {
                db::save_product_details(conn, product.id, Some(&body), None)?;
                ok += 1;
            }
            Err(e) => {
                warn!("Details failed for {} ({}): {}", product.product_id, product.kind.as_str(), e);
                db::save_product_details(conn, product.id, None, Some(&e.to_string()))?;
                errors += 1;
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Fetched details for {} products ({} ok, {} errors)", total, ok, errors);

    Ok(FetchStats { total, ok, errors })
}

/// Summaries keyed by product id, in listing order. Rows whose stored body
/// no longer parses are skipped.
pub fn build_summaries(rows: &[(String, String, String)]) -> Result<Map<String, Value>> {
    let mut out = Map::new();
    for (product_id, service_type, raw) in rows {
        let response = match Document::from_json_str(raw) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Stored details for {} are not JSON: {}", product_id, e);
                continue;
            }
        };
        let summary = card::summarize(product_id, service_type, &response);
        out.insert(product_id.clone(), serde_json::to_value(&summary)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn summaries_keyed_by_product() {
        let details = std::fs::read_to_string("tests/fixtures/product_details.json").unwrap();
        let rows = vec![
            ("5f2a9c".to_string(), "Дебетовая карта".to_string(), details),
            ("bad".to_string(), "Дебетовая карта".to_string(), "<html>".to_string()),
            ("77".to_string(), "Кредитная карта".to_string(), r#"{"name":"Bare"}"#.to_string()),
        ];
        let summaries = build_summaries(&rows).unwrap();
        let keys: Vec<&str> = summaries.keys().map(String::as_str).collect();
        assert_eq!(keys, ["5f2a9c", "77"]);
        assert_eq!(summaries["5f2a9c"]["withdrawal"]["places"][0], "Банкоматы банка");
        assert_eq!(summaries["77"]["service_type"], "Кредитная карта");
    }

    #[tokio::test]
    async fn unreachable_sources_are_skipped() {
        let conn = memory_db();
        let client = Client::new();
        let sources = vec![CatalogSource {
            url: "http://127.0.0.1:1/karty/".into(),
            service_type: "Кредитная карта".into(),
            kind: None,
        }];
        let stats = scan_sources(&conn, &client, &sources, Duration::ZERO).await.unwrap();
        assert_eq!((stats.pages, stats.failed_pages, stats.new), (1, 1, 0));
        assert!(db::fetch_pending_products(&conn, None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_lookups_are_stored_and_batch_continues() {
        let conn = memory_db();
        let rows: Vec<NewProduct> = ["a", "b"]
            .iter()
            .map(|id| NewProduct {
                product_id: id.to_string(),
                service_type: "Дебетовая карта".into(),
                kind: ProductKind::DebitCards,
                name: None,
                source_url: "https://www.sravni.ru/debetovye-karty/".into(),
            })
            .collect();
        db::insert_products(&conn, &rows).unwrap();

        let mut settings = crate::settings::load(None).unwrap();
        settings.catalog_api_url = "http://127.0.0.1:1/byId".into();
        settings.catalog_delay_ms = 0;
        let client = fetcher::build_client(&settings).unwrap();

        let pending = db::fetch_pending_products(&conn, None).unwrap();
        let stats = fetch_details(&conn, &client, &settings, pending).await.unwrap();
        assert_eq!((stats.total, stats.ok, stats.errors), (2, 0, 2));
        assert!(db::fetch_pending_products(&conn, None).unwrap().is_empty());
        assert_eq!(db::get_stats(&conn).unwrap().product_errors, 2);
    }
}
