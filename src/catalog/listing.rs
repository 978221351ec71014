use std::collections::HashSet;

use scraper::{Html, Selector};
use tracing::debug;

use crate::document::Document;

/// Where aggregator pages keep their product grid inside the state blob.
const OFFERS_PATH: &[&str] = &["products", "list", "offers", "items"];

/// One product id picked off a listing page.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub id: String,
    pub name: Option<String>,
}

/// Scan every `<script>` on the page for an offers grid and collect its
/// products. Ids are unique; the first occurrence wins.
pub fn listings_from_html(html: &str) -> Vec<Listing> {
    let page = Html::parse_document(html);
    let Ok(selector) = Selector::parse("script") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for script in page.select(&selector) {
        let text: String = script.text().collect();
        if !text.contains("\"offers\"") || !text.contains("\"items\"") {
            continue;
        }
        let Some(state) = parse_script_state(&text) else {
            debug!("Script mentions offers but holds no parsable state");
            continue;
        };
        for listing in offers_in(&state) {
            if seen.insert(listing.id.clone()) {
                out.push(listing);
            }
        }
    }
    out
}

/// Products under the first `products.list.offers.items` in the tree.
pub fn offers_in(state: &Document) -> Vec<Listing> {
    match state.find_path(OFFERS_PATH) {
        Some(Document::Sequence(items)) => items.iter().filter_map(listing_from_item).collect(),
        _ => Vec::new(),
    }
}

fn listing_from_item(item: &Document) -> Option<Listing> {
    let id = item.get("id")?.as_scalar()?.as_text()?;
    // Some grids only carry an alias for the display name.
    let name = ["name", "alias"]
        .iter()
        .find_map(|key| item.get(key).and_then(Document::as_str))
        .map(String::from);
    Some(Listing { id, name })
}

/// Script bodies are either bare JSON or an assignment like
/// `window.__STATE__ = {...};`.
fn parse_script_state(text: &str) -> Option<Document> {
    if let Ok(doc) = Document::from_json_str(text.trim()) {
        return Some(doc);
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Document::from_json_str(&text[start..=end]).ok()
}
