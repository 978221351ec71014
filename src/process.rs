use chrono::{SecondsFormat, Utc};
use tracing::warn;

use crate::db::{FetchedPage, Outcome, RecordRow};
use crate::embedded::{self, DocumentError};
use crate::extract::{self, ComponentDescriptor, Extraction};

/// What one page yielded: the outcome kind and the text that goes in `content`.
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult {
    pub outcome: Outcome,
    pub content: String,
}

/// Parse the embedded state, locate the component and harvest it.
/// Misses and parse failures become readable `content` strings.
pub fn extract_from_html(html: &str, block_id: &str, descriptor: &ComponentDescriptor) -> PageResult {
    let document = match embedded::parse_embedded(html, block_id) {
        Ok(doc) => doc,
        Err(e) => return document_failure(&e),
    };

    match extract::extract(&document, descriptor) {
        found @ Extraction::Found { .. } => PageResult {
            outcome: Outcome::Found,
            content: found.content(),
        },
        Extraction::NotFound(missing) => PageResult {
            outcome: Outcome::NotFound,
            content: format!("Component {} not found in page state", missing),
        },
    }
}

fn document_failure(e: &DocumentError) -> PageResult {
    PageResult {
        outcome: Outcome::DocumentError,
        content: format!("No page state: {}", e),
    }
}

/// Turn a stored fetch attempt into a record. Safe to call from many threads.
pub fn process_page(page: &FetchedPage, block_id: &str) -> RecordRow {
    let result = match (&page.html, &page.error) {
        (Some(html), None) => extract_from_html(html, block_id, &page.descriptor),
        (_, Some(err)) => PageResult {
            outcome: Outcome::FetchError,
            content: format!("Fetch failed: {}", err),
        },
        (None, None) => PageResult {
            outcome: Outcome::FetchError,
            content: "Fetch failed: empty response".to_string(),
        },
    };

    if result.outcome != Outcome::Found {
        warn!("{} [{}]: {}", page.url, result.outcome.as_str(), result.content);
    }

    RecordRow {
        target_id: page.target_id,
        page_data_id: Some(page.page_data_id),
        url: page.url.clone(),
        service_type: page.service_type.clone(),
        outcome: result.outcome,
        content: result.content,
        extracted_at: now_rfc3339(),
    }
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
