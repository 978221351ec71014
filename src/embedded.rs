use scraper::{Html, Selector};
use thiserror::Error;

use crate::document::Document;

/// Element id of the state blob the bank pages hydrate from.
pub const DEFAULT_BLOCK_ID: &str = "app_state";

/// The page came back but there was no usable state tree in it.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("script block #{id} not found on page")]
    BlockMissing { id: String },
    #[error("script block #{id} is not valid JSON: {source}")]
    Malformed {
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid block id '{0}'")]
    InvalidId(String),
}

/// Pull the `<script id=...>` blob out of a page and parse it as a `Document`.
/// An empty script element counts as missing.
pub fn parse_embedded(html: &str, block_id: &str) -> Result<Document, DocumentError> {
    let json = find_block(html, block_id)?;
    Document::from_json_str(&json).map_err(|source| DocumentError::Malformed {
        id: block_id.to_string(),
        source,
    })
}

fn find_block(html: &str, block_id: &str) -> Result<String, DocumentError> {
    if block_id.is_empty() || block_id.contains(['"', '\\']) {
        return Err(DocumentError::InvalidId(block_id.to_string()));
    }
    let selector = Selector::parse(&format!(r#"script[id="{}"]"#, block_id))
        .map_err(|_| DocumentError::InvalidId(block_id.to_string()))?;

    let document = Html::parse_document(html);
    let text = document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>())
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| DocumentError::BlockMissing {
            id: block_id.to_string(),
        })?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_block_by_id() {
        let html = r#"<html><head>
            <script id="other">{"name":"ModalV2","title":"decoy"}</script>
            <script id="app_state" type="application/json">{"page":{"name":"ModalV2"}}</script>
            </head></html>"#;
        let doc = parse_embedded(html, DEFAULT_BLOCK_ID).unwrap();
        assert!(doc.get("page").is_some());
    }

    #[test]
    fn missing_block() {
        let err = parse_embedded("<html><body>blocked</body></html>", "app_state").unwrap_err();
        assert!(matches!(err, DocumentError::BlockMissing { ref id } if id == "app_state"));
    }

    #[test]
    fn empty_block_is_missing() {
        let err = parse_embedded(r#"<script id="app_state">  </script>"#, "app_state").unwrap_err();
        assert!(matches!(err, DocumentError::BlockMissing { .. }));
    }

    #[test]
    fn malformed_block() {
        let err = parse_embedded(r#"<script id="app_state">{"page": </script>"#, "app_state").unwrap_err();
        assert!(matches!(err, DocumentError::Malformed { .. }));
        assert!(err.to_string().starts_with("script block #app_state is not valid JSON"));
    }

    #[test]
    fn rejects_quote_in_id() {
        assert!(matches!(
            parse_embedded("<html></html>", r#"a"b"#),
            Err(DocumentError::InvalidId(_))
        ));
    }

    #[test]
    fn modal_page_fixture() {
        let html = std::fs::read_to_string("tests/fixtures/modal_page.html").unwrap();
        let doc = parse_embedded(&html, DEFAULT_BLOCK_ID).unwrap();
        assert!(doc.node_count() > 10);
    }
}
