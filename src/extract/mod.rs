pub mod descriptor;
pub mod harvest;
pub mod locate;

use tracing::debug;

use crate::document::Document;
pub use descriptor::ComponentDescriptor;

/// Result of one locate + harvest pass over a document.
#[derive(Debug)]
pub enum Extraction<'a> {
    Found {
        component: &'a Document,
        texts: Vec<String>,
    },
    NotFound(ComponentDescriptor),
}

impl Extraction<'_> {
    /// Harvested fields joined and normalized. Empty when nothing was found.
    pub fn content(&self) -> String {
        match self {
            Extraction::Found { texts, .. } => harvest::join_texts(texts),
            Extraction::NotFound(_) => String::new(),
        }
    }
}

/// Locate the component and harvest its text. Pure; never touches I/O.
pub fn extract<'a>(document: &'a Document, descriptor: &ComponentDescriptor) -> Extraction<'a> {
    match locate::locate(document, descriptor) {
        Some(component) => {
            let rejected = locate::rejected_candidates(document, descriptor);
            if rejected > 0 {
                debug!(
                    "{} same-named candidate(s) for {} rejected by property filter",
                    rejected, descriptor
                );
            }
            Extraction::Found {
                component,
                texts: harvest::harvest(component),
            }
        }
        None => {
            debug!("No component {} in {} nodes", descriptor, document.node_count());
            Extraction::NotFound(descriptor.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modal_round_trip() {
        let d = Document::from_json_str(r#"{"name":"ModalV2","title":"Hi","children":[{"text":"Low"}]}"#).unwrap();
        let e = extract(&d, &ComponentDescriptor::named("ModalV2"));
        match &e {
            Extraction::Found { component, texts } => {
                assert!(std::ptr::eq(*component, &d));
                assert_eq!(texts, &["Hi", "Low"]);
            }
            other => panic!("expected match, got {:?}", other),
        }
        assert_eq!(e.content(), "Hi Low");
    }

    #[test]
    fn not_found_carries_descriptor() {
        let d = Document::from_json_str(r#"{"a":[{"b":{"name":"Other"}}]}"#).unwrap();
        let descriptor = ComponentDescriptor::named("ModalV2").with_property("widthTab", "equal");
        match extract(&d, &descriptor) {
            Extraction::NotFound(missing) => assert_eq!(missing, descriptor),
            other => panic!("expected miss, got {:?}", other),
        }
    }

    #[test]
    fn found_but_empty() {
        let d = Document::from_json_str(r#"{"name":"ModalV2","children":[]}"#).unwrap();
        let e = extract(&d, &ComponentDescriptor::named("ModalV2"));
        assert!(matches!(e, Extraction::Found { .. }));
        assert_eq!(e.content(), "");
    }

    #[test]
    fn normalized_content() {
        let d = Document::from_json_str(
            r#"{"name":"ModalV2","title":"Кешбэк до 30%","body":{"text":"\nна всё\r"}}"#,
        )
        .unwrap();
        assert_eq!(extract(&d, &ComponentDescriptor::named("ModalV2")).content(), "Кешбэк до 30%  на всё");
    }
}
