use crate::document::Document;

use super::descriptor::ComponentDescriptor;

/// First node in depth-first pre-order whose `name` equals the descriptor's
/// and whose `properties` satisfy every filter entry. A same-named node that
/// fails the filter is skipped and its children are still searched.
pub fn locate<'a>(root: &'a Document, descriptor: &ComponentDescriptor) -> Option<&'a Document> {
    match root {
        Document::Mapping(entries) => {
            if is_match(root, descriptor) {
                return Some(root);
            }
            entries.iter().find_map(|(_, value)| locate(value, descriptor))
        }
        Document::Sequence(items) => items.iter().find_map(|item| locate(item, descriptor)),
        Document::Scalar(_) => None,
    }
}

/// Same-named nodes that the property filter turned away, in document order.
/// Only meaningful with a filter; lets callers notice a page whose layout moved.
pub fn rejected_candidates(root: &Document, descriptor: &ComponentDescriptor) -> usize {
    if descriptor.properties.is_none() {
        return 0;
    }
    let own = usize::from(is_candidate(root, descriptor) && !is_match(root, descriptor));
    let nested: usize = match root {
        Document::Mapping(entries) => entries.iter().map(|(_, v)| rejected_candidates(v, descriptor)).sum(),
        Document::Sequence(items) => items.iter().map(|i| rejected_candidates(i, descriptor)).sum(),
        Document::Scalar(_) => 0,
    };
    own + nested
}

fn is_candidate(node: &Document, descriptor: &ComponentDescriptor) -> bool {
    node.get("name").and_then(Document::as_str) == Some(descriptor.name.as_str())
}

fn is_match(node: &Document, descriptor: &ComponentDescriptor) -> bool {
    if !is_candidate(node, descriptor) {
        return false;
    }
    let Some(required) = &descriptor.properties else {
        return true;
    };
    let props = node.get("properties");
    required.iter().all(|(key, want)| {
        props
            .and_then(|p| p.get(key))
            .and_then(Document::as_scalar)
            .is_some_and(|have| have == want)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Scalar;

    fn doc(json: &str) -> Document {
        Document::from_json_str(json).unwrap()
    }

    #[test]
    fn bare_name_matches_root() {
        let d = doc(r#"{"name":"ModalV2","title":"Hi","children":[{"text":"Low"}]}"#);
        let found = locate(&d, &ComponentDescriptor::named("ModalV2")).unwrap();
        assert!(std::ptr::eq(found, &d));
    }

    #[test]
    fn first_in_preorder_wins() {
        let d = doc(
            r#"{"page":{"blocks":[
                {"wrapper":{"name":"ModalV2","id":1}},
                {"name":"ModalV2","id":2}
            ]},
            "footer":{"name":"ModalV2","id":3}}"#,
        );
        let found = locate(&d, &ComponentDescriptor::named("ModalV2")).unwrap();
        assert_eq!(found.get("id").and_then(Document::as_scalar), Some(&Scalar::from(1i64)));
    }

    #[test]
    fn parent_before_nested_same_name() {
        let d = doc(r#"{"name":"Box","id":"outer","children":[{"name":"Box","id":"inner"}]}"#);
        let found = locate(&d, &ComponentDescriptor::named("Box")).unwrap();
        assert_eq!(found.get("id").and_then(Document::as_str), Some("outer"));
    }

    #[test]
    fn property_filter_picks_the_right_tabs() {
        let d = doc(
            r#"{"content":[
                {"name":"Tabs.TabsPanelV2","properties":{"widthTabPanel":"fullBlock","widthTab":"auto"},"id":"a"},
                {"name":"Tabs.TabsPanelV2","properties":{"widthTabPanel":"fullBlock","widthTab":"equal"},"id":"b"}
            ]}"#,
        );
        let descriptor = ComponentDescriptor::named("Tabs.TabsPanelV2")
            .with_property("widthTabPanel", "fullBlock")
            .with_property("widthTab", "equal");
        let found = locate(&d, &descriptor).unwrap();
        assert_eq!(found.get("id").and_then(Document::as_str), Some("b"));
        assert_eq!(rejected_candidates(&d, &descriptor), 1);
    }

    #[test]
    fn rejected_candidate_children_still_searched() {
        let d = doc(
            r#"{"name":"Tabs.TabsPanelV2","properties":{},"children":[
                {"name":"Tabs.TabsPanelV2","properties":{"widthTab":"equal"},"id":"nested"}
            ]}"#,
        );
        let descriptor = ComponentDescriptor::named("Tabs.TabsPanelV2").with_property("widthTab", "equal");
        let found = locate(&d, &descriptor).unwrap();
        assert_eq!(found.get("id").and_then(Document::as_str), Some("nested"));
    }

    #[test]
    fn missing_properties_rejects() {
        let d = doc(r#"[{"name":"Tabs.TabsPanelV2"},{"name":"Tabs.TabsPanelV2","properties":"equal"}]"#);
        let descriptor = ComponentDescriptor::named("Tabs.TabsPanelV2").with_property("widthTab", "equal");
        assert!(locate(&d, &descriptor).is_none());
    }

    #[test]
    fn all_filter_keys_required() {
        let d = doc(r#"{"name":"T","properties":{"a":"1"}}"#);
        let descriptor = ComponentDescriptor::named("T").with_property("a", "1").with_property("b", "2");
        assert!(locate(&d, &descriptor).is_none());
    }

    #[test]
    fn filter_compares_types() {
        let d = doc(r#"{"name":"T","properties":{"n":3,"flag":true}}"#);
        assert!(locate(&d, &ComponentDescriptor::named("T").with_property("n", 3i64)).is_some());
        assert!(locate(&d, &ComponentDescriptor::named("T").with_property("n", "3")).is_none());
        assert!(locate(&d, &ComponentDescriptor::named("T").with_property("flag", true)).is_some());
    }

    #[test]
    fn name_must_be_a_string() {
        let d = doc(r#"{"name":{"name":"ModalV2"}}"#);
        // the inner mapping is still a node of its own
        let found = locate(&d, &ComponentDescriptor::named("ModalV2")).unwrap();
        assert_eq!(found.get("name").and_then(Document::as_str), Some("ModalV2"));
        assert!(locate(&doc(r#"{"name":["ModalV2"]}"#), &ComponentDescriptor::named("ModalV2")).is_none());
    }

    #[test]
    fn deep_document_without_match() {
        let mut json = String::from(r#"{"name":"Leaf"}"#);
        for i in 0..50 {
            json = format!(r#"{{"level":{},"items":[{}, "x", 1, null]}}"#, i, json);
        }
        let d = doc(&json);
        assert!(locate(&d, &ComponentDescriptor::named("ModalV2")).is_none());
        assert!(locate(&d, &ComponentDescriptor::named("Leaf")).is_some());
    }

    #[test]
    fn scalar_root() {
        assert!(locate(&doc(r#""ModalV2""#), &ComponentDescriptor::named("ModalV2")).is_none());
    }
}
