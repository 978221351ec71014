use crate::document::Document;

const TITLE: &str = "title";
const TEXT: &str = "text";

/// Characters that page copy uses as spacing and that read as a plain space.
const SPACE_LIKE: &[char] = &['\u{00A0}', '\u{202F}', '\u{2009}', '\r', '\n'];

/// Collect `title` then `text` of every mapping in pre-order, node before children.
pub fn harvest(subtree: &Document) -> Vec<String> {
    let mut out = Vec::new();
    visit(subtree, &mut out);
    out
}

fn visit(node: &Document, out: &mut Vec<String>) {
    match node {
        Document::Mapping(entries) => {
            for key in [TITLE, TEXT] {
                if let Some(text) = node.get(key).and_then(Document::as_scalar).and_then(|s| s.as_text()) {
                    out.push(text);
                }
            }
            for (_, value) in entries {
                visit(value, out);
            }
        }
        Document::Sequence(items) => {
            for item in items {
                visit(item, out);
            }
        }
        Document::Scalar(_) => {}
    }
}

/// Swap special spaces and line breaks for ASCII spaces, then trim the ends.
/// Runs of spaces inside the string are left alone.
pub fn normalize(s: &str) -> String {
    s.replace(SPACE_LIKE, " ").trim().to_string()
}

/// Join harvested fields with single spaces and normalize the result.
pub fn join_texts(texts: &[String]) -> String {
    normalize(&texts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(json: &str) -> Document {
        Document::from_json_str(json).unwrap()
    }

    #[test]
    fn nested_order() {
        let d = doc(r#"{"title":"A","child":{"text":"B","child":{"title":"C","text":"D"}}}"#);
        assert_eq!(harvest(&d), ["A", "B", "C", "D"]);
    }

    #[test]
    fn title_before_text_regardless_of_key_order() {
        let d = doc(r#"{"text":"second","title":"first"}"#);
        assert_eq!(harvest(&d), ["first", "second"]);
    }

    #[test]
    fn modal_fixture() {
        let d = doc(r#"{"name":"ModalV2","title":"Hi","children":[{"text":"Low"}]}"#);
        assert_eq!(harvest(&d), ["Hi", "Low"]);
        assert_eq!(join_texts(&harvest(&d)), "Hi Low");
        assert_eq!(normalize("Hi Low"), "Hi Low");
    }

    #[test]
    fn siblings_in_document_order() {
        let d = doc(r#"[{"title":"1"},{"items":[{"text":"2"},{"title":"3"}]},{"text":"4"}]"#);
        assert_eq!(harvest(&d), ["1", "2", "3", "4"]);
    }

    #[test]
    fn non_string_scalars() {
        let d = doc(r#"{"title":5,"text":null,"child":{"text":true}}"#);
        assert_eq!(harvest(&d), ["5", "true"]);
    }

    #[test]
    fn structured_title_is_descended() {
        let d = doc(r#"{"title":{"text":"inner"},"text":"outer"}"#);
        assert_eq!(harvest(&d), ["outer", "inner"]);
    }

    #[test]
    fn nothing_to_harvest() {
        let d = doc(r#"{"name":"ModalV2","children":[{"id":1},[]]}"#);
        assert!(harvest(&d).is_empty());
        assert_eq!(join_texts(&harvest(&d)), "");
    }

    #[test]
    fn join_normalizes_each_field() {
        let texts = vec!["\u{00A0}Кешбэк".to_string(), "до 5%\n".to_string()];
        assert_eq!(join_texts(&texts), "Кешбэк до 5%");
    }

    #[test]
    fn normalize_spaces() {
        let s = "\n До\u{00A0}5%\u{202F}кешбэк\r\nна\u{2009}всё  ";
        assert_eq!(normalize(s), "До 5% кешбэк  на всё");
    }

    #[test]
    fn normalize_keeps_inner_runs() {
        assert_eq!(normalize("a   b\tc"), "a   b\tc");
    }

    #[test]
    fn normalize_idempotent() {
        for s in [
            "",
            "   ",
            "\u{00A0}lead",
            "trail\u{202F}\u{2009}\r\n",
            "mid\u{00A0}\u{00A0}dle",
            "\t\u{3000}wide\u{3000}\t",
            "plain text",
        ] {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "input {:?}", s);
        }
    }
}
