use std::fmt;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Number, Value};

/// A leaf value of the state tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

impl Scalar {
    /// Text contributed to a harvest. `null` contributes nothing.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Scalar::Null => None,
            Scalar::Bool(b) => Some(b.to_string()),
            Scalar::Number(n) => Some(n.to_string()),
            Scalar::String(s) => Some(s.clone()),
        }
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Scalar::Null, Scalar::Null) => true,
            (Scalar::Bool(a), Scalar::Bool(b)) => a == b,
            (Scalar::String(a), Scalar::String(b)) => a == b,
            (Scalar::Number(a), Scalar::Number(b)) => numbers_equal(a, b),
            _ => false,
        }
    }
}

// 1 and 1.0 are the same value in the page state.
fn numbers_equal(a: &Number, b: &Number) -> bool {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::String(s.to_string())
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Scalar::Number(n.into())
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Number(n) => write!(f, "{}", n),
            Scalar::String(s) => write!(f, "{:?}", s),
        }
    }
}

/// Client-side state tree pulled out of a page.
///
/// Mappings keep their keys in document order; lookups are linear, which is
/// fine for the handful of keys a UI node carries.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Mapping(Vec<(String, Document)>),
    Sequence(Vec<Document>),
    Scalar(Scalar),
}

impl Document {
    /// Field lookup on a mapping node. Any other node has no fields.
    pub fn get(&self, key: &str) -> Option<&Document> {
        match self {
            Document::Mapping(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Document::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Document::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Total node count, used for logging traversal size.
    pub fn node_count(&self) -> usize {
        match self {
            Document::Mapping(entries) => 1 + entries.iter().map(|(_, v)| v.node_count()).sum::<usize>(),
            Document::Sequence(items) => 1 + items.iter().map(Document::node_count).sum::<usize>(),
            Document::Scalar(_) => 1,
        }
    }

    /// First node in pre-order from which `path` resolves as a chain of field
    /// lookups. Returns the node at the end of the chain.
    pub fn find_path(&self, path: &[&str]) -> Option<&Document> {
        let resolved = path.iter().try_fold(self, |node, key| node.get(key));
        if resolved.is_some() {
            return resolved;
        }
        match self {
            Document::Mapping(entries) => entries.iter().find_map(|(_, v)| v.find_path(path)),
            Document::Sequence(items) => items.iter().find_map(|item| item.find_path(path)),
            Document::Scalar(_) => None,
        }
    }

    /// `null`, `""`, `[]` or `{}`.
    pub fn is_blank(&self) -> bool {
        match self {
            Document::Mapping(entries) => entries.is_empty(),
            Document::Sequence(items) => items.is_empty(),
            Document::Scalar(Scalar::Null) => true,
            Document::Scalar(Scalar::String(s)) => s.is_empty(),
            Document::Scalar(_) => false,
        }
    }

    pub fn from_json_str(s: &str) -> serde_json::Result<Document> {
        let value: Value = serde_json::from_str(s)?;
        Ok(Document::from(value))
    }
}

impl From<Value> for Document {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Document::Scalar(Scalar::Null),
            Value::Bool(b) => Document::Scalar(Scalar::Bool(b)),
            Value::Number(n) => Document::Scalar(Scalar::Number(n)),
            Value::String(s) => Document::Scalar(Scalar::String(s)),
            Value::Array(items) => Document::Sequence(items.into_iter().map(Document::from).collect()),
            Value::Object(map) => {
                Document::Mapping(map.into_iter().map(|(k, v)| (k, Document::from(v))).collect())
            }
        }
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Document::Mapping(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Document::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Document::Scalar(s) => s.serialize(serializer),
        }
    }
}
