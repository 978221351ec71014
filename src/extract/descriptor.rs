use std::collections::BTreeMap;
use std::fmt;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::document::Scalar;

/// Which component to pull out of a page: a `name` plus an optional
/// exact-match filter on the node's `properties`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, Scalar>>,
}

impl ComponentDescriptor {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: None,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.properties
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Build from CLI input: `--prop widthTab=equal`. Values that parse as
    /// JSON scalars (`true`, `3`, `null`) keep their type; anything else is a string.
    pub fn from_cli(name: &str, props: &[String]) -> Result<Self> {
        let mut descriptor = Self::named(name);
        for prop in props {
            let Some((key, raw)) = prop.split_once('=') else {
                bail!("Invalid property filter '{}', expected key=value", prop);
            };
            let key = key.trim();
            if key.is_empty() {
                bail!("Invalid property filter '{}', empty key", prop);
            }
            let value = serde_json::from_str::<Scalar>(raw.trim())
                .unwrap_or_else(|_| Scalar::String(raw.trim().to_string()));
            descriptor = descriptor.with_property(key, value);
        }
        Ok(descriptor)
    }
}

impl fmt::Display for ComponentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(props) = &self.properties {
            let parts: Vec<String> = props.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            write!(f, " {{{}}}", parts.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_props() {
        let d = ComponentDescriptor::from_cli(
            "Tabs.TabsPanelV2",
            &["widthTab=equal".into(), "count=3".into(), "wide=true".into()],
        )
        .unwrap();
        let props = d.properties.as_ref().unwrap();
        assert_eq!(props["widthTab"], Scalar::from("equal"));
        assert_eq!(props["count"], Scalar::from(3i64));
        assert_eq!(props["wide"], Scalar::Bool(true));
    }

    #[test]
    fn cli_rejects_bare_key() {
        assert!(ComponentDescriptor::from_cli("X", &["widthTab".into()]).is_err());
        assert!(ComponentDescriptor::from_cli("X", &["=equal".into()]).is_err());
    }

    #[test]
    fn display() {
        assert_eq!(ComponentDescriptor::named("ModalV2").to_string(), "ModalV2");
        let d = ComponentDescriptor::named("Tabs.TabsPanelV2")
            .with_property("widthTabPanel", "fullBlock")
            .with_property("widthTab", "equal");
        assert_eq!(
            d.to_string(),
            r#"Tabs.TabsPanelV2 {widthTab="equal", widthTabPanel="fullBlock"}"#
        );
    }

    #[test]
    fn json_round_shape() {
        let d: ComponentDescriptor =
            serde_json::from_str(r#"{"name":"Tabs.TabsPanelV2","properties":{"widthTab":"equal"}}"#).unwrap();
        assert_eq!(d, ComponentDescriptor::named("Tabs.TabsPanelV2").with_property("widthTab", "equal"));
        let bare: ComponentDescriptor = serde_json::from_str(r#"{"name":"ModalV2"}"#).unwrap();
        assert!(bare.properties.is_none());
        assert_eq!(serde_json::to_string(&bare).unwrap(), r#"{"name":"ModalV2"}"#);
    }
}
