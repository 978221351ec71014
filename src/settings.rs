use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::catalog::ProductKind;
use crate::extract::ComponentDescriptor;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.5 Safari/605.1.15";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub db_path: PathBuf,
    pub export_path: PathBuf,
    pub targets_path: PathBuf,
    pub block_id: String,
    pub delay_ms: u64,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub catalog_path: PathBuf,
    pub catalog_export_path: PathBuf,
    pub catalog_api_url: String,
    pub catalog_origin: String,
    pub catalog_delay_ms: u64,
}

impl Settings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn catalog_delay(&self) -> Duration {
        Duration::from_millis(self.catalog_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Defaults, then `harvest.toml` (or `--config FILE`), then `HARVEST_*` env vars.
pub fn load(path: Option<&Path>) -> Result<Settings> {
    let file = match path {
        Some(p) => File::from(p).required(true),
        None => File::with_name("harvest").required(false),
    };
    let settings = Config::builder()
        .set_default("db_path", "data/harvest.sqlite")?
        .set_default("export_path", "extracted_data.json")?
        .set_default("targets_path", "targets.json")?
        .set_default("block_id", crate::embedded::DEFAULT_BLOCK_ID)?
        .set_default("delay_ms", 2000i64)?
        .set_default("timeout_secs", 30i64)?
        .set_default("user_agent", DEFAULT_USER_AGENT)?
        .set_default("catalog_path", "catalog.json")?
        .set_default("catalog_export_path", "cards_structured.json")?
        .set_default("catalog_api_url", "https://public.sravni.ru/v2/vitrins/product/byId")?
        .set_default("catalog_origin", "https://www.sravni.ru")?
        .set_default("catalog_delay_ms", 1000i64)?
        .add_source(file)
        .add_source(Environment::with_prefix("HARVEST"))
        .build()
        .context("Failed to load settings")?;
    Ok(settings.try_deserialize()?)
}

/// One page to harvest: where it lives, what it is, and which component holds the copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub url: String,
    pub service_type: String,
    pub component: ComponentDescriptor,
}

pub fn load_targets(path: &Path) -> Result<Vec<TargetSpec>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read targets file {}", path.display()))?;
    parse_targets(&raw).with_context(|| format!("Invalid targets file {}", path.display()))
}

fn parse_targets(raw: &str) -> Result<Vec<TargetSpec>> {
    Ok(serde_json::from_str(raw)?)
}

/// A listing page of an aggregator catalog. `kind` falls back to a guess
/// from the service label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSource {
    pub url: String,
    pub service_type: String,
    #[serde(default)]
    pub kind: Option<ProductKind>,
}

impl CatalogSource {
    pub fn kind(&self) -> ProductKind {
        self.kind
            .unwrap_or_else(|| ProductKind::from_service_type(&self.service_type))
    }
}

pub fn load_catalog_sources(path: &Path) -> Result<Vec<CatalogSource>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid catalog file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let s = load(None).unwrap();
        assert_eq!(s.block_id, "app_state");
        assert_eq!(s.delay(), Duration::from_secs(2));
        assert_eq!(s.timeout(), Duration::from_secs(30));
        assert!(s.user_agent.contains("Safari"));
    }

    #[test]
    fn explicit_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "delay_ms = 50\nblock_id = \"state\"\n").unwrap();
        let s = load(Some(&path)).unwrap();
        assert_eq!(s.delay_ms, 50);
        assert_eq!(s.block_id, "state");
        assert_eq!(s.export_path, PathBuf::from("extracted_data.json"));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(load(Some(Path::new("does/not/exist.toml"))).is_err());
    }

    #[test]
    fn targets_keep_property_case() {
        let raw = r#"[
            {"url": "https://alfabank.ru/everyday/debit-cards/alfacard/",
             "service_type": "Дебетовая карта",
             "component": {"name": "ModalV2"}},
            {"url": "https://alfabank.ru/everyday/debit-cards/apelsin/",
             "service_type": "Дебетовая карта",
             "component": {"name": "Tabs.TabsPanelV2",
                           "properties": {"widthTabPanel": "fullBlock", "widthTab": "equal"}}}
        ]"#;
        let targets = parse_targets(raw).unwrap();
        assert_eq!(targets.len(), 2);
        assert!(targets[0].component.properties.is_none());
        assert_eq!(
            targets[1].component,
            ComponentDescriptor::named("Tabs.TabsPanelV2")
                .with_property("widthTabPanel", "fullBlock")
                .with_property("widthTab", "equal")
        );
    }

    #[test]
    fn shipped_targets_parse() {
        let targets = load_targets(Path::new("targets.json")).unwrap();
        assert!(!targets.is_empty());
    }

    #[test]
    fn catalog_kind_explicit_or_guessed() {
        let raw = r#"[
            {"url": "https://www.sravni.ru/karty/bank/t-bank/", "service_type": "Дебетовая карта",
             "kind": "credit-cards"},
            {"url": "https://www.sravni.ru/vklady/bank/t-bank/", "service_type": "Вклад"}
        ]"#;
        let sources: Vec<CatalogSource> = serde_json::from_str(raw).unwrap();
        assert_eq!(sources[0].kind(), ProductKind::CreditCards);
        assert_eq!(sources[1].kind(), ProductKind::Deposit);
    }

    #[test]
    fn shipped_catalog_parses() {
        let sources = load_catalog_sources(Path::new("catalog.json")).unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(load(None).unwrap().catalog_delay(), Duration::from_secs(1));
    }
}
