use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::document::{Document, Scalar};

/// Flattened view of one product details response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardSummary {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "service_type")]
    pub service_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_alias: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<Document>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_system: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_class: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub benefits: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_from: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub demands: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smartphone: Option<Document>,
    #[serde(skip_serializing_if = "Maintenance::is_empty")]
    pub maintenance: Maintenance,
    #[serde(skip_serializing_if = "Cashback::is_empty")]
    pub cashback: Cashback,
    #[serde(skip_serializing_if = "Withdrawal::is_empty")]
    pub withdrawal: Withdrawal,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub conditions: Map<String, Value>,
}

#[derive(Debug, Default, Serialize)]
pub struct Maintenance {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Document>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<MaintenanceDetail>,
}

impl Maintenance {
    pub fn is_empty(&self) -> bool {
        self.price.is_none() && self.comment.is_none() && self.conditions.is_none() && self.details.is_empty()
    }
}

#[derive(Debug, Serialize)]
pub struct MaintenanceDetail {
    pub price: Document,
    #[serde(rename = "type")]
    pub kind: Document,
    pub frequency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Document>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cashback {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_value: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_value_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<CashbackCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_categories: Option<Document>,
}

impl Cashback {
    pub fn is_empty(&self) -> bool {
        self.value.is_none()
            && self.max_value.is_none()
            && self.comment.is_none()
            && self.description.is_none()
            && self.categories.is_empty()
            && self.all_categories.is_none()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CashbackCategory {
    pub categories: Document,
    pub value: Option<Document>,
    pub comment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_value: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_value_type: Option<String>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_from: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_to: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub places: Option<Document>,
}

impl Withdrawal {
    pub fn is_empty(&self) -> bool {
        self.rate_from.is_none() && self.rate_to.is_none() && self.comment.is_none() && self.places.is_none()
    }
}

/// Build a summary from a details response. The product sits under `item`
/// when the endpoint wraps it.
pub fn summarize(product_id: &str, service_type: &str, response: &Document) -> CardSummary {
    let item = response.get("item").unwrap_or(response);

    CardSummary {
        id: item
            .get("id")
            .and_then(Document::as_scalar)
            .and_then(|s| s.as_text())
            .unwrap_or_else(|| product_id.to_string()),
        name: text(item, "name"),
        service_type: service_type.to_string(),
        name_alias: present(item, "nameAlias"),
        link: present(item, "link"),
        description: text(item, "description").map(|d| clean_html(&d)).unwrap_or_default(),
        status: present(item, "status"),
        payment_system: present(item, "paymentSystem"),
        card_class: present(item, "cardCLass").or_else(|| present(item, "cardClass")),
        features: present(item, "feature"),
        benefits: present(item, "benefits"),
        age_from: present(item, "ageFrom"),
        demands: present(item, "demands"),
        currency: present(item, "currency"),
        smartphone: present(item, "smartphone"),
        maintenance: maintenance(item),
        cashback: cashback(item),
        withdrawal: withdrawal(item),
        conditions: conditions(item),
    }
}

fn maintenance(item: &Document) -> Maintenance {
    let mut out = Maintenance::default();
    if let Some(price) = value(item, "maintenancePrice") {
        out.price = Some(price.clone());
        out.currency = Some(text(item, "currencyMaintenance").unwrap_or_else(|| "RUB".into()));
        out.frequency = Some(text(item, "frequencyNew").unwrap_or_default());
    }
    out.comment = text(item, "maintenanceComment").map(|c| clean_html(&c)).filter(|c| !c.is_empty());
    out.conditions = present(item, "conditionsNew");
    out.details = entries(item, "maintenanceReleaseFeeTab")
        .filter_map(|tab| {
            let price = value(tab, "maintenancePrice")?.clone();
            Some(MaintenanceDetail {
                price,
                kind: present(tab, "maintenanceRelease").unwrap_or(Document::Sequence(Vec::new())),
                frequency: text(tab, "frequencyNew").unwrap_or_default(),
                conditions: present(tab, "conditionsNew"),
            })
        })
        .collect();
    out
}

fn cashback(item: &Document) -> Cashback {
    let mut out = Cashback {
        value: value(item, "cashbackValue").cloned(),
        comment: present(item, "cashbackComment"),
        description: text(item, "cashbackDescription").map(|d| clean_html(&d)).filter(|d| !d.is_empty()),
        all_categories: present(item, "cashbackCategories"),
        ..Cashback::default()
    };
    if let Some(max) = value(item, "cashbackMaxValue") {
        out.max_value = Some(max.clone());
        out.max_value_type = Some(text(item, "cashbackMaxValueType").unwrap_or_default());
    }
    out.categories = entries(item, "cashbackCategoriesTab")
        .map(|tab| {
            let max_value = value(tab, "cashbackMaxValue").cloned();
            CashbackCategory {
                categories: present(tab, "cashbackCategories").unwrap_or(Document::Sequence(Vec::new())),
                value: value(tab, "cashbackValue").cloned(),
                comment: text(tab, "cashbackComment").unwrap_or_default(),
                max_value_type: max_value
                    .as_ref()
                    .map(|_| text(tab, "cashbackMaxValueType").unwrap_or_default()),
                max_value,
            }
        })
        .collect();
    out
}

fn withdrawal(item: &Document) -> Withdrawal {
    Withdrawal {
        rate_from: value(item, "withdrawRateFrom").cloned(),
        rate_to: value(item, "withdrawRateTo").cloned(),
        comment: text(item, "withdrawComment").map(|c| clean_html(&c)).filter(|c| !c.is_empty()),
        places: present(item, "withdrawPlace"),
    }
}

fn conditions(item: &Document) -> Map<String, Value> {
    let Some(Document::Mapping(tabs)) = item.get("conditionsTab") else {
        return Map::new();
    };
    tabs.iter()
        .filter_map(|(id, tab)| {
            let cleaned = clean_html(&text(tab, "additionalConditions")?);
            (!cleaned.is_empty()).then(|| (id.clone(), Value::String(cleaned)))
        })
        .collect()
}

/// Strip tags and collapse whitespace.
pub fn clean_html(s: &str) -> String {
    static TAG: OnceLock<Regex> = OnceLock::new();
    static SPACE: OnceLock<Regex> = OnceLock::new();
    let tag = TAG.get_or_init(|| Regex::new(r"<[^>]+>").unwrap());
    let space = SPACE.get_or_init(|| Regex::new(r"\s+").unwrap());
    let stripped = tag.replace_all(s, " ");
    space.replace_all(&stripped, " ").trim().to_string()
}

// Field that is present and not null.
fn value<'a>(node: &'a Document, key: &str) -> Option<&'a Document> {
    node.get(key).filter(|v| !matches!(v, Document::Scalar(Scalar::Null)))
}

// Field that is present and not blank.
fn present(node: &Document, key: &str) -> Option<Document> {
    node.get(key).filter(|v| !v.is_blank()).cloned()
}

// Non-empty scalar field rendered as text.
fn text(node: &Document, key: &str) -> Option<String> {
    node.get(key)
        .and_then(Document::as_scalar)
        .and_then(|s| s.as_text())
        .filter(|t| !t.is_empty())
}

// Values of a mapping-of-tabs field, in document order.
fn entries<'a>(node: &'a Document, key: &str) -> impl Iterator<Item = &'a Document> {
    let tabs: &[(String, Document)] = match node.get(key) {
        Some(Document::Mapping(tabs)) => tabs.as_slice(),
        _ => &[],
    };
    tabs.iter().map(|(_, v)| v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details() -> Document {
        Document::from_json_str(&std::fs::read_to_string("tests/fixtures/product_details.json").unwrap()).unwrap()
    }

    #[test]
    fn clean_html_strips_tags() {
        assert_eq!(clean_html("<p>Бесплатно<br/>навсегда</p>\n\n"), "Бесплатно навсегда");
        assert_eq!(clean_html("  plain   text "), "plain text");
        assert_eq!(clean_html(""), "");
    }

    #[test]
    fn fixture_summary() {
        let card = summarize("5f2a9c", "Дебетовая карта", &details());
        assert_eq!(card.id, "5f2a9c");
        assert_eq!(card.name.as_deref(), Some("Black"));
        assert_eq!(card.description, "Кешбэк рублями каждый месяц");
        assert!(card.status.is_none());

        assert_eq!(card.maintenance.price, Some(Document::Scalar(0i64.into())));
        assert_eq!(card.maintenance.currency.as_deref(), Some("RUB"));
        assert_eq!(card.maintenance.comment.as_deref(), Some("При покупках от 10 000 ₽ в месяц"));
        assert_eq!(card.maintenance.details.len(), 1);
        assert_eq!(card.maintenance.details[0].frequency, "month");

        assert_eq!(card.cashback.max_value_type.as_deref(), Some("rub"));
        assert_eq!(card.cashback.categories.len(), 2);
        assert_eq!(card.cashback.categories[1].comment, "");
        assert!(card.cashback.categories[1].max_value.is_none());

        assert_eq!(card.withdrawal.comment.as_deref(), Some("До 500 000 ₽ без комиссии"));
        assert_eq!(card.conditions.len(), 1);
        assert_eq!(card.conditions["age"], "С 14 лет");
    }

    #[test]
    fn blank_fields_are_dropped_from_json() {
        let value = serde_json::to_value(summarize("5f2a9c", "Дебетовая карта", &details())).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        assert!(keys.contains(&"paymentSystem"));
        assert!(keys.contains(&"service_type"));
        assert!(!keys.contains(&"status"));
        assert!(!keys.contains(&"smartphone"));
        assert!(!keys.contains(&"demands"));
        assert_eq!(value["cashback"]["categories"][1]["value"], Value::Null);
    }

    #[test]
    fn unwrapped_response_and_fallback_id() {
        let d = Document::from_json_str(r#"{"name":"Bare"}"#).unwrap();
        let card = summarize("77", "Кредитная карта", &d);
        assert_eq!(card.id, "77");
        assert!(card.maintenance.is_empty());
        assert!(card.cashback.is_empty());
        assert!(card.withdrawal.is_empty());
        let value = serde_json::to_value(&card).unwrap();
        assert_eq!(value.as_object().unwrap().len(), 3);
    }
}
