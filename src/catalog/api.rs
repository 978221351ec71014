use reqwest::header::{ACCEPT, ORIGIN, REFERER};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::fetcher::{check_status, FetchError};

/// Product family the details endpoint is queried with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProductKind {
    DebitCards,
    CreditCards,
    Mortgage,
    Deposit,
}

impl ProductKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProductKind::DebitCards => "debit-cards",
            ProductKind::CreditCards => "credit-cards",
            ProductKind::Mortgage => "mortgage",
            ProductKind::Deposit => "deposit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "debit-cards" => Some(ProductKind::DebitCards),
            "credit-cards" => Some(ProductKind::CreditCards),
            "mortgage" => Some(ProductKind::Mortgage),
            "deposit" => Some(ProductKind::Deposit),
            _ => None,
        }
    }

    /// Guess from a free-text service label. Debit cards when nothing matches.
    pub fn from_service_type(service_type: &str) -> Self {
        let label = service_type.to_lowercase();
        if label.contains("кредит") {
            ProductKind::CreditCards
        } else if label.contains("ипотек") {
            ProductKind::Mortgage
        } else if label.contains("вклад") || label.contains("депозит") {
            ProductKind::Deposit
        } else {
            ProductKind::DebitCards
        }
    }
}

/// Ask the product endpoint for one product. Returns the body as received,
/// once it is known to be JSON.
pub async fn fetch_product(
    client: &Client,
    api_url: &str,
    origin: &str,
    kind: ProductKind,
    product_id: &str,
) -> Result<String, FetchError> {
    let response = client
        .post(api_url)
        .header(ACCEPT, "application/json, text/plain, */*")
        .header(ORIGIN, origin)
        .header(REFERER, format!("{}/", origin.trim_end_matches('/')))
        .json(&json!({ "productName": kind.as_str(), "id": product_id }))
        .send()
        .await?;
    check_status(response.status())?;
    let body = response.text().await?;
    serde_json::from_str::<serde_json::Value>(&body)?;
    Ok(body)
}
