// src/eodhd/models.rs
use serde::Deserialize;
use std::collections::BTreeMap;

/// One entry of the provider's exchange list.
/// Example: GET /exchanges-list -> [{"Name":"NASDAQ","Code":"US",...}, ...]
#[derive(Debug, Deserialize)]
pub struct ExchangeInfo {
    #[serde(rename = "Code")]
    pub code: Option<String>,
    #[serde(rename = "Name")]
    pub name: Option<String>,
}

/// One entry of the provider's per-exchange symbol list.
/// Example: GET /exchange-symbol-list/US -> [{"Code":"AAPL","Type":"Common Stock",...}, ...]
#[derive(Debug, Deserialize)]
pub struct SymbolInfo {
    #[serde(rename = "Code")]
    pub code: Option<String>,
    #[serde(rename = "Type")]
    pub security_type: Option<String>,
}

impl SymbolInfo {
    /// The universe is restricted to listed common stock with a usable code.
    pub fn is_common_stock(&self) -> bool {
        self.security_type.as_deref() == Some("Common Stock")
            && self.code.as_deref().map_or(false, |c| !c.is_empty())
    }
}

/// Nested fundamentals payload for one ticker:
/// section name -> reporting date -> field name -> raw value.
/// Transient; consumed by the flattener immediately after the fetch.
#[derive(Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct RawReport(pub BTreeMap<String, BTreeMap<String, BTreeMap<String, serde_json::Value>>>);

impl RawReport {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
