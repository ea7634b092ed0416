// src/eodhd/client.rs
use crate::eodhd::models::{ExchangeInfo, RawReport, SymbolInfo};
use crate::eodhd::rate::RateGate;
use crate::utils::error::ProviderError;
use std::time::Duration;

/// Report sections requested from the fundamentals endpoint, yearly granularity only.
const FUNDAMENTALS_FILTER: &str =
    "Financials::Balance_Sheet::yearly,Financials::Income_Statement::yearly,Financials::Cash_Flow::yearly";

/// Client for the EODHD REST API.
///
/// All three queries authenticate with the same static token. Fundamentals
/// fetches additionally pass through a shared [`RateGate`] so the provider is
/// never queried faster than the configured interval.
pub struct EodhdClient {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
    rate_gate: RateGate,
}

impl EodhdClient {
    /// Builds a client with a bounded per-request timeout. The timeout is
    /// deliberately separate from the rate-limit interval: an unresponsive
    /// provider must fail the fetch, not stall the run.
    pub fn new(
        base_url: &str,
        api_token: &str,
        fetch_timeout: Duration,
        rate_interval: Duration,
    ) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
            rate_gate: RateGate::new(rate_interval),
        })
    }

    /// Lists all exchange codes known to the provider.
    /// Any failure here is fatal to the run: without exchanges there is no work.
    pub async fn list_exchanges(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/exchanges-list", self.base_url);
        tracing::info!("Fetching exchange list from {}", url);

        let response = self
            .http
            .get(&url)
            .query(&[("api_token", self.api_token.as_str()), ("fmt", "json")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!("HTTP error status {} listing exchanges", status);
            return Err(ProviderError::Http(status));
        }

        let exchanges: Vec<ExchangeInfo> = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        // Entries without a code are unusable as a symbol-list parameter.
        Ok(exchanges.into_iter().filter_map(|ex| ex.code).collect())
    }

    /// Lists common-stock tickers for one exchange as `<symbol>.<exchange>`.
    ///
    /// Fail-soft policy: a single exchange being unavailable must not abort
    /// the whole run, so every error degrades to an empty list with a warning.
    pub async fn list_symbols(&self, exchange: &str) -> Vec<String> {
        match self.try_list_symbols(exchange).await {
            Ok(tickers) => tickers,
            Err(e) => {
                tracing::warn!("Failed to fetch symbols from {}: {}", exchange, e);
                Vec::new()
            }
        }
    }

    async fn try_list_symbols(&self, exchange: &str) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/exchange-symbol-list/{}", self.base_url, exchange);

        let response = self
            .http
            .get(&url)
            .query(&[
                ("api_token", self.api_token.as_str()),
                ("fmt", "json"),
                ("delisted", "0"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Http(status));
        }

        let symbols: Vec<SymbolInfo> = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(symbols
            .into_iter()
            .filter(SymbolInfo::is_common_stock)
            .filter_map(|s| s.code.map(|code| format!("{}.{}", code, exchange)))
            .collect())
    }

    /// Fetches yearly balance sheet, income statement and cash flow for one
    /// ticker in a single call.
    ///
    /// A non-success status yields an empty report ("nothing to process");
    /// only a transport fault or a malformed success body is an error, which
    /// the engine classifies as a per-ticker failure.
    pub async fn fetch_fundamentals(&self, ticker: &str) -> Result<RawReport, ProviderError> {
        self.rate_gate.wait().await;

        let url = format!("{}/fundamentals/{}", self.base_url, ticker);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("filter", FUNDAMENTALS_FILTER),
                ("api_token", self.api_token.as_str()),
                ("fmt", "json"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!("Fundamentals for {} returned {}, treating as empty", ticker, status);
            return Ok(RawReport::default());
        }

        let report: RawReport = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        tracing::debug!("Fetched {} report sections for {}", report.0.len(), ticker);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn test_client(base_url: &str) -> EodhdClient {
        EodhdClient::new(base_url, "test-token", Duration::from_secs(5), Duration::ZERO)
            .unwrap()
    }

    #[tokio::test]
    async fn list_exchanges_keeps_only_entries_with_a_code() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/exchanges-list")
            .match_query(Matcher::Any)
            .with_body(r#"[{"Code":"US","Name":"NASDAQ"},{"Name":"no code"},{"Code":"LSE"}]"#)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let exchanges = client.list_exchanges().await.unwrap();
        assert_eq!(exchanges, vec!["US", "LSE"]);
    }

    #[tokio::test]
    async fn list_exchanges_failure_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/exchanges-list")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let client = test_client(&server.url());
        assert!(matches!(
            client.list_exchanges().await,
            Err(ProviderError::Http(_))
        ));
    }

    #[tokio::test]
    async fn list_symbols_filters_to_common_stock_and_qualifies_tickers() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/exchange-symbol-list/US")
            .match_query(Matcher::Any)
            .with_body(
                r#"[{"Code":"AAPL","Type":"Common Stock"},
                    {"Code":"SPY","Type":"ETF"},
                    {"Code":"","Type":"Common Stock"},
                    {"Type":"Common Stock"},
                    {"Code":"MSFT","Type":"Common Stock"}]"#,
            )
            .create_async()
            .await;

        let client = test_client(&server.url());
        let tickers = client.list_symbols("US").await;
        assert_eq!(tickers, vec!["AAPL.US", "MSFT.US"]);
    }

    #[tokio::test]
    async fn list_symbols_degrades_to_empty_on_server_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/exchange-symbol-list/XFRA")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let client = test_client(&server.url());
        assert!(client.list_symbols("XFRA").await.is_empty());
    }

    #[tokio::test]
    async fn fetch_fundamentals_parses_nested_sections() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/fundamentals/AAPL.US")
            .match_query(Matcher::Any)
            .with_body(
                r#"{"Financials::Balance_Sheet::yearly":
                      {"2023-09-30":{"totalAssets":"352583000000"}}}"#,
            )
            .create_async()
            .await;

        let client = test_client(&server.url());
        let report = client.fetch_fundamentals("AAPL.US").await.unwrap();
        assert!(!report.is_empty());
        assert!(report.0.contains_key("Financials::Balance_Sheet::yearly"));
    }

    #[tokio::test]
    async fn fetch_fundamentals_treats_non_success_as_empty() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/fundamentals/GONE.US")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let report = client.fetch_fundamentals("GONE.US").await.unwrap();
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn fetch_fundamentals_malformed_body_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/fundamentals/BAD.US")
            .match_query(Matcher::Any)
            .with_body("not json at all")
            .create_async()
            .await;

        let client = test_client(&server.url());
        assert!(matches!(
            client.fetch_fundamentals("BAD.US").await,
            Err(ProviderError::Parse(_))
        ));
    }
}
