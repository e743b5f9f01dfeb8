// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use strsim::jaro_winkler;
use tracing::debug;

use crate::domain::models::record::{FetchOutcome, Record};
use crate::domain::sources::adapter::{
    classify_http_error, classify_status, FetchResult, SourceAdapter, SourceError,
};

const YAHOO_SEARCH_ENDPOINT: &str = "https://query2.finance.yahoo.com/v1/finance/search";
const YAHOO_CHART_ENDPOINT: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("invalid word regex"));

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    quotes: Vec<SearchQuote>,
}

#[derive(Debug, Deserialize)]
struct SearchQuote {
    symbol: Option<String>,
    #[serde(rename = "quoteType")]
    quote_type: Option<String>,
    shortname: Option<String>,
    longname: Option<String>,
    exchange: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
}

#[derive(Debug, Default, Deserialize)]
struct ChartMeta {
    currency: Option<String>,
    #[serde(rename = "exchangeName")]
    exchange_name: Option<String>,
    #[serde(rename = "regularMarketPrice")]
    regular_market_price: Option<f64>,
    #[serde(rename = "chartPreviousClose")]
    previous_close: Option<f64>,
    #[serde(rename = "regularMarketDayHigh")]
    day_high: Option<f64>,
    #[serde(rename = "regularMarketDayLow")]
    day_low: Option<f64>,
    #[serde(rename = "fiftyTwoWeekHigh")]
    fifty_two_week_high: Option<f64>,
    #[serde(rename = "fiftyTwoWeekLow")]
    fifty_two_week_low: Option<f64>,
    #[serde(rename = "regularMarketVolume")]
    volume: Option<u64>,
}

/// A market ticker resolved from a free-text company name.
#[derive(Debug, Clone)]
pub struct ResolvedTicker {
    pub ticker: String,
    pub name: String,
    pub exchange: String,
}

/// Financial-data adapter backed by Yahoo Finance.
///
/// A free-text company name is resolved to a ticker by word-overlap
/// matching against search results restricted to EQUITY instruments
/// (crypto, ETFs and funds are skipped). Private companies resolve to
/// nothing, which is a clean permanent failure rather than an error
/// worth retrying.
pub struct YahooFinance {
    client: reqwest::Client,
    search_endpoint: String,
    chart_endpoint: String,
}

impl YahooFinance {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_endpoints(client, YAHOO_SEARCH_ENDPOINT, YAHOO_CHART_ENDPOINT)
    }

    pub fn with_endpoints(
        client: reqwest::Client,
        search_endpoint: &str,
        chart_endpoint: &str,
    ) -> Self {
        Self {
            client,
            search_endpoint: search_endpoint.to_string(),
            chart_endpoint: chart_endpoint.to_string(),
        }
    }

    fn words(text: &str) -> HashSet<String> {
        WORD.find_iter(&text.to_lowercase())
            .map(|m| m.as_str().to_string())
            .collect()
    }

    /// Pick the best EQUITY match for a company name.
    ///
    /// At least one significant word must overlap; among candidates the
    /// highest (overlap count, name similarity) pair wins.
    fn resolve_from_quotes(company: &str, quotes: &[SearchQuote]) -> Option<ResolvedTicker> {
        let search_words = Self::words(company);
        let company_lower = company.to_lowercase();

        let mut best: Option<(usize, f64, ResolvedTicker)> = None;
        for quote in quotes {
            if quote.quote_type.as_deref() != Some("EQUITY") {
                continue;
            }
            let Some(symbol) = quote.symbol.as_deref() else {
                continue;
            };
            let name = quote
                .shortname
                .clone()
                .or_else(|| quote.longname.clone())
                .unwrap_or_default();

            let overlap = Self::words(&name).intersection(&search_words).count();
            if overlap == 0 {
                continue;
            }

            let similarity = jaro_winkler(&company_lower, &name.to_lowercase());
            let candidate = ResolvedTicker {
                ticker: symbol.to_string(),
                name,
                exchange: quote.exchange.clone().unwrap_or_default(),
            };

            let better = match &best {
                None => true,
                Some((o, s, _)) => overlap > *o || (overlap == *o && similarity > *s),
            };
            if better {
                best = Some((overlap, similarity, candidate));
            }
        }

        best.map(|(_, _, t)| t)
    }

    /// Resolve a company name to a ticker via the Yahoo search API.
    pub async fn resolve_ticker(
        &self,
        company: &str,
    ) -> Result<Option<ResolvedTicker>, SourceError> {
        let response = self
            .client
            .get(&self.search_endpoint)
            .query(&[
                ("q", company),
                ("quotesCount", "10"),
                ("newsCount", "0"),
                ("enableFuzzyQuery", "true"),
            ])
            .send()
            .await
            .map_err(|e| classify_http_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| SourceError::InvalidResponse(e.to_string()))?;

        Ok(Self::resolve_from_quotes(company, &parsed.quotes))
    }

    /// Fetch quote data for an already-known ticker.
    pub async fn fetch_by_ticker(&self, ticker: &str, resolved: Option<&ResolvedTicker>) -> FetchResult {
        let ticker = ticker.to_uppercase();
        let response = self
            .client
            .get(format!("{}/{}", self.chart_endpoint, ticker))
            .query(&[("interval", "1d"), ("range", "5d")])
            .send()
            .await
            .map_err(|e| classify_http_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        let parsed: ChartResponse = response
            .json()
            .await
            .map_err(|e| SourceError::InvalidResponse(e.to_string()))?;

        let meta = parsed
            .chart
            .result
            .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0).meta) })
            .ok_or_else(|| {
                SourceError::NotFound(format!("Ticker not found or no data available: {}", ticker))
            })?;

        if meta.regular_market_price.is_none() {
            return Err(SourceError::NotFound(format!(
                "Ticker not found or no data available: {}",
                ticker
            )));
        }

        let name = resolved
            .map(|r| r.name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| ticker.clone());
        let exchange = resolved
            .map(|r| r.exchange.clone())
            .filter(|e| !e.is_empty())
            .or(meta.exchange_name.clone());

        let snippet = match (meta.regular_market_price, meta.currency.as_deref()) {
            (Some(price), Some(currency)) => {
                format!("{} trading at {:.2} {}", name, price, currency)
            }
            (Some(price), None) => format!("{} trading at {:.2}", name, price),
            _ => format!("Quote data for {}", name),
        };

        let record = Record::new(
            format!("{} ({})", name, ticker),
            format!("https://finance.yahoo.com/quote/{}", ticker),
            snippet,
            "yahoo_finance",
        )
        .with_data(json!({
            "ticker": ticker,
            "name": name,
            "exchange": exchange,
            "currency": meta.currency,
            "current_price": meta.regular_market_price,
            "previous_close": meta.previous_close,
            "day_high": meta.day_high,
            "day_low": meta.day_low,
            "52_week_high": meta.fifty_two_week_high,
            "52_week_low": meta.fifty_two_week_low,
            "volume": meta.volume,
        }));

        Ok(FetchOutcome::Hits(vec![record]))
    }
}

#[async_trait]
impl SourceAdapter for YahooFinance {
    async fn fetch(&self, query: &str, _limit: usize) -> FetchResult {
        let resolved = self.resolve_ticker(query).await?.ok_or_else(|| {
            SourceError::NotFound(format!(
                "No ticker found for '{}' - company may be private or not publicly traded",
                query
            ))
        })?;

        debug!(
            ticker = %resolved.ticker,
            name = %resolved.name,
            "Resolved company to ticker"
        );
        let ticker = resolved.ticker.clone();
        self.fetch_by_ticker(&ticker, Some(&resolved)).await
    }

    fn name(&self) -> &'static str {
        "financials"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn quote(symbol: &str, quote_type: &str, name: &str) -> SearchQuote {
        SearchQuote {
            symbol: Some(symbol.to_string()),
            quote_type: Some(quote_type.to_string()),
            shortname: Some(name.to_string()),
            longname: None,
            exchange: Some("NMS".to_string()),
        }
    }

    #[test]
    fn test_resolve_skips_non_equity() {
        let quotes = vec![
            quote("MSFT-USD", "CRYPTOCURRENCY", "Microsoft Token"),
            quote("MSFX", "ETF", "Microsoft Sector ETF"),
            quote("MSFT", "EQUITY", "Microsoft Corporation"),
        ];

        let resolved = YahooFinance::resolve_from_quotes("Microsoft", &quotes).unwrap();
        assert_eq!(resolved.ticker, "MSFT");
    }

    #[test]
    fn test_resolve_requires_word_overlap() {
        let quotes = vec![quote("KO", "EQUITY", "Coca-Cola Company")];
        assert!(YahooFinance::resolve_from_quotes("Basement Startup Labs", &quotes).is_none());
    }

    #[test]
    fn test_resolve_prefers_closer_name() {
        let quotes = vec![
            quote("APLE", "EQUITY", "Apple Hospitality REIT"),
            quote("AAPL", "EQUITY", "Apple Inc."),
        ];
        let resolved = YahooFinance::resolve_from_quotes("Apple Inc", &quotes).unwrap();
        assert_eq!(resolved.ticker, "AAPL");
    }

    #[tokio::test]
    async fn test_fetch_resolves_and_quotes() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/finance/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "quotes": [
                    {"symbol": "MSFT", "quoteType": "EQUITY", "shortname": "Microsoft Corporation", "exchange": "NMS"}
                ]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/MSFT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "chart": {"result": [{"meta": {
                    "currency": "USD",
                    "exchangeName": "NasdaqGS",
                    "regularMarketPrice": 415.3,
                    "chartPreviousClose": 410.1,
                    "fiftyTwoWeekHigh": 450.0,
                    "fiftyTwoWeekLow": 309.4
                }}]}
            })))
            .mount(&server)
            .await;

        let adapter = YahooFinance::with_endpoints(
            reqwest::Client::new(),
            &format!("{}/v1/finance/search", server.uri()),
            &format!("{}/v8/finance/chart", server.uri()),
        );

        let outcome = adapter.fetch("Microsoft", 10).await.unwrap();
        let records = outcome.into_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Microsoft Corporation (MSFT)");

        let data = records[0].data.as_ref().unwrap();
        assert_eq!(data["ticker"], "MSFT");
        assert_eq!(data["current_price"], 415.3);
    }

    #[tokio::test]
    async fn test_private_company_fails_cleanly_without_quote_fetch() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/finance/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "quotes": []
            })))
            .mount(&server)
            .await;

        // 行情端点不应被触达
        Mock::given(method("GET"))
            .and(path_regex(r"^/v8/finance/chart/.*$"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let adapter = YahooFinance::with_endpoints(
            reqwest::Client::new(),
            &format!("{}/v1/finance/search", server.uri()),
            &format!("{}/v8/finance/chart", server.uri()),
        );

        let err = adapter.fetch("Basement Startup Labs", 10).await.unwrap_err();
        assert!(matches!(err, SourceError::NotFound(_)));
        assert!(!err.is_retryable());
    }
}
