// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::domain::models::record::{FetchOutcome, Record};
use crate::domain::sources::adapter::{
    classify_http_error, classify_status, FetchResult, SourceAdapter, SourceError,
};

const SEC_DATA_ENDPOINT: &str = "https://data.sec.gov";
const SEC_WWW_ENDPOINT: &str = "https://www.sec.gov";

/// Filing forms worth surfacing in a dossier.
const IMPORTANT_FORMS: [&str; 6] = ["10-K", "10-Q", "8-K", "DEF 14A", "S-1", "424B"];

/// XBRL concepts extracted from company facts.
const KEY_METRICS: [&str; 9] = [
    "Revenues",
    "RevenueFromContractWithCustomerExcludingAssessedTax",
    "NetIncomeLoss",
    "EarningsPerShareBasic",
    "Assets",
    "Liabilities",
    "StockholdersEquity",
    "CashAndCashEquivalentsAtCarryingValue",
    "CommonStockSharesOutstanding",
];

static ATOM_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<entry>(.*?)</entry>").expect("invalid entry regex"));
static ATOM_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<title>([^<]+)</title>").expect("invalid title regex"));
static ATOM_CIK: Lazy<Regex> = Lazy::new(|| Regex::new(r"CIK=(\d+)").expect("invalid cik regex"));
static NAME_BEFORE_CIK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(.+?)\s*\(CIK").expect("invalid name regex"));

#[derive(Debug, Deserialize)]
struct TickerMapEntry {
    cik_str: Option<u64>,
    ticker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Submissions {
    name: Option<String>,
    #[serde(default)]
    tickers: Vec<String>,
    #[serde(default)]
    exchanges: Vec<String>,
    #[serde(rename = "sicDescription")]
    sic_description: Option<String>,
    #[serde(rename = "stateOfIncorporation")]
    state_of_incorporation: Option<String>,
    #[serde(rename = "fiscalYearEnd")]
    fiscal_year_end: Option<String>,
    filings: Option<Filings>,
}

#[derive(Debug, Default, Deserialize)]
struct Filings {
    recent: Option<RecentFilings>,
}

#[derive(Debug, Default, Deserialize)]
struct RecentFilings {
    #[serde(default)]
    form: Vec<String>,
    #[serde(rename = "filingDate", default)]
    filing_date: Vec<String>,
    #[serde(rename = "primaryDocument", default)]
    primary_document: Vec<String>,
    #[serde(rename = "accessionNumber", default)]
    accession_number: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FactsResponse {
    #[serde(default)]
    facts: HashMap<String, HashMap<String, FactConcept>>,
}

#[derive(Debug, Deserialize)]
struct FactConcept {
    #[serde(default)]
    units: HashMap<String, Vec<FactValue>>,
}

#[derive(Debug, Clone, Deserialize)]
struct FactValue {
    val: Option<serde_json::Value>,
    end: Option<String>,
    form: Option<String>,
}

/// Regulatory-filings adapter over SEC EDGAR.
///
/// An identifier (company name, ticker or CIK) is resolved to a CIK via
/// three strategies tried in order: direct digits, the ticker mapping
/// file, then the full-text company search. Only US filers resolve;
/// everything else is a permanent not-found.
pub struct SecEdgar {
    client: reqwest::Client,
    data_endpoint: String,
    www_endpoint: String,
    user_agent: String,
}

impl SecEdgar {
    pub fn new(client: reqwest::Client, user_agent: String) -> Self {
        Self::with_endpoints(client, SEC_DATA_ENDPOINT, SEC_WWW_ENDPOINT, user_agent)
    }

    pub fn with_endpoints(
        client: reqwest::Client,
        data_endpoint: &str,
        www_endpoint: &str,
        user_agent: String,
    ) -> Self {
        Self {
            client,
            data_endpoint: data_endpoint.to_string(),
            www_endpoint: www_endpoint.to_string(),
            user_agent,
        }
    }

    fn pad_cik(cik: &str) -> String {
        format!("{:0>10}", cik)
    }

    /// Parse the browse-edgar Atom response with the same pattern pass
    /// the rest of the scrapers use; the payload is tiny and rigid.
    fn parse_company_search(body: &str) -> Vec<(String, String)> {
        let mut results = Vec::new();
        for entry in ATOM_ENTRY.captures_iter(body).take(5) {
            let entry_body = &entry[1];
            let Some(title) = ATOM_TITLE.captures(entry_body).map(|c| c[1].to_string()) else {
                continue;
            };
            let Some(cik) = ATOM_CIK.captures(entry_body).map(|c| c[1].to_string()) else {
                continue;
            };
            let name = NAME_BEFORE_CIK
                .captures(&title)
                .map(|c| c[1].trim().to_string())
                .unwrap_or(title);
            results.push((name, cik));
        }
        results
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String) -> Result<T, SourceError> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| classify_http_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        response
            .json()
            .await
            .map_err(|e| SourceError::InvalidResponse(e.to_string()))
    }

    /// Strategy 2: the ticker-to-CIK mapping file.
    async fn cik_from_ticker(&self, ticker: &str) -> Result<Option<String>, SourceError> {
        let map: HashMap<String, TickerMapEntry> = self
            .get_json(format!("{}/files/company_tickers.json", self.www_endpoint))
            .await?;

        let upper = ticker.to_uppercase();
        Ok(map.values().find_map(|entry| {
            if entry.ticker.as_deref() == Some(upper.as_str()) {
                entry.cik_str.map(|c| c.to_string())
            } else {
                None
            }
        }))
    }

    /// Strategy 3: company-name search.
    async fn cik_from_name(&self, company: &str) -> Result<Option<String>, SourceError> {
        let response = self
            .client
            .get(format!("{}/cgi-bin/browse-edgar", self.www_endpoint))
            .header("User-Agent", &self.user_agent)
            .query(&[
                ("action", "getcompany"),
                ("company", company),
                ("count", "10"),
                ("output", "atom"),
            ])
            .send()
            .await
            .map_err(|e| classify_http_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        let body = response.text().await.map_err(|e| classify_http_error(&e))?;
        Ok(Self::parse_company_search(&body).into_iter().next().map(|(_, cik)| cik))
    }

    /// Resolve an identifier to a CIK: direct digits, then ticker
    /// lookup for short symbols, then name search.
    pub async fn resolve_cik(&self, query: &str) -> Result<Option<String>, SourceError> {
        let stripped = query.trim().trim_start_matches("CIK").trim();
        if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
            return Ok(Some(stripped.to_string()));
        }

        // Short single tokens may be tickers; the map lookup is cheap
        if !query.contains(' ') && query.len() <= 6 {
            if let Some(cik) = self.cik_from_ticker(query).await? {
                return Ok(Some(cik));
            }
        }

        self.cik_from_name(query).await
    }

    /// Keep only the most recent annual (10-K) value per metric.
    fn latest_annual_facts(facts: &FactsResponse) -> serde_json::Map<String, serde_json::Value> {
        let mut out = serde_json::Map::new();
        let Some(us_gaap) = facts.facts.get("us-gaap") else {
            return out;
        };

        for metric in KEY_METRICS {
            let Some(concept) = us_gaap.get(metric) else {
                continue;
            };
            let values = concept
                .units
                .get("USD")
                .or_else(|| concept.units.get("shares"));
            let Some(values) = values else { continue };

            let latest = values
                .iter()
                .filter(|v| v.form.as_deref() == Some("10-K"))
                .max_by(|a, b| a.end.cmp(&b.end));

            if let Some(v) = latest {
                out.insert(
                    metric.to_string(),
                    json!({
                        "value": v.val,
                        "end_date": v.end,
                        "form": v.form,
                    }),
                );
            }
        }

        out
    }

    fn collect_filings(submissions: &Submissions) -> Vec<serde_json::Value> {
        let Some(recent) = submissions.filings.as_ref().and_then(|f| f.recent.as_ref()) else {
            return Vec::new();
        };

        let mut filings = Vec::new();
        for i in 0..recent.form.len().min(20) {
            let form = recent.form.get(i).cloned().unwrap_or_default();
            if !IMPORTANT_FORMS.iter().any(|f| form.contains(f)) {
                continue;
            }
            filings.push(json!({
                "form": form,
                "date": recent.filing_date.get(i).cloned().unwrap_or_default(),
                "document": recent.primary_document.get(i).cloned().unwrap_or_default(),
                "accession": recent.accession_number.get(i).cloned().unwrap_or_default(),
            }));
            if filings.len() >= 10 {
                break;
            }
        }
        filings
    }
}

#[async_trait]
impl SourceAdapter for SecEdgar {
    async fn fetch(&self, query: &str, _limit: usize) -> FetchResult {
        let cik = self.resolve_cik(query).await?.ok_or_else(|| {
            SourceError::NotFound(format!("Company not found in SEC database: {}", query))
        })?;
        let cik_padded = Self::pad_cik(&cik);
        debug!(cik = %cik_padded, "Resolved SEC registrant");

        let submissions: Submissions = self
            .get_json(format!(
                "{}/submissions/CIK{}.json",
                self.data_endpoint, cik_padded
            ))
            .await?;

        // Courtesy delay between the two data.sec.gov calls
        tokio::time::sleep(Duration::from_millis(500)).await;

        let facts = self
            .get_json::<FactsResponse>(format!(
                "{}/api/xbrl/companyfacts/CIK{}.json",
                self.data_endpoint, cik_padded
            ))
            .await
            .map(|f| Self::latest_annual_facts(&f))
            .unwrap_or_default();

        let name = submissions.name.clone().unwrap_or_else(|| query.to_string());
        let filings = Self::collect_filings(&submissions);
        let snippet = match submissions.sic_description.as_deref() {
            Some(sic) if !sic.is_empty() => format!("{} - {}", name, sic),
            _ => format!("SEC filings for {}", name),
        };

        let record = Record::new(
            format!("{} - SEC EDGAR", name),
            format!(
                "{}/cgi-bin/browse-edgar?action=getcompany&CIK={}",
                self.www_endpoint, cik_padded
            ),
            snippet,
            "sec_edgar",
        )
        .with_data(json!({
            "cik": cik,
            "name": name,
            "tickers": submissions.tickers,
            "exchanges": submissions.exchanges,
            "sic_description": submissions.sic_description,
            "state": submissions.state_of_incorporation,
            "fiscal_year_end": submissions.fiscal_year_end,
            "recent_filings": filings,
            "financial_facts": facts,
        }));

        Ok(FetchOutcome::Hits(vec![record]))
    }

    fn name(&self) -> &'static str {
        "filings"
    }
}
