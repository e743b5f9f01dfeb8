// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;

use crate::domain::models::record::{FetchOutcome, Record};
use crate::domain::sources::adapter::{
    classify_http_error, classify_status, FetchResult, SourceAdapter, SourceError,
};
use crate::utils::text::clean_text;

const WIKIPEDIA_ACTION_ENDPOINT: &str = "https://en.wikipedia.org/w/api.php";
const WIKIPEDIA_REST_ENDPOINT: &str = "https://en.wikipedia.org/api/rest_v1";

/// Article text carried into the stage artifact is bounded.
const CONTENT_MAX_CHARS: usize = 10_000;

static TAG_STRIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("invalid tag regex"));
static WIKI_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[([^\]|]+)\|?[^\]]*\]\]").expect("invalid wikilink regex"));
static WIKI_TEMPLATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{[^{}]*\}\}").expect("invalid template regex"));

/// Infobox keys with their wikitext synonyms.
static INFOBOX_KEYS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    let field = |names: &str| {
        Regex::new(&format!(r"(?im)^\s*\|\s*(?:{})\s*=\s*([^\n]+)", names)).expect("invalid infobox regex")
    };
    vec![
        ("founded", field("founded|foundation")),
        ("founder", field("founders?")),
        ("headquarters", field("headquarters|hq_location(?:_city)?|location")),
        ("industry", field("industry")),
        ("products", field("products?")),
        ("services", field("services?")),
        ("revenue", field("revenue")),
        ("employees", field("num_employees|employees")),
        ("website", field("website|homepage|url")),
        ("company_type", field("type")),
        ("ceo", field("ceo")),
        ("key_people", field("key_people")),
        ("birth_date", field("birth_date")),
        ("occupation", field("occupation")),
    ]
});

#[derive(Debug, Deserialize)]
struct ActionResponse {
    #[serde(default)]
    query: Option<ActionQuery>,
}

#[derive(Debug, Default, Deserialize)]
struct ActionQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
    #[serde(default)]
    pages: std::collections::HashMap<String, Page>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Page {
    extract: Option<String>,
    #[serde(rename = "fullurl")]
    full_url: Option<String>,
    #[serde(default)]
    missing: Option<serde_json::Value>,
    #[serde(default)]
    revisions: Vec<Revision>,
}

#[derive(Debug, Deserialize)]
struct Revision {
    #[serde(default)]
    slots: std::collections::HashMap<String, Slot>,
}

#[derive(Debug, Deserialize)]
struct Slot {
    #[serde(rename = "*")]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Summary {
    title: Option<String>,
    description: Option<String>,
    extract: Option<String>,
    #[serde(rename = "type")]
    page_type: Option<String>,
    content_urls: Option<ContentUrls>,
}

#[derive(Debug, Deserialize)]
struct ContentUrls {
    desktop: Option<DesktopUrls>,
}

#[derive(Debug, Deserialize)]
struct DesktopUrls {
    page: Option<String>,
}

/// Encyclopedia adapter over the Wikipedia APIs.
///
/// Finds the best-matching article, pulls its summary and plaintext
/// body, and best-effort parses the infobox key/value block out of the
/// raw wikitext. Infobox parsing is heuristic with bounded precision.
pub struct Wikipedia {
    client: reqwest::Client,
    action_endpoint: String,
    rest_endpoint: String,
}

impl Wikipedia {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_endpoints(client, WIKIPEDIA_ACTION_ENDPOINT, WIKIPEDIA_REST_ENDPOINT)
    }

    pub fn with_endpoints(
        client: reqwest::Client,
        action_endpoint: &str,
        rest_endpoint: &str,
    ) -> Self {
        Self {
            client,
            action_endpoint: action_endpoint.to_string(),
            rest_endpoint: rest_endpoint.to_string(),
        }
    }

    /// Strip wiki markup from an infobox value.
    fn clean_wikitext(value: &str) -> String {
        let value = WIKI_LINK.replace_all(value, "$1");
        let value = WIKI_TEMPLATE.replace_all(&value, "");
        let value = TAG_STRIP.replace_all(&value, "");
        clean_text(value.trim().trim_end_matches('|').trim())
    }

    /// Parse known infobox fields out of article wikitext.
    pub fn parse_infobox(wikitext: &str) -> serde_json::Map<String, serde_json::Value> {
        let mut infobox = serde_json::Map::new();

        for (key, pattern) in INFOBOX_KEYS.iter() {
            if let Some(caps) = pattern.captures(wikitext) {
                let value = Self::clean_wikitext(&caps[1]);
                if !value.is_empty() {
                    infobox.insert(key.to_string(), json!(value));
                }
            }
        }

        infobox
    }

    async fn action<T: serde::de::DeserializeOwned>(
        &self,
        params: &[(&str, &str)],
    ) -> Result<T, SourceError> {
        let response = self
            .client
            .get(&self.action_endpoint)
            .query(params)
            .query(&[("format", "json")])
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

    async fn search_title(&self, query: &str) -> Result<Option<String>, SourceError> {
        let parsed: ActionResponse = self
            .action(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", "3"),
            ])
            .await?;

        Ok(parsed
            .query
            .unwrap_or_default()
            .search
            .into_iter()
            .next()
            .and_then(|hit| hit.title))
    }

    async fn page_summary(&self, title: &str) -> Result<Summary, SourceError> {
        let response = self
            .client
            .get(format!(
                "{}/page/summary/{}",
                self.rest_endpoint,
                urlencoding::encode(title)
            ))
            .send()
            .await
            .map_err(|e| classify_http_error(&e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(format!("Page not found: {}", title)));
        }
        if !status.is_success() {
            return Err(classify_status(status));
        }

        response
            .json()
            .await
            .map_err(|e| SourceError::InvalidResponse(e.to_string()))
    }

    async fn page_content(&self, title: &str) -> Result<Option<Page>, SourceError> {
        let parsed: ActionResponse = self
            .action(&[
                ("action", "query"),
                ("titles", title),
                ("prop", "extracts|info"),
                ("explaintext", "1"),
                ("inprop", "url"),
            ])
            .await?;

        Ok(parsed
            .query
            .unwrap_or_default()
            .pages
            .into_values()
            .next()
            .filter(|p| p.missing.is_none()))
    }

    async fn page_wikitext(&self, title: &str) -> Result<Option<String>, SourceError> {
        let parsed: ActionResponse = self
            .action(&[
                ("action", "query"),
                ("titles", title),
                ("prop", "revisions"),
                ("rvprop", "content"),
                ("rvslots", "main"),
            ])
            .await?;

        Ok(parsed
            .query
            .unwrap_or_default()
            .pages
            .into_values()
            .next()
            .and_then(|p| p.revisions.into_iter().next())
            .and_then(|r| r.slots.into_values().next())
            .and_then(|s| s.content))
    }

    fn truncate(text: &str, max_chars: usize) -> String {
        text.chars().take(max_chars).collect()
    }
}

#[async_trait]
impl SourceAdapter for Wikipedia {
    async fn fetch(&self, query: &str, _limit: usize) -> FetchResult {
        let title = self.search_title(query).await?.ok_or_else(|| {
            SourceError::NotFound(format!("No Wikipedia article found for '{}'", query))
        })?;

        let summary = self.page_summary(&title).await?;
        let content = self.page_content(&title).await.unwrap_or_default();
        let infobox = match self.page_wikitext(&title).await {
            Ok(Some(wikitext)) => Self::parse_infobox(&wikitext),
            _ => serde_json::Map::new(),
        };

        let resolved_title = summary.title.unwrap_or(title);
        let url = summary
            .content_urls
            .and_then(|c| c.desktop)
            .and_then(|d| d.page)
            .or_else(|| content.as_ref().and_then(|p| p.full_url.clone()))
            .unwrap_or_default();
        let extract = summary.extract.unwrap_or_default();

        let record = Record::new(
            resolved_title.clone(),
            url,
            Self::truncate(&clean_text(&extract), 300),
            "wikipedia",
        )
        .with_data(json!({
            "title": resolved_title,
            "description": summary.description,
            "summary": extract,
            "page_type": summary.page_type,
            "full_content": content
                .and_then(|p| p.extract)
                .map(|c| Self::truncate(&c, CONTENT_MAX_CHARS)),
            "infobox": infobox,
        }));

        Ok(FetchOutcome::Hits(vec![record]))
    }

    fn name(&self) -> &'static str {
        "encyclopedia"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const WIKITEXT_SAMPLE: &str = r#"{{Infobox company
| name = OpenAI
| type = [[Privately held company|Private]]
| industry = [[Artificial intelligence]]
| founded = {{Start date and age|2015|12|11}} December 11, 2015
| founders = [[Sam Altman]], [[Elon Musk]]
| headquarters = [[San Francisco]], California, U.S.
| key_people = Sam Altman (CEO)
| num_employees = 3,500
| website = {{URL|openai.com}}
}}
'''OpenAI''' is an AI research organization."#;

    #[test]
    fn test_parse_infobox_known_keys() {
        let infobox = Wikipedia::parse_infobox(WIKITEXT_SAMPLE);

        assert_eq!(infobox["industry"], "Artificial intelligence");
        assert_eq!(infobox["headquarters"], "San Francisco, California, U.S.");
        assert_eq!(infobox["founder"], "Sam Altman, Elon Musk");
        assert_eq!(infobox["key_people"], "Sam Altman (CEO)");
        assert_eq!(infobox["employees"], "3,500");
        // 模板调用被剥掉，只留下纯文本部分
        assert_eq!(infobox["founded"], "December 11, 2015");
    }

    #[test]
    fn test_parse_infobox_empty_wikitext() {
        assert!(Wikipedia::parse_infobox("just prose, no infobox").is_empty());
    }

    #[test]
    fn test_clean_wikitext_unwraps_links() {
        assert_eq!(
            Wikipedia::clean_wikitext("[[Privately held company|Private]]"),
            "Privately held company"
        );
    }

    #[tokio::test]
    async fn test_fetch_not_found_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "query": {"search": []}
            })))
            .mount(&server)
            .await;

        let adapter = Wikipedia::with_endpoints(
            reqwest::Client::new(),
            &format!("{}/w/api.php", server.uri()),
            &format!("{}/api/rest_v1", server.uri()),
        );

        let err = adapter.fetch("zxqv nonexistent entity", 5).await.unwrap_err();
        assert!(matches!(err, SourceError::NotFound(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_fetch_builds_article_record() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("list", "search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "query": {"search": [{"title": "OpenAI", "snippet": "ai lab", "pageid": 1}]}
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/rest_v1/page/summary/OpenAI"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "title": "OpenAI",
                "description": "American AI organization",
                "extract": "OpenAI is an American AI research organization.",
                "type": "standard",
                "content_urls": {"desktop": {"page": "https://en.wikipedia.org/wiki/OpenAI"}}
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("prop", "extracts|info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "query": {"pages": {"1": {
                    "title": "OpenAI",
                    "extract": "OpenAI is an American AI research organization. Long body.",
                    "fullurl": "https://en.wikipedia.org/wiki/OpenAI"
                }}}
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("prop", "revisions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "query": {"pages": {"1": {
                    "title": "OpenAI",
                    "revisions": [{"slots": {"main": {"*": WIKITEXT_SAMPLE}}}]
                }}}
            })))
            .mount(&server)
            .await;

        let adapter = Wikipedia::with_endpoints(
            reqwest::Client::new(),
            &format!("{}/w/api.php", server.uri()),
            &format!("{}/api/rest_v1", server.uri()),
        );

        let outcome = adapter.fetch("OpenAI", 5).await.unwrap();
        let records = outcome.into_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "OpenAI");
        assert_eq!(records[0].url, "https://en.wikipedia.org/wiki/OpenAI");

        let data = records[0].data.as_ref().unwrap();
        assert_eq!(data["infobox"]["industry"], "Artificial intelligence");
        assert!(data["full_content"].as_str().unwrap().contains("Long body"));
    }
}
