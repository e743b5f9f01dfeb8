// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::domain::models::record::{FetchOutcome, Record};
use crate::domain::sources::adapter::{
    classify_http_error, classify_status, FetchResult, SourceAdapter, SourceError,
};
use crate::utils::text::clean_text;

const BING_NEWS_ENDPOINT: &str = "https://www.bing.com/news/search";
const GOOGLE_NEWS_ENDPOINT: &str = "https://news.google.com/rss/search";
const NEWSAPI_ENDPOINT: &str = "https://newsapi.org/v2/everything";

/// Snippets are capped so one verbose feed cannot dominate artifacts.
const SNIPPET_MAX_CHARS: usize = 300;

static TAG_STRIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("invalid tag regex"));

#[derive(Debug, Deserialize)]
struct Rss {
    channel: RssChannel,
}

#[derive(Debug, Deserialize)]
struct RssChannel {
    #[serde(default, rename = "item")]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    source: Option<RssSource>,
}

#[derive(Debug, Deserialize)]
struct RssSource {
    #[serde(rename = "$text")]
    name: Option<String>,
}

/// Parse an RSS feed body into news records.
///
/// Descriptions arrive as HTML fragments (often CDATA-wrapped); tags are
/// stripped and the text truncated before it becomes a snippet.
fn parse_rss(body: &str, provenance: &str, limit: usize) -> Result<Vec<Record>, SourceError> {
    let rss: Rss = quick_xml::de::from_str(body)
        .map_err(|e| SourceError::InvalidResponse(format!("rss parse: {}", e)))?;

    let records = rss
        .channel
        .items
        .into_iter()
        .take(limit)
        .filter_map(|item| {
            let title = clean_text(item.title.as_deref().unwrap_or_default());
            let url = item.link.unwrap_or_default();
            if title.is_empty() || url.is_empty() {
                return None;
            }

            let snippet: String = clean_text(
                &TAG_STRIP.replace_all(item.description.as_deref().unwrap_or_default(), " "),
            )
            .chars()
            .take(SNIPPET_MAX_CHARS)
            .collect();

            Some(
                Record::new(title, url, snippet, provenance)
                    .with_published_at(item.pub_date)
                    .with_source(item.source.and_then(|s| s.name)),
            )
        })
        .collect();

    Ok(records)
}

async fn fetch_rss(
    client: &reqwest::Client,
    endpoint: &str,
    query_params: &[(&str, &str)],
    provenance: &str,
    limit: usize,
) -> FetchResult {
    let response = client
        .get(endpoint)
        .query(query_params)
        .send()
        .await
        .map_err(|e| classify_http_error(&e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(classify_status(status));
    }

    let body = response.text().await.map_err(|e| classify_http_error(&e))?;
    Ok(FetchOutcome::from_records(parse_rss(
        &body, provenance, limit,
    )?))
}

/// Keyless news provider #1: the Bing News RSS feed.
pub struct BingNews {
    client: reqwest::Client,
    endpoint: String,
}

impl BingNews {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_endpoint(client, BING_NEWS_ENDPOINT)
    }

    pub fn with_endpoint(client: reqwest::Client, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl SourceAdapter for BingNews {
    async fn fetch(&self, query: &str, limit: usize) -> FetchResult {
        fetch_rss(
            &self.client,
            &self.endpoint,
            &[("q", query), ("format", "rss")],
            "bing_news",
            limit,
        )
        .await
    }

    fn name(&self) -> &'static str {
        "bing_news"
    }
}

/// Keyless news provider #2: the Google News RSS feed. A supplement to
/// the first provider, not a replacement — the composer unions both.
pub struct GoogleNewsRss {
    client: reqwest::Client,
    endpoint: String,
}

impl GoogleNewsRss {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_endpoint(client, GOOGLE_NEWS_ENDPOINT)
    }

    pub fn with_endpoint(client: reqwest::Client, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl SourceAdapter for GoogleNewsRss {
    async fn fetch(&self, query: &str, limit: usize) -> FetchResult {
        fetch_rss(
            &self.client,
            &self.endpoint,
            &[
                ("q", query),
                ("hl", "en-US"),
                ("gl", "US"),
                ("ceid", "US:en"),
            ],
            "google_news_rss",
            limit,
        )
        .await
    }

    fn name(&self) -> &'static str {
        "google_news_rss"
    }
}

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    #[serde(default)]
    articles: Vec<NewsApiArticle>,
}

#[derive(Debug, Deserialize)]
struct NewsApiArticle {
    title: Option<String>,
    url: Option<String>,
    description: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
    source: Option<NewsApiSource>,
}

#[derive(Debug, Deserialize)]
struct NewsApiSource {
    name: Option<String>,
}

/// Key-gated news provider, consulted only when a credential is
/// configured.
pub struct NewsApi {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl NewsApi {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self::with_endpoint(client, NEWSAPI_ENDPOINT, api_key)
    }

    pub fn with_endpoint(client: reqwest::Client, endpoint: &str, api_key: String) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl SourceAdapter for NewsApi {
    async fn fetch(&self, query: &str, limit: usize) -> FetchResult {
        let limit_str = limit.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("sortBy", "relevancy"),
                ("pageSize", limit_str.as_str()),
                ("apiKey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| classify_http_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        let parsed: NewsApiResponse = response
            .json()
            .await
            .map_err(|e| SourceError::InvalidResponse(e.to_string()))?;

        let records = parsed
            .articles
            .into_iter()
            .take(limit)
            .filter_map(|article| {
                let title = clean_text(article.title.as_deref().unwrap_or_default());
                let url = article.url.unwrap_or_default();
                if title.is_empty() || url.is_empty() {
                    return None;
                }
                let snippet: String = clean_text(article.description.as_deref().unwrap_or_default())
                    .chars()
                    .take(SNIPPET_MAX_CHARS)
                    .collect();
                Some(
                    Record::new(title, url, snippet, "newsapi")
                        .with_published_at(article.published_at)
                        .with_source(article.source.and_then(|s| s.name)),
                )
            })
            .collect();

        Ok(FetchOutcome::from_records(records))
    }

    fn name(&self) -> &'static str {
        "newsapi"
    }
}

/// News behind the fallback composer in union mode: every configured
/// provider contributes and the merged set is deduplicated and
/// re-sorted. Provider call order does not survive into the output.
pub struct ComposedNews {
    composer: std::sync::Arc<crate::infrastructure::sources::composer::FallbackComposer>,
    adapters: Vec<std::sync::Arc<dyn SourceAdapter>>,
}

impl ComposedNews {
    pub fn new(
        composer: std::sync::Arc<crate::infrastructure::sources::composer::FallbackComposer>,
        adapters: Vec<std::sync::Arc<dyn SourceAdapter>>,
    ) -> Self {
        Self { composer, adapters }
    }
}

#[async_trait]
impl SourceAdapter for ComposedNews {
    async fn fetch(&self, query: &str, limit: usize) -> FetchResult {
        self.composer.union(&self.adapters, query, limit).await
    }

    fn name(&self) -> &'static str {
        "news"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RSS_SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Search results</title>
    <item>
      <title>OpenAI announces new model</title>
      <link>https://news.example/openai-model</link>
      <description><![CDATA[The company <b>unveiled</b> a new flagship model today.]]></description>
      <pubDate>Wed, 14 Jan 2026 09:00:00 GMT</pubDate>
      <source url="https://cnn.com">CNN</source>
    </item>
    <item>
      <title>Untitled noise</title>
      <link></link>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_rss_basics() {
        let records = parse_rss(RSS_SAMPLE, "google_news_rss", 20).unwrap();

        // 缺链接的条目被丢弃
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.title, "OpenAI announces new model");
        assert_eq!(r.url, "https://news.example/openai-model");
        assert_eq!(r.snippet, "The company unveiled a new flagship model today.");
        assert_eq!(r.published_at.as_deref(), Some("Wed, 14 Jan 2026 09:00:00 GMT"));
        assert_eq!(r.source.as_deref(), Some("CNN"));
        assert_eq!(r.provenance, "google_news_rss");
    }

    #[test]
    fn test_parse_rss_rejects_garbage() {
        assert!(matches!(
            parse_rss("this is not xml at all", "bing_news", 20),
            Err(SourceError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_parse_rss_truncates_long_descriptions() {
        let long_desc = "word ".repeat(200);
        let body = format!(
            r#"<rss><channel><item><title>t</title><link>https://e.x/1</link><description>{}</description></item></channel></rss>"#,
            long_desc
        );
        let records = parse_rss(&body, "bing_news", 20).unwrap();
        assert!(records[0].snippet.chars().count() <= 300);
    }

    #[tokio::test]
    async fn test_bing_news_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/news/search"))
            .and(query_param("format", "rss"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS_SAMPLE))
            .mount(&server)
            .await;

        let adapter = BingNews::with_endpoint(
            reqwest::Client::new(),
            &format!("{}/news/search", server.uri()),
        );
        let outcome = adapter.fetch("OpenAI", 20).await.unwrap();
        assert_eq!(outcome.into_records().len(), 1);
    }

    #[tokio::test]
    async fn test_newsapi_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/everything"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok",
                "articles": [{
                    "title": "OpenAI in talks",
                    "url": "https://news.example/talks",
                    "description": "Funding round discussions.",
                    "publishedAt": "2026-01-12T08:00:00Z",
                    "source": {"name": "Reuters"}
                }]
            })))
            .mount(&server)
            .await;

        let adapter = NewsApi::with_endpoint(
            reqwest::Client::new(),
            &format!("{}/v2/everything", server.uri()),
            "test-key".to_string(),
        );
        let outcome = adapter.fetch("OpenAI", 20).await.unwrap();
        let records = outcome.into_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source.as_deref(), Some("Reuters"));
    }

    #[tokio::test]
    async fn test_upstream_error_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let adapter = BingNews::with_endpoint(reqwest::Client::new(), &server.uri());
        let err = adapter.fetch("OpenAI", 20).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
