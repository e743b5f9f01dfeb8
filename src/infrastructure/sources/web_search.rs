// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use scraper::{Html, Selector};
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::domain::models::record::{FetchOutcome, Record};
use crate::domain::sources::adapter::{
    classify_http_error, classify_status, FetchResult, SourceAdapter, SourceError,
};
use crate::infrastructure::sources::composer::FallbackComposer;
use crate::utils::text::clean_text;

const DDG_HTML_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const DDG_LITE_ENDPOINT: &str = "https://lite.duckduckgo.com/lite/";

/// Unwrap DuckDuckGo redirect links (`/l/?uddg=<encoded target>`).
fn unwrap_redirect(href: &str) -> String {
    if href.contains("uddg=") {
        if let Ok(parsed) = Url::parse(&format!("https://duckduckgo.com{}", href))
            .or_else(|_| Url::parse(href))
        {
            if let Some((_, target)) = parsed.query_pairs().find(|(k, _)| k == "uddg") {
                return target.to_string();
            }
        }
    }
    href.to_string()
}

/// Primary web-search adapter scraping the DuckDuckGo HTML endpoint.
///
/// The endpoint serves a JavaScript-free results page, so a plain CSS
/// selector pass is enough. Redirect URLs are unwrapped to the actual
/// target so downstream deduplication sees stable URLs.
pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    endpoint: String,
    result_selector: Selector,
    title_selector: Selector,
    snippet_selector: Selector,
}

impl DuckDuckGoSearch {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_endpoint(client, DDG_HTML_ENDPOINT)
    }

    pub fn with_endpoint(client: reqwest::Client, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
            result_selector: Selector::parse(".result").expect("invalid result selector"),
            title_selector: Selector::parse(".result__title a").expect("invalid title selector"),
            snippet_selector: Selector::parse(".result__snippet")
                .expect("invalid snippet selector"),
        }
    }

    /// Parse a DuckDuckGo HTML results page into records.
    pub fn parse_results(&self, html: &str, limit: usize) -> Vec<Record> {
        let document = Html::parse_document(html);
        let mut records = Vec::new();

        for result in document.select(&self.result_selector).take(limit) {
            let Some(title_elem) = result.select(&self.title_selector).next() else {
                continue;
            };

            let title = clean_text(&title_elem.text().collect::<String>());
            let href = title_elem.value().attr("href").unwrap_or_default();
            let url = unwrap_redirect(href);
            if title.is_empty() || url.is_empty() {
                continue;
            }

            let snippet = result
                .select(&self.snippet_selector)
                .next()
                .map(|s| clean_text(&s.text().collect::<String>()))
                .unwrap_or_default();

            records.push(Record::new(title, url, snippet, "duckduckgo"));
        }

        records
    }
}

#[async_trait]
impl SourceAdapter for DuckDuckGoSearch {
    async fn fetch(&self, query: &str, limit: usize) -> FetchResult {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| classify_http_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify_http_error(&e))?;

        Ok(FetchOutcome::from_records(self.parse_results(&body, limit)))
    }

    fn name(&self) -> &'static str {
        "duckduckgo"
    }
}

/// Fallback adapter scraping the DuckDuckGo Lite page.
///
/// The Lite page is a bare table layout that survives provider
/// turbulence better than the main endpoint. Parsing uses cached regex
/// patterns instead of a DOM pass since the markup is tiny and rigid.
pub struct DdgLiteSearch {
    client: reqwest::Client,
    endpoint: String,
    link_regex: regex::Regex,
    tag_strip_regex: regex::Regex,
}

impl DdgLiteSearch {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_endpoint(client, DDG_LITE_ENDPOINT)
    }

    pub fn with_endpoint(client: reqwest::Client, endpoint: &str) -> Self {
        let link_regex = regex::Regex::new(
            r#"(?s)<a[^>]+rel="nofollow"[^>]+href="([^"]+)"[^>]*>(.*?)</a>"#,
        )
        .expect("Failed to compile link regex");
        let tag_strip_regex =
            regex::Regex::new(r"<[^>]+>").expect("Failed to compile tag strip regex");

        Self {
            client,
            endpoint: endpoint.to_string(),
            link_regex,
            tag_strip_regex,
        }
    }

    /// Parse the Lite results table into records.
    pub fn parse_results(&self, html: &str, limit: usize) -> Vec<Record> {
        let mut records = Vec::new();

        for caps in self.link_regex.captures_iter(html).take(limit) {
            let url = unwrap_redirect(html_escape::decode_html_entities(&caps[1]).as_ref());
            let title = clean_text(
                html_escape::decode_html_entities(&self.tag_strip_regex.replace_all(&caps[2], ""))
                    .as_ref(),
            );
            if title.is_empty() || url.is_empty() || url.starts_with('/') {
                continue;
            }
            records.push(Record::new(title, url, String::new(), "ddg_lite"));
        }

        records
    }
}

#[async_trait]
impl SourceAdapter for DdgLiteSearch {
    async fn fetch(&self, query: &str, limit: usize) -> FetchResult {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| classify_http_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify_http_error(&e))?;

        Ok(FetchOutcome::from_records(self.parse_results(&body, limit)))
    }

    fn name(&self) -> &'static str {
        "ddg_lite"
    }
}

/// Web search behind the fallback composer: the provider first, the
/// static-page scrape when the provider is down or dry.
pub struct ComposedWebSearch {
    composer: Arc<FallbackComposer>,
    adapters: Vec<Arc<dyn SourceAdapter>>,
}

impl ComposedWebSearch {
    pub fn new(composer: Arc<FallbackComposer>, adapters: Vec<Arc<dyn SourceAdapter>>) -> Self {
        Self { composer, adapters }
    }
}

#[async_trait]
impl SourceAdapter for ComposedWebSearch {
    async fn fetch(&self, query: &str, limit: usize) -> FetchResult {
        debug!(query, "Running composed web search");
        self.composer
            .first_success(&self.adapters, query, limit)
            .await
    }

    fn name(&self) -> &'static str {
        "web_search"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DDG_HTML_SAMPLE: &str = r#"
<html><body>
  <div class="result">
    <h2 class="result__title">
      <a href="/l/?kh=-1&amp;uddg=https%3A%2F%2Fopenai.com%2F">OpenAI</a>
    </h2>
    <a class="result__snippet">Creating safe AGI that benefits humanity.</a>
  </div>
  <div class="result">
    <h2 class="result__title">
      <a href="https://en.wikipedia.org/wiki/OpenAI">OpenAI - Wikipedia</a>
    </h2>
    <a class="result__snippet">OpenAI is an AI research organization.</a>
  </div>
</body></html>"#;

    const DDG_LITE_SAMPLE: &str = r#"
<html><body><table>
  <tr><td>1.</td><td><a rel="nofollow" href="https://openai.com/" class="result-link">OpenAI &mdash; Home</a></td></tr>
  <tr><td>2.</td><td><a rel="nofollow" href="/l/?uddg=https%3A%2F%2Fopenai.com%2Fblog">OpenAI <b>Blog</b></a></td></tr>
</table></body></html>"#;

    #[test]
    fn test_parse_ddg_html_results() {
        let adapter = DuckDuckGoSearch::new(reqwest::Client::new());
        let records = adapter.parse_results(DDG_HTML_SAMPLE, 20);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "OpenAI");
        assert_eq!(records[0].url, "https://openai.com/");
        assert_eq!(
            records[0].snippet,
            "Creating safe AGI that benefits humanity."
        );
        assert_eq!(records[1].url, "https://en.wikipedia.org/wiki/OpenAI");
    }

    #[test]
    fn test_parse_ddg_html_respects_limit() {
        let adapter = DuckDuckGoSearch::new(reqwest::Client::new());
        assert_eq!(adapter.parse_results(DDG_HTML_SAMPLE, 1).len(), 1);
    }

    #[test]
    fn test_parse_lite_results() {
        let adapter = DdgLiteSearch::new(reqwest::Client::new());
        let records = adapter.parse_results(DDG_LITE_SAMPLE, 20);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "OpenAI — Home");
        assert_eq!(records[0].url, "https://openai.com/");
        // 重定向链接被解包为真实地址
        assert_eq!(records[1].url, "https://openai.com/blog");
        assert_eq!(records[1].title, "OpenAI Blog");
    }

    #[test]
    fn test_unwrap_redirect_passthrough() {
        assert_eq!(
            unwrap_redirect("https://example.com/page"),
            "https://example.com/page"
        );
    }

    #[test]
    fn test_parse_empty_page() {
        let adapter = DuckDuckGoSearch::new(reqwest::Client::new());
        assert!(adapter.parse_results("<html></html>", 20).is_empty());
    }
}
