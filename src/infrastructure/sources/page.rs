// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::domain::sources::adapter::{classify_http_error, classify_status, SourceError};
use crate::utils::text::clean_text;

/// Extracted body text is bounded per page.
const CONTENT_MAX_CHARS: usize = 10_000;

static SCRIPT_STRIP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style|noscript)[^>]*>.*?</(script|style|noscript)>")
        .expect("invalid script strip regex")
});

/// Clean text content extracted from one web page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageContent {
    pub url: String,
    pub domain: String,
    pub title: String,
    pub description: String,
    pub content: String,
}

/// Fetches a page and reduces it to clean text for the pages stage.
pub struct PageFetcher {
    client: reqwest::Client,
    body_selector: Selector,
    title_selector: Selector,
    description_selector: Selector,
}

impl PageFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            body_selector: Selector::parse("body").expect("invalid body selector"),
            title_selector: Selector::parse("title").expect("invalid title selector"),
            description_selector: Selector::parse(r#"meta[name="description"]"#)
                .expect("invalid description selector"),
        }
    }

    /// Reduce raw HTML to title, meta description and body text.
    pub fn extract(&self, url: &str, html: &str) -> PageContent {
        // Script and style blocks would pollute the text pass
        let stripped = SCRIPT_STRIP.replace_all(html, " ");
        let document = Html::parse_document(&stripped);

        let title = document
            .select(&self.title_selector)
            .next()
            .map(|t| clean_text(&t.text().collect::<String>()))
            .unwrap_or_default();

        let description = document
            .select(&self.description_selector)
            .next()
            .and_then(|m| m.value().attr("content"))
            .map(clean_text)
            .unwrap_or_default();

        let content: String = document
            .select(&self.body_selector)
            .next()
            .map(|b| clean_text(&b.text().collect::<Vec<_>>().join(" ")))
            .unwrap_or_default()
            .chars()
            .take(CONTENT_MAX_CHARS)
            .collect();

        let domain = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_default();

        PageContent {
            url: url.to_string(),
            domain,
            title,
            description,
            content,
        }
    }

    /// Fetch one page and extract its text content.
    pub async fn fetch_page(&self, url: &str) -> Result<PageContent, SourceError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_http_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        let body = response.text().await.map_err(|e| classify_http_error(&e))?;
        Ok(self.extract(url, &body))
    }
}
