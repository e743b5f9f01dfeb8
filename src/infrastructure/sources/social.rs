// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use crate::domain::models::record::{FetchOutcome, Record};
use crate::domain::sources::adapter::{FetchResult, SourceAdapter};

/// Per-platform URL patterns; the capture group is the profile handle.
static SOCIAL_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        (
            "linkedin_company",
            Regex::new(r"(?i)linkedin\.com/company/([^/?]+)").unwrap(),
        ),
        (
            "linkedin_person",
            Regex::new(r"(?i)linkedin\.com/in/([^/?]+)").unwrap(),
        ),
        (
            "twitter",
            Regex::new(r"(?i)(?:twitter\.com|x\.com)/([^/?]+)").unwrap(),
        ),
        (
            "facebook",
            Regex::new(r"(?i)facebook\.com/([^/?]+)").unwrap(),
        ),
        (
            "instagram",
            Regex::new(r"(?i)instagram\.com/([^/?]+)").unwrap(),
        ),
        (
            "youtube",
            Regex::new(r"(?i)youtube\.com/(?:c/|channel/|@)([^/?]+)").unwrap(),
        ),
        ("github", Regex::new(r"(?i)github\.com/([^/?]+)").unwrap()),
        (
            "crunchbase",
            Regex::new(r"(?i)crunchbase\.com/organization/([^/?]+)").unwrap(),
        ),
    ]
});

/// How many hits each platform-scoped query contributes.
const RESULTS_PER_QUERY: usize = 5;

#[derive(Debug, Clone)]
struct Profile {
    url: String,
    handle: String,
    title: String,
    snippet: String,
}

/// Social-presence adapter.
///
/// Runs several platform-scoped queries through the composed web
/// search, extracts candidate profile URLs by pattern, keeps the first
/// match per platform, and scores presence as found/checked.
pub struct SocialPresence {
    search: Arc<dyn SourceAdapter>,
}

impl SocialPresence {
    pub fn new(search: Arc<dyn SourceAdapter>) -> Self {
        Self { search }
    }

    fn queries(target: &str) -> Vec<String> {
        vec![
            format!("{} site:linkedin.com", target),
            format!("{} site:twitter.com OR site:x.com", target),
            format!("{} site:crunchbase.com", target),
            format!("{} official site", target),
        ]
    }

    /// First pattern match per platform wins.
    fn extract_profiles(records: &[Record]) -> BTreeMap<&'static str, Profile> {
        let mut profiles = BTreeMap::new();

        for record in records {
            for (platform, pattern) in SOCIAL_PATTERNS.iter() {
                if profiles.contains_key(platform) {
                    continue;
                }
                if let Some(caps) = pattern.captures(&record.url) {
                    profiles.insert(
                        *platform,
                        Profile {
                            url: record.url.clone(),
                            handle: caps[1].to_string(),
                            title: record.title.clone(),
                            snippet: record.snippet.clone(),
                        },
                    );
                }
            }
        }

        profiles
    }
}

#[async_trait]
impl SourceAdapter for SocialPresence {
    async fn fetch(&self, query: &str, _limit: usize) -> FetchResult {
        let mut hits: Vec<Record> = Vec::new();

        for search_query in Self::queries(query) {
            match self.search.fetch(&search_query, RESULTS_PER_QUERY).await {
                Ok(outcome) => hits.extend(outcome.into_records()),
                Err(e) => {
                    // 单条查询失败不影响其余平台的探测
                    warn!(query = %search_query, error = %e, "Social probe query failed");
                }
            }
        }

        let profiles = Self::extract_profiles(&hits);
        if profiles.is_empty() {
            return Ok(FetchOutcome::Empty);
        }

        let presence_score =
            (profiles.len() as f64 / SOCIAL_PATTERNS.len() as f64 * 1000.0).round() / 10.0;
        let platforms: Vec<&str> = profiles.keys().copied().collect();

        let profile_map: serde_json::Map<String, serde_json::Value> = profiles
            .iter()
            .map(|(platform, p)| {
                (
                    platform.to_string(),
                    json!({
                        "url": p.url,
                        "handle": p.handle,
                        "title": p.title,
                        "snippet": p.snippet,
                    }),
                )
            })
            .collect();

        let record = Record::new(
            format!("Social presence: {}", query),
            profiles
                .values()
                .next()
                .map(|p| p.url.clone())
                .unwrap_or_default(),
            format!(
                "{} profiles found across {} platforms checked",
                profiles.len(),
                SOCIAL_PATTERNS.len()
            ),
            "social",
        )
        .with_data(json!({
            "profiles": profile_map,
            "num_profiles_found": profiles.len(),
            "presence_score": presence_score,
            "platforms_checked": SOCIAL_PATTERNS.iter().map(|(p, _)| *p).collect::<Vec<_>>(),
            "primary_platforms": platforms,
        }));

        Ok(FetchOutcome::Hits(vec![record]))
    }

    fn name(&self) -> &'static str {
        "social"
    }
}
