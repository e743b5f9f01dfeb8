// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::models::record::{FetchOutcome, Record};
use crate::domain::sources::adapter::{FetchResult, SourceAdapter, SourceError};
use crate::infrastructure::sources::retry::{run_with_retry, RetryPolicy};
use crate::utils::text::{parse_date_flexible, title_fingerprint};

/// Fallback composer over a prioritized list of source adapters.
///
/// Two composition modes exist:
/// - `first_success`: adapters are tried in priority order and the first
///   one producing hits wins (web search: provider, then HTML scrape).
/// - `union`: every adapter is consulted and all hits are merged
///   (news: multiple providers supplement each other).
///
/// Either way each adapter call goes through the retry executor, and the
/// merged output is deduplicated, sorted newest-first and truncated.
pub struct FallbackComposer {
    policy: RetryPolicy,
    max_results: usize,
}

impl FallbackComposer {
    pub fn new(policy: RetryPolicy, max_results: usize) -> Self {
        Self {
            policy,
            max_results,
        }
    }

    /// Try adapters in priority order, returning the first non-empty result.
    pub async fn first_success(
        &self,
        adapters: &[Arc<dyn SourceAdapter>],
        query: &str,
        limit: usize,
    ) -> FetchResult {
        let mut last_error: Option<SourceError> = None;

        for adapter in adapters {
            let name = adapter.name();
            let result = run_with_retry(&self.policy, name, || adapter.fetch(query, limit)).await;

            match result {
                Ok(FetchOutcome::Hits(records)) => {
                    info!(source = name, count = records.len(), "Adapter returned hits");
                    return Ok(FetchOutcome::from_records(self.merge(records)));
                }
                Ok(FetchOutcome::Empty) => {
                    info!(source = name, "Adapter returned no results, trying next");
                }
                Err(e) => {
                    warn!(source = name, error = %e, "Adapter failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(FetchOutcome::Empty),
        }
    }

    /// Consult every adapter and union the results.
    ///
    /// Adapters hold independent data, so they are queried
    /// concurrently. Callers must not assume adapter order survives
    /// into the output: the merged set is re-sorted by timestamp.
    pub async fn union(
        &self,
        adapters: &[Arc<dyn SourceAdapter>],
        query: &str,
        limit: usize,
    ) -> FetchResult {
        let fetches = adapters.iter().map(|adapter| {
            let name = adapter.name();
            async move {
                let result =
                    run_with_retry(&self.policy, name, || adapter.fetch(query, limit)).await;
                (name, result)
            }
        });

        let mut combined: Vec<Record> = Vec::new();
        let mut last_error: Option<SourceError> = None;
        let mut any_succeeded = false;

        for (name, result) in join_all(fetches).await {
            match result {
                Ok(FetchOutcome::Hits(records)) => {
                    info!(source = name, count = records.len(), "Adapter contributed results");
                    any_succeeded = true;
                    combined.extend(records);
                }
                Ok(FetchOutcome::Empty) => {
                    any_succeeded = true;
                }
                Err(e) => {
                    warn!(source = name, error = %e, "Adapter failed, continuing union");
                    last_error = Some(e);
                }
            }
        }

        if combined.is_empty() && !any_succeeded {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        Ok(FetchOutcome::from_records(self.merge(combined)))
    }

    /// Deduplicate, sort and truncate a merged record set.
    ///
    /// Exact URL match wins over the title fingerprint: two records with
    /// the same URL always collapse, and fingerprint-identical titles
    /// collapse even when their URLs differ (tracking-parameter noise).
    pub fn merge(&self, records: Vec<Record>) -> Vec<Record> {
        let mut seen_urls: HashSet<String> = HashSet::new();
        let mut seen_fingerprints: HashSet<String> = HashSet::new();
        let mut unique: Vec<Record> = Vec::new();

        for record in records {
            let url = record.url.trim().to_string();
            if !url.is_empty() && seen_urls.contains(&url) {
                continue;
            }

            let fingerprint = title_fingerprint(&record.title);
            if !fingerprint.is_empty() && seen_fingerprints.contains(&fingerprint) {
                continue;
            }

            if !url.is_empty() {
                seen_urls.insert(url);
            }
            if !fingerprint.is_empty() {
                seen_fingerprints.insert(fingerprint);
            }
            unique.push(record);
        }

        // Newest first; records without a parseable timestamp sort last
        let mut dated: Vec<(Option<chrono::DateTime<chrono::Utc>>, Record)> = unique
            .into_iter()
            .map(|r| {
                let ts = r.published_at.as_deref().and_then(parse_date_flexible);
                (ts, r)
            })
            .collect();
        dated.sort_by(|a, b| b.0.cmp(&a.0));

        dated
            .into_iter()
            .take(self.max_results)
            .map(|(_, r)| r)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn composer(max_results: usize) -> FallbackComposer {
        FallbackComposer::new(
            RetryPolicy {
                max_attempts: 2,
                base_delay: std::time::Duration::from_millis(1),
                max_delay: std::time::Duration::from_millis(2),
                jitter_factor: 0.0,
            },
            max_results,
        )
    }

    fn record(title: &str, url: &str, published_at: Option<&str>) -> Record {
        Record::new(title.into(), url.into(), "snippet".into(), "test")
            .with_published_at(published_at.map(|s| s.to_string()))
    }

    struct StaticAdapter {
        name: &'static str,
        outcome: FetchResult,
        calls: AtomicU32,
    }

    impl StaticAdapter {
        fn new(name: &'static str, outcome: FetchResult) -> Arc<Self> {
            Arc::new(Self {
                name,
                outcome,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl SourceAdapter for StaticAdapter {
        async fn fetch(&self, _query: &str, _limit: usize) -> FetchResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }

        fn name(&self) -> &'static str {
            self.name
        }
    }

    #[test]
    fn test_dedup_by_exact_url() {
        let merged = composer(20).merge(vec![
            record("First take", "https://example.com/a", None),
            record("Second take entirely different title", "https://example.com/a", None),
        ]);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_dedup_by_title_fingerprint_across_urls() {
        let merged = composer(20).merge(vec![
            record(
                "OpenAI raises new funding",
                "https://a.example/story?utm_source=x",
                None,
            ),
            record(
                "OpenAI Raises New Funding!",
                "https://b.example/story?ref=rss",
                None,
            ),
        ]);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let records = vec![
            record("Alpha story", "https://a.example/1", Some("2026-01-10")),
            record("Beta story", "https://a.example/2", Some("2026-01-12")),
            record("Alpha story", "https://a.example/1", Some("2026-01-10")),
        ];

        let c = composer(20);
        let once = c.merge(records);
        let twice = c.merge(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_sort_newest_first_unparseable_last() {
        let merged = composer(20).merge(vec![
            record("Old", "https://a.example/old", Some("2025-06-01")),
            record("Undated", "https://a.example/undated", Some("sometime soon")),
            record("New", "https://a.example/new", Some("2026-01-15T08:00:00Z")),
        ]);

        assert_eq!(merged[0].title, "New");
        assert_eq!(merged[1].title, "Old");
        assert_eq!(merged[2].title, "Undated");
    }

    #[test]
    fn test_truncates_to_max_results() {
        let records = (0..30)
            .map(|i| record(&format!("story {}", i), &format!("https://e.x/{}", i), None))
            .collect();
        assert_eq!(composer(10).merge(records).len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_success_skips_failing_primary() {
        let primary = StaticAdapter::new("primary", Err(SourceError::Timeout));
        let fallback = StaticAdapter::new(
            "fallback",
            Ok(FetchOutcome::Hits(vec![record(
                "hit",
                "https://e.x/hit",
                None,
            )])),
        );

        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![primary.clone(), fallback.clone()];
        let result = composer(20).first_success(&adapters, "q", 10).await;

        assert!(matches!(result, Ok(FetchOutcome::Hits(ref r)) if r.len() == 1));
        // 主源按策略重试后才轮到回退源
        assert_eq!(primary.calls.load(Ordering::SeqCst), 2);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_union_combines_and_dedups() {
        let a = StaticAdapter::new(
            "a",
            Ok(FetchOutcome::Hits(vec![
                record("Shared headline", "https://e.x/a", Some("2026-01-10")),
                record("Only in A", "https://e.x/only-a", Some("2026-01-11")),
            ])),
        );
        let b = StaticAdapter::new(
            "b",
            Ok(FetchOutcome::Hits(vec![record(
                "Shared Headline",
                "https://other.example/b?utm=1",
                Some("2026-01-10"),
            )])),
        );

        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![a, b];
        let result = composer(20).union(&adapters, "q", 10).await.unwrap();

        let records = result.into_records();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_union_all_failed_propagates_error() {
        let a = StaticAdapter::new("a", Err(SourceError::Timeout));
        let b = StaticAdapter::new("b", Err(SourceError::Upstream("503".into())));

        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![a, b];
        let result = composer(20).union(&adapters, "q", 10).await;
        assert!(result.is_err());
    }
}
