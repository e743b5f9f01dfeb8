// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::record::FetchOutcome;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Timeout")]
    Timeout,
    #[error("Upstream error: {0}")]
    Upstream(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl SourceError {
    /// Transient failures (network, timeout, 5xx) are worth retrying;
    /// a definitive not-found or an unparseable body is not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SourceError::Network(_) | SourceError::Timeout | SourceError::Upstream(_)
        )
    }
}

/// Classify a reqwest failure into the source error taxonomy.
pub fn classify_http_error(err: &reqwest::Error) -> SourceError {
    if err.is_timeout() {
        SourceError::Timeout
    } else if let Some(status) = err.status() {
        if status == reqwest::StatusCode::NOT_FOUND {
            SourceError::NotFound(status.to_string())
        } else if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            SourceError::Upstream(status.to_string())
        } else {
            SourceError::NotFound(status.to_string())
        }
    } else {
        SourceError::Network(err.to_string())
    }
}

/// Classify a bare HTTP status code (for responses checked by hand).
pub fn classify_status(status: reqwest::StatusCode) -> SourceError {
    if status == reqwest::StatusCode::NOT_FOUND {
        SourceError::NotFound(status.to_string())
    } else if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        SourceError::Upstream(status.to_string())
    } else {
        SourceError::NotFound(status.to_string())
    }
}

pub type FetchResult = Result<FetchOutcome, SourceError>;

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Fetch records for a query, capped at `limit`.
    ///
    /// Implementations absorb every upstream failure into `SourceError`;
    /// nothing else crosses this boundary.
    async fn fetch(&self, query: &str, limit: usize) -> FetchResult;

    /// Get the name of the adapter (used as provenance tag and stage label)
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(SourceError::Timeout.is_retryable());
        assert!(SourceError::Network("reset".into()).is_retryable());
        assert!(SourceError::Upstream("503".into()).is_retryable());
        assert!(!SourceError::NotFound("404".into()).is_retryable());
        assert!(!SourceError::InvalidResponse("bad json".into()).is_retryable());
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(reqwest::StatusCode::NOT_FOUND),
            SourceError::NotFound(_)
        ));
        assert!(matches!(
            classify_status(reqwest::StatusCode::SERVICE_UNAVAILABLE),
            SourceError::Upstream(_)
        ));
        assert!(matches!(
            classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS),
            SourceError::Upstream(_)
        ));
    }
}
