//! Web-search client for the You.com index API.
//!
//! Search is best-effort enrichment: every failure is logged and turned into
//! an empty result list.

use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use mastery_core::config::{MAX_SEARCH_RESULTS, SEARCH_API_KEY_ENV};
use mastery_core::{MasteryError, Result, SearchConfig, TransportErrorKind};

const SEARCH_TIMEOUT_SECS: u64 = 20;

/// One ranked search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Page title.
    #[serde(default)]
    pub title: String,
    /// Page URL.
    #[serde(default)]
    pub url: String,
    /// Relevant excerpts.
    #[serde(default)]
    pub snippets: Vec<String>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Option<SearchResults>,
}

#[derive(Deserialize)]
struct SearchResults {
    #[serde(default)]
    web: Option<Vec<SearchResult>>,
}

/// Client for the web-search service.
#[derive(Debug, Clone)]
pub struct WebSearchClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    concurrency: usize,
}

impl WebSearchClient {
    /// Builds a client using the key in `YDC_API_KEY`, if any.
    ///
    /// # Errors
    ///
    /// Returns `MasteryError::Transport` if the HTTP client cannot be constructed.
    pub fn from_env(config: &SearchConfig) -> Result<Self> {
        Self::new(config, std::env::var(SEARCH_API_KEY_ENV).ok())
    }

    /// Builds a client. Without an API key every search returns no results.
    ///
    /// # Errors
    ///
    /// Returns `MasteryError::Transport` if the HTTP client cannot be constructed.
    pub fn new(config: &SearchConfig, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(SEARCH_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                MasteryError::transport(
                    TransportErrorKind::Network,
                    format!("failed to build HTTP client: {e}"),
                )
            })?;

        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            concurrency: config.concurrency.max(1),
        })
    }

    /// Returns `true` if an API key is configured.
    #[must_use]
    pub const fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    /// Runs one query. `count` is clamped to 1..=20.
    ///
    /// Never fails: missing credentials, transport errors, non-success
    /// statuses, and bodies without web results all yield an empty list.
    #[instrument(level = "debug", skip(self))]
    pub async fn search(&self, query: &str, count: u32) -> Vec<SearchResult> {
        let Some(api_key) = &self.api_key else {
            warn!("{SEARCH_API_KEY_ENV} not set, skipping web search");
            return Vec::new();
        };
        let count = count.clamp(1, MAX_SEARCH_RESULTS);

        let url = format!("{}/search", self.base_url);
        let res = match self
            .client
            .get(&url)
            .header("X-API-Key", api_key)
            .query(&[("query", query.to_string()), ("count", count.to_string())])
            .send()
            .await
        {
            Ok(res) => res,
            Err(e) => {
                warn!(error = %e, "Web search request failed");
                return Vec::new();
            }
        };

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(
                status = status.as_u16(),
                body = %body.chars().take(200).collect::<String>(),
                "Web search returned an error status"
            );
            return Vec::new();
        }

        let body: SearchResponse = match res.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Web search returned an unreadable body");
                return Vec::new();
            }
        };

        let results = body.results.and_then(|r| r.web).unwrap_or_default();
        debug!(results = results.len(), "Web search complete");
        results
    }

    /// Runs several queries with bounded concurrency.
    ///
    /// Results are concatenated in query order.
    pub async fn search_all(&self, queries: &[String], count: u32) -> Vec<SearchResult> {
        stream::iter(queries)
            .map(|query| self.search(query, count))
            .buffered(self.concurrency)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .flatten()
            .collect()
    }
}
