//! Web search collaborator — Serper (Google results) behind the `SearchProvider` trait.
//!
//! The pipeline never talks HTTP itself: it receives `&dyn SearchProvider` and
//! `&dyn PageFetcher` handles, so tests swap in deterministic stubs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub mod fetch;

pub use fetch::{FetchFailure, FetchSettings, PageFetcher, ReqwestPageFetcher};

const SERPER_API_BASE: &str = "https://google.serper.dev";
/// Per-request deadline used when `SEARCH_TIMEOUT_SECS` is not set.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Search API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Search request timed out after {0:?}")]
    Timeout(Duration),
}

/// One organic result returned by the search collaborator, in rank order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    /// Host the posting lives on, e.g. `www.linkedin.com`.
    pub source: String,
    pub snippet: String,
    pub url: String,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError>;
}

#[derive(Debug, Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    num: u8,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperOrganic>,
}

#[derive(Debug, Deserialize)]
struct SerperOrganic {
    title: String,
    link: String,
    #[serde(default)]
    snippet: String,
}

/// Serper `/search` client bound to one API key.
#[derive(Clone)]
pub struct SerperClient {
    client: Client,
    api_key: String,
    result_count: u8,
    base_url: String,
    timeout: Duration,
}

impl SerperClient {
    pub fn new(client: Client, api_key: String, result_count: u8) -> Self {
        Self {
            client,
            api_key,
            result_count,
            base_url: SERPER_API_BASE.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn classify(&self, err: reqwest::Error) -> SearchError {
        if err.is_timeout() {
            SearchError::Timeout(self.timeout)
        } else {
            SearchError::Http(err)
        }
    }
}

#[async_trait]
impl SearchProvider for SerperClient {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        let response = self
            .client
            .post(format!("{}/search", self.base_url.trim_end_matches('/')))
            .header("X-API-KEY", &self.api_key)
            .timeout(self.timeout)
            .json(&SerperRequest {
                q: query,
                num: self.result_count,
            })
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.classify(e))?;
        if !status.is_success() {
            return Err(SearchError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: SerperResponse = serde_json::from_str(&body)?;
        debug!(
            "Search for {:?} returned {} organic results",
            query,
            parsed.organic.len()
        );

        Ok(parsed
            .organic
            .into_iter()
            .map(|item| SearchResult {
                source: source_of(&item.link),
                title: item.title,
                snippet: item.snippet,
                url: item.link,
            })
            .collect())
    }
}

/// Host name of a result link, or `"unknown"` when the link does not parse.
pub fn source_of(link: &str) -> String {
    url::Url::parse(link)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}
