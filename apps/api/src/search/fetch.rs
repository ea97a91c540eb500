//! Deep-search page fetcher: downloads a posting and reduces it to readable text.
//!
//! Failures are typed (`FetchFailure`) so the research stage can substitute a
//! notice instead of aborting.

use std::error::Error as StdError;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use scraper::{Html, Selector};
use thiserror::Error;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; jobcrew/0.1; +job-search-assistant)";
const TEXT_SELECTOR: &str = "h1, h2, h3, h4, p, li";

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub request_timeout: Duration,
    /// Page text beyond this many characters is dropped.
    pub max_chars: usize,
    /// Bytes of the response body read before parsing; the rest is never downloaded.
    pub max_bytes: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            max_chars: 4000,
            max_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Why a page could not be used. Display output is the human-readable reason
/// placed inside fallback notices.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    #[error("403 Forbidden")]
    Forbidden,

    #[error("404 Not Found")]
    NotFound,

    #[error("request timed out")]
    Timeout,

    #[error("SSL certificate error")]
    Certificate,

    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Returns the readable text of the page at `url`.
    async fn fetch_page(&self, url: &str) -> Result<String, FetchFailure>;
}

#[derive(Clone)]
pub struct ReqwestPageFetcher {
    client: Client,
    settings: FetchSettings,
}

impl ReqwestPageFetcher {
    pub fn new(client: Client, settings: FetchSettings) -> Self {
        Self { client, settings }
    }
}

#[async_trait]
impl PageFetcher for ReqwestPageFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchFailure> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|err| FetchFailure::Other(format!("invalid URL: {err}")))?;

        let response = self
            .client
            .get(parsed)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .timeout(self.settings.request_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        match status {
            StatusCode::FORBIDDEN => return Err(FetchFailure::Forbidden),
            StatusCode::NOT_FOUND => return Err(FetchFailure::NotFound),
            s if !s.is_success() => return Err(FetchFailure::Other(format!("HTTP {s}"))),
            _ => {}
        }

        let body = read_capped(response, self.settings.max_bytes)
            .await
            .map_err(map_reqwest_error)?;
        let html = String::from_utf8_lossy(&body);
        let text = extract_page_text(&html, self.settings.max_chars)?;
        if text.is_empty() {
            return Err(FetchFailure::Other(
                "page contained no readable text".to_string(),
            ));
        }
        Ok(text)
    }
}

/// Reads at most `max_bytes` of the body, chunk by chunk.
async fn read_capped(mut response: Response, max_bytes: usize) -> Result<Vec<u8>, reqwest::Error> {
    let expected = response.content_length().unwrap_or(0).min(max_bytes as u64);
    let mut body = Vec::with_capacity(expected as usize);
    while let Some(chunk) = response.chunk().await? {
        let room = max_bytes - body.len();
        if chunk.len() >= room {
            body.extend_from_slice(&chunk[..room]);
            break;
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

fn map_reqwest_error(err: reqwest::Error) -> FetchFailure {
    if err.is_timeout() {
        return FetchFailure::Timeout;
    }
    if is_certificate_error(&err) {
        return FetchFailure::Certificate;
    }
    FetchFailure::Other(err.to_string())
}

/// reqwest does not classify TLS failures, so walk the source chain.
fn is_certificate_error(err: &(dyn StdError + 'static)) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        if cause.to_string().to_lowercase().contains("certificate") {
            return true;
        }
        source = cause.source();
    }
    false
}

/// Visible text of headings, paragraphs and list items, whitespace-collapsed
/// and truncated to `max_chars` characters.
pub fn extract_page_text(html: &str, max_chars: usize) -> Result<String, FetchFailure> {
    let selector = Selector::parse(TEXT_SELECTOR)
        .map_err(|e| FetchFailure::Other(format!("selector error: {e:?}")))?;
    let document = Html::parse_document(html);

    let mut blocks = Vec::new();
    for element in document.select(&selector) {
        let block = element
            .text()
            .flat_map(str::split_whitespace)
            .collect::<Vec<_>>()
            .join(" ");
        if !block.is_empty() {
            blocks.push(block);
        }
    }

    Ok(blocks.join("\n").chars().take(max_chars).collect())
}
