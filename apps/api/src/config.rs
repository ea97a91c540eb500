use anyhow::{Context, Result};

use crate::llm_client::{self, DEFAULT_MODEL};
use crate::search;

/// Application configuration loaded from environment variables.
/// API keys are optional here: they only pre-fill the form, and a request
/// may always supply its own.
#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub google_api_key: Option<String>,
    pub serper_api_key: Option<String>,
    pub gemini_model: String,
    /// Overrides for the hosted endpoints (proxies, local mocks).
    pub gemini_api_base: Option<String>,
    pub serper_api_base: Option<String>,
    pub search_result_count: u8,
    pub llm_timeout_secs: u64,
    pub search_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub max_page_chars: usize,
    pub max_upload_bytes: usize,
    /// A session with no requests for this long is dropped with its history.
    pub session_ttl_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            google_api_key: optional_env("GOOGLE_API_KEY"),
            serper_api_key: optional_env("SERPER_API_KEY"),
            gemini_model: optional_env("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            gemini_api_base: optional_env("GEMINI_API_BASE"),
            serper_api_base: optional_env("SERPER_API_BASE"),
            search_result_count: parse_env("SEARCH_RESULT_COUNT", 10)?,
            llm_timeout_secs: parse_env("LLM_TIMEOUT_SECS", llm_client::DEFAULT_TIMEOUT_SECS)?,
            search_timeout_secs: parse_env("SEARCH_TIMEOUT_SECS", search::DEFAULT_TIMEOUT_SECS)?,
            fetch_timeout_secs: parse_env("FETCH_TIMEOUT_SECS", 15)?,
            max_page_chars: parse_env("MAX_PAGE_CHARS", 4000)?,
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
            session_ttl_secs: parse_env("SESSION_TTL_SECS", 4 * 60 * 60)?,
        })
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("rust_log", &self.rust_log)
            .field("google_api_key", &self.google_api_key.as_ref().map(|_| "<redacted>"))
            .field("serper_api_key", &self.serper_api_key.as_ref().map(|_| "<redacted>"))
            .field("gemini_model", &self.gemini_model)
            .field("gemini_api_base", &self.gemini_api_base)
            .field("serper_api_base", &self.serper_api_base)
            .field("search_result_count", &self.search_result_count)
            .field("llm_timeout_secs", &self.llm_timeout_secs)
            .field("search_timeout_secs", &self.search_timeout_secs)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("max_page_chars", &self.max_page_chars)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .finish()
    }
}

/// Returns the variable's value, treating unset and blank the same way.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw}")),
        None => Ok(default),
    }
}

#[cfg(test)]
impl Config {
    /// Configuration used by unit tests; never reads the environment.
    pub fn for_tests() -> Self {
        Config {
            port: 0,
            rust_log: "debug".to_string(),
            google_api_key: None,
            serper_api_key: None,
            gemini_model: DEFAULT_MODEL.to_string(),
            gemini_api_base: None,
            serper_api_base: None,
            search_result_count: 5,
            llm_timeout_secs: 5,
            search_timeout_secs: 5,
            fetch_timeout_secs: 2,
            max_page_chars: 500,
            max_upload_bytes: 1024 * 1024,
            session_ttl_secs: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_api_keys() {
        let mut config = Config::for_tests();
        config.google_api_key = Some("gemini-secret".to_string());
        config.serper_api_key = Some("serper-secret".to_string());

        let printed = format!("{config:?}");
        assert!(!printed.contains("gemini-secret"));
        assert!(!printed.contains("serper-secret"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn test_parse_env_falls_back_to_default_when_unset() {
        let value: u16 = parse_env("JOBCREW_TEST_UNSET_VARIABLE", 4242).unwrap();
        assert_eq!(value, 4242);
    }
}
