//! Builds the external-service handles for one run from its credentials.

use std::fmt;
use std::time::Duration;

use reqwest::Client;

use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::pipeline::Collaborators;
use crate::search::{FetchSettings, ReqwestPageFetcher, SerperClient};

/// Per-run API keys. Passed explicitly; never stored in the environment.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub model_api_key: String,
    pub search_api_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("model_api_key", &"<redacted>")
            .field("search_api_key", &"<redacted>")
            .finish()
    }
}

/// Seam between the HTTP shell and the concrete collaborators.
pub trait CollaboratorFactory: Send + Sync {
    fn build(&self, credentials: &Credentials) -> Collaborators;
}

/// Gemini + Serper + reqwest page fetcher, sharing one connection pool.
pub struct HttpCollaborators {
    client: Client,
    model: String,
    gemini_api_base: Option<String>,
    serper_api_base: Option<String>,
    search_result_count: u8,
    llm_timeout: Duration,
    search_timeout: Duration,
    fetch: FetchSettings,
}

impl HttpCollaborators {
    pub fn from_config(client: Client, config: &Config) -> Self {
        Self {
            client,
            model: config.gemini_model.clone(),
            gemini_api_base: config.gemini_api_base.clone(),
            serper_api_base: config.serper_api_base.clone(),
            search_result_count: config.search_result_count,
            llm_timeout: Duration::from_secs(config.llm_timeout_secs),
            search_timeout: Duration::from_secs(config.search_timeout_secs),
            fetch: FetchSettings {
                request_timeout: Duration::from_secs(config.fetch_timeout_secs),
                max_chars: config.max_page_chars,
                ..FetchSettings::default()
            },
        }
    }
}

impl CollaboratorFactory for HttpCollaborators {
    fn build(&self, credentials: &Credentials) -> Collaborators {
        let mut model = LlmClient::new(
            self.client.clone(),
            credentials.model_api_key.clone(),
            self.model.clone(),
        )
        .with_timeout(self.llm_timeout);
        if let Some(base) = &self.gemini_api_base {
            model = model.with_base_url(base.clone());
        }

        let mut search = SerperClient::new(
            self.client.clone(),
            credentials.search_api_key.clone(),
            self.search_result_count,
        )
        .with_timeout(self.search_timeout);
        if let Some(base) = &self.serper_api_base {
            search = search.with_base_url(base.clone());
        }

        Collaborators {
            model: Box::new(model),
            search: Box::new(search),
            fetcher: Box::new(ReqwestPageFetcher::new(self.client.clone(), self.fetch.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::llm_client::LlmError;
    use crate::pipeline::{invoke_stage, PipelineError, Stage, StagePrompt};

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = Credentials {
            model_api_key: "gemini-secret".to_string(),
            search_api_key: "serper-secret".to_string(),
        };
        let printed = format!("{creds:?}");
        assert!(!printed.contains("secret"));
    }

    #[tokio::test]
    async fn test_built_collaborators_use_configured_endpoints_and_keys() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("X-API-KEY", "serper-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "organic": [{"title": "Rust Dev", "link": "https://acme.io/jobs/1", "snippet": "Remote"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = Config::for_tests();
        config.serper_api_base = Some(server.uri());
        let factory = HttpCollaborators::from_config(Client::new(), &config);

        let collaborators = factory.build(&Credentials {
            model_api_key: "gemini-key".to_string(),
            search_api_key: "serper-key".to_string(),
        });
        let results = collaborators.search.search("Rust jobs").await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, "acme.io");
    }

    #[tokio::test]
    async fn test_slow_model_fails_the_stage_after_configured_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({
                        "candidates": [{"content": {"parts": [{"text": "too late"}]}}]
                    }))
                    .set_delay(Duration::from_secs(4)),
            )
            .mount(&server)
            .await;

        let mut config = Config::for_tests();
        config.gemini_api_base = Some(server.uri());
        config.llm_timeout_secs = 1;
        let collaborators = HttpCollaborators::from_config(Client::new(), &config).build(&Credentials {
            model_api_key: "gemini-key".to_string(),
            search_api_key: "serper-key".to_string(),
        });

        let prompt = StagePrompt {
            system: "You are a writer.".to_string(),
            task: "Draft a letter.".to_string(),
        };
        let err = invoke_stage(Stage::Compose, &prompt, collaborators.model.as_ref())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Model {
                stage: Stage::Compose,
                source: LlmError::Timeout(_),
            }
        ));
    }
}
