//! Client for an external JSON-over-HTTP NLP service
//!
//! The service wraps the statistical models (tokenizer, tagger, dependency
//! parser, NER, coreference clustering) and exposes two endpoints:
//!
//! - `POST {base_url}/coref` with `{"text": ...}` returns `{"clusters": [...]}`
//! - `POST {base_url}/parse` with `{"text": ...}` returns `{"sentences": [...]}`
//!
//! Author: hephaex@gmail.com

use std::time::Duration;

use async_trait::async_trait;
use dkg_core::{
    CorefModel, CoreferenceCluster, DkgError, NlpConfig, ParsedSentence, Result, SentenceParser,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct TextRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct CorefResponse {
    #[serde(default)]
    clusters: Vec<CoreferenceCluster>,
}

#[derive(Debug, Deserialize)]
struct ParseResponse {
    #[serde(default)]
    sentences: Vec<ParsedSentence>,
}

/// Which endpoint a request went to, for error attribution
#[derive(Debug, Clone, Copy)]
enum Endpoint {
    Coref,
    Parse,
}

impl Endpoint {
    fn path(self) -> &'static str {
        match self {
            Self::Coref => "coref",
            Self::Parse => "parse",
        }
    }

    fn error(self, message: String) -> DkgError {
        match self {
            Self::Coref => DkgError::CorefError(message),
            Self::Parse => DkgError::ParseError(message),
        }
    }
}

/// HTTP NLP service client
pub struct HttpNlpClient {
    client: Client,
    base_url: String,
}

impl HttpNlpClient {
    /// Create a client with the given request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DkgError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Create from config
    pub fn from_config(config: &NlpConfig) -> Result<Self> {
        Self::new(
            config.base_url.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<T: DeserializeOwned>(&self, endpoint: Endpoint, text: &str) -> Result<T> {
        let url = format!("{}/{}", self.base_url, endpoint.path());

        let response = self
            .client
            .post(&url)
            .json(&TextRequest { text })
            .send()
            .await
            .map_err(|e| endpoint.error(format!("Request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(endpoint.error(format!("{url} returned {status}: {error_text}")));
        }

        response
            .json()
            .await
            .map_err(|e| endpoint.error(format!("Failed to decode {url} response: {e}")))
    }
}

#[async_trait]
impl CorefModel for HttpNlpClient {
    async fn clusters(&self, text: &str) -> Result<Vec<CoreferenceCluster>> {
        let response: CorefResponse = self.post(Endpoint::Coref, text).await?;

        // The service does not always echo cluster ids onto mentions
        Ok(response
            .clusters
            .into_iter()
            .map(|cluster| {
                let representative = cluster.representative;
                let mut normalized = CoreferenceCluster::new(cluster.id, cluster.mentions);
                normalized.representative = representative;
                normalized
            })
            .collect())
    }
}

#[async_trait]
impl SentenceParser for HttpNlpClient {
    async fn parse(&self, text: &str) -> Result<Vec<ParsedSentence>> {
        let response: ParseResponse = self.post(Endpoint::Parse, text).await?;
        tracing::debug!(sentences = response.sentences.len(), "Parsed text");
        Ok(response.sentences)
    }
}
