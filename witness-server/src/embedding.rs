//! Remote embedding client for the Gemini `embedContent` endpoint.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use witness_core::embedder::{ensure_non_empty, Embedder};
use witness_core::{EmbedError, Embedding, ModelTag, WitnessError, WitnessResult};

use crate::config::ServerConfig;

const TASK_TYPE: &str = "RETRIEVAL_DOCUMENT";
const TITLE: &str = "Embedding of culprit info";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
    task_type: &'static str,
    title: &'static str,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: Option<ContentEmbedding>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}

#[derive(Clone)]
pub struct GeminiEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    tag: ModelTag,
}

impl std::fmt::Debug for GeminiEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiEmbedder")
            .field("base_url", &self.base_url)
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

impl GeminiEmbedder {
    pub fn new(config: &ServerConfig) -> WitnessResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.embed_timeout + Duration::from_secs(1))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| WitnessError::Configuration(format!("Failed to build HTTP client: {}", e)))?;
        Ok(GeminiEmbedder {
            client,
            base_url: config.embedding_url.clone(),
            api_key: config.api_key.clone(),
            tag: ModelTag::new(config.embedding_model.clone(), config.embedding_dimensions),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:embedContent", self.base_url, self.tag.model)
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding, EmbedError> {
        let text = ensure_non_empty(text)?;
        let body = EmbedContentRequest {
            model: format!("models/{}", self.tag.model),
            content: Content { parts: [Part { text }] },
            task_type: TASK_TYPE,
            title: TITLE,
        };

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbedError::Network(format!("HTTP request failed: {}", e.without_url())))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            warn!(model = %self.tag, "Embedding quota exhausted");
            return Err(EmbedError::Quota(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedError::Network(format!("HTTP error {}: {}", status, body)));
        }

        let parsed: EmbedContentResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::Malformed(format!("Invalid JSON response: {}", e)))?;
        let values = parsed.embedding.map(|e| e.values).unwrap_or_default();
        if values.is_empty() {
            return Err(EmbedError::Malformed("response carried no embedding values".to_string()));
        }
        debug!(model = %self.tag, dims = values.len(), "Received embedding");
        Ok(Embedding::from(values))
    }

    fn model_tag(&self) -> &ModelTag {
        &self.tag
    }
}
