//! Embedding backends.
//!
//! [`EmbeddingProvider`] is the closed set of backends the application can be
//! configured with: an OpenAI-compatible remote API or a model served on the
//! local machine. It is resolved once from settings and handed to the index
//! builder and the query engine. Anything else implementing [`Embedder`] can be
//! plugged into those components directly.

use crate::error::EmbeddingError;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

pub const DEFAULT_BATCH_SIZE: usize = 32;
pub const DEFAULT_LOCAL_HOST: &str = "http://localhost:11434";
pub const DEFAULT_LOCAL_MODEL: &str = "bge-m3";
pub const DEFAULT_LOCAL_DEVICE: &str = "cpu";
pub const DEFAULT_MAX_LENGTH: usize = 512;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Provider and model that produced the vectors, e.g. `remote:text-embedding-3-small`.
    fn model_identity(&self) -> String;

    /// Vectors for `texts`, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let vectors = self.embed_batch(&[text.to_string()]).await?;
        let returned = vectors.len();
        match <[Vec<f32>; 1]>::try_from(vectors) {
            Ok([vector]) => Ok(vector),
            Err(_) => Err(EmbeddingError::CountMismatch {
                provider: "embedder",
                requested: 1,
                returned,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEmbeddingConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub batch_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalEmbeddingConfig {
    pub host: String,
    pub model: String,
    pub device: String,
    pub max_length: usize,
    pub batch_size: usize,
}

impl Default for LocalEmbeddingConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_LOCAL_HOST.to_string(),
            model: DEFAULT_LOCAL_MODEL.to_string(),
            device: DEFAULT_LOCAL_DEVICE.to_string(),
            max_length: DEFAULT_MAX_LENGTH,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// OpenAI-compatible `/embeddings` endpoint (OpenAI, Azure OpenAI, vLLM, ...).
pub struct RemoteEmbedder {
    client: Client,
    config: RemoteEmbeddingConfig,
}

#[derive(Debug, Deserialize)]
struct RemoteEmbeddingResponse {
    data: Vec<RemoteEmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct RemoteEmbeddingItem {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

impl RemoteEmbedder {
    const PROVIDER: &'static str = "remote";

    pub fn new(config: RemoteEmbeddingConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = format!("{}/embeddings", self.config.api_base.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "model": self.config.model,
                "input": texts,
            }))
            .send()
            .await
            .map_err(|source| EmbeddingError::Http {
                provider: Self::PROVIDER,
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::BackendResponse {
                provider: Self::PROVIDER,
                details: format!("{status}: {details}"),
            });
        }

        let mut parsed: RemoteEmbeddingResponse = decode_body(Self::PROVIDER, response).await?;

        // Items carry their input position; the API does not promise ordering.
        parsed
            .data
            .sort_by_key(|item| item.index.unwrap_or(usize::MAX));
        let vectors = parsed.data.into_iter().map(|item| item.embedding).collect();
        check_batch(Self::PROVIDER, texts.len(), vectors)
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    fn model_identity(&self) -> String {
        format!("{}:{}", Self::PROVIDER, self.config.model)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size.max(1)) {
            debug!(model = %self.config.model, size = batch.len(), "requesting remote embeddings");
            vectors.extend(self.request(batch).await?);
        }
        check_batch(Self::PROVIDER, texts.len(), vectors)
    }
}

/// On-device embeddings served by a local Ollama runtime.
pub struct LocalEmbedder {
    client: Client,
    config: LocalEmbeddingConfig,
}

#[derive(Debug, Deserialize)]
struct LocalEmbeddingResponse {
    embeddings: Vec<Vec<f32>>,
}

impl LocalEmbedder {
    const PROVIDER: &'static str = "local";

    pub fn new(config: LocalEmbeddingConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn runtime_options(&self) -> serde_json::Value {
        let mut options = json!({ "num_ctx": self.config.max_length });
        if self.config.device.eq_ignore_ascii_case("cpu") {
            options["num_gpu"] = json!(0);
        }
        options
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = format!("{}/api/embed", self.config.host.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "model": self.config.model,
                "input": texts,
                "truncate": true,
                "options": self.runtime_options(),
            }))
            .send()
            .await
            .map_err(|source| EmbeddingError::Http {
                provider: Self::PROVIDER,
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::BackendResponse {
                provider: Self::PROVIDER,
                details: format!("{status}: {details}"),
            });
        }

        let parsed: LocalEmbeddingResponse = decode_body(Self::PROVIDER, response).await?;
        check_batch(Self::PROVIDER, texts.len(), parsed.embeddings)
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_identity(&self) -> String {
        format!("{}:{}", Self::PROVIDER, self.config.model)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size.max(1)) {
            debug!(
                model = %self.config.model,
                device = %self.config.device,
                size = batch.len(),
                "running local embeddings"
            );
            vectors.extend(self.request(batch).await?);
        }
        check_batch(Self::PROVIDER, texts.len(), vectors)
    }
}

pub enum EmbeddingProvider {
    Remote(RemoteEmbedder),
    Local(LocalEmbedder),
}

#[async_trait]
impl Embedder for EmbeddingProvider {
    fn model_identity(&self) -> String {
        match self {
            Self::Remote(embedder) => embedder.model_identity(),
            Self::Local(embedder) => embedder.model_identity(),
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        match self {
            Self::Remote(embedder) => embedder.embed_batch(texts).await,
            Self::Local(embedder) => embedder.embed_batch(texts).await,
        }
    }
}

/// Reads a successful response body. A body that arrives but does not parse
/// is a [`EmbeddingError::Decode`], not a transport failure.
async fn decode_body<T: DeserializeOwned>(
    provider: &'static str,
    response: Response,
) -> Result<T, EmbeddingError> {
    let body = response
        .text()
        .await
        .map_err(|source| EmbeddingError::Http { provider, source })?;
    serde_json::from_str(&body).map_err(|source| EmbeddingError::Decode { provider, source })
}

fn check_batch(
    provider: &'static str,
    requested: usize,
    vectors: Vec<Vec<f32>>,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if vectors.len() != requested {
        return Err(EmbeddingError::CountMismatch {
            provider,
            requested,
            returned: vectors.len(),
        });
    }

    if let Some(first) = vectors.first() {
        let expected = first.len();
        if let Some(other) = vectors.iter().find(|vector| vector.len() != expected) {
            return Err(EmbeddingError::DimensionMismatch {
                provider,
                expected,
                found: other.len(),
            });
        }
    }

    Ok(vectors)
}
