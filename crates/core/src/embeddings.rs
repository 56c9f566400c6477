use crate::error::UpstreamError;
use crate::gemini::{post_json, GeminiConfig};
use crate::retry::{call_with_retry, RetryPolicy};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const DEFAULT_EMBEDDING_MODEL: &str = "models/text-embedding-004";
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 768;

const SERVICE: &str = "embedding";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmbeddingTask {
    RetrievalDocument,
    RetrievalQuery,
}

#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>, UpstreamError>;
}

/// Hosted embeddings through Gemini `embedContent`, retried on rate limits.
pub struct GeminiEmbedder {
    config: GeminiConfig,
    model: String,
    dimensions: usize,
    client: Client,
    query_policy: RetryPolicy,
    document_policy: RetryPolicy,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
    task_type: EmbeddingTask,
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
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

impl GeminiEmbedder {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            client: Client::new(),
            query_policy: RetryPolicy::for_query(),
            document_policy: RetryPolicy::for_ingestion(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.model = model.into();
        self.dimensions = dimensions;
        self
    }

    pub fn with_policies(mut self, query: RetryPolicy, document: RetryPolicy) -> Self {
        self.query_policy = query;
        self.document_policy = document;
        self
    }

    fn policy_for(&self, task: EmbeddingTask) -> &RetryPolicy {
        match task {
            EmbeddingTask::RetrievalQuery => &self.query_policy,
            EmbeddingTask::RetrievalDocument => &self.document_policy,
        }
    }

    async fn embed_once(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>, UpstreamError> {
        let url = self.config.method_url(&self.model, "embedContent")?;
        let model = if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        };
        let request = EmbedContentRequest {
            model,
            content: Content {
                parts: [Part { text }],
            },
            task_type: task,
        };

        let response: EmbedContentResponse =
            post_json(&self.client, &self.config, url, SERVICE, &request).await?;

        if response.embedding.values.is_empty() {
            return Err(UpstreamError::InvalidResponse {
                service: SERVICE,
                details: "embedding had no values".to_string(),
            });
        }
        Ok(response.embedding.values)
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>, UpstreamError> {
        call_with_retry(self.policy_for(task), SERVICE, || self.embed_once(text, task)).await
    }
}

/// Deterministic hashed character-trigram embedder for offline development.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str, _task: EmbeddingTask) -> Result<Vec<f32>, UpstreamError> {
        Ok(self.embed_text(text))
    }
}
